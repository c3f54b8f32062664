use super::conv::IntoDb;
use crate::broadcast::Post;
use crate::prelude::*;
use crate::Result;

#[derive(sqlx::FromRow)]
struct PostRecord {
    channel: String,
    message_id: i32,
}

pub(crate) struct PostsRepo {
    db: sqlx::PgPool,
}

impl PostsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Returns `false` if the post was already stored
    #[instrument(skip_all, fields(%post))]
    pub(crate) async fn add(&self, post: &Post) -> Result<bool> {
        let result = sqlx::query(
            "insert into posts (channel, message_id) values ($1, $2)
            on conflict on constraint posts_channel_message_id_key do nothing",
        )
        .bind(&post.channel)
        .bind(post.message_id.into_db())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn get_random(&self) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(
            "select channel, message_id from posts order by random() limit 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(record.map(|record| Post::new(record.channel, record.message_id)))
    }

    /// Returns `false` if there was no such post
    #[instrument(skip_all, fields(%post))]
    pub(crate) async fn delete(&self, post: &Post) -> Result<bool> {
        let result = sqlx::query("delete from posts where channel = $1 and message_id = $2")
            .bind(&post.channel)
            .bind(post.message_id.into_db())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
