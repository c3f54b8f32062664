use super::conv::{user_id_from_db, IntoDb};
use crate::prelude::*;
use crate::Result;
use chrono::prelude::*;
use teloxide::types::{MessageId, UserId};

#[derive(Debug, Clone)]
pub(crate) struct Channel {
    pub(crate) username: String,
    pub(crate) added_by: UserId,

    /// Identifier of the newest message seen in the channel by the ingestion
    pub(crate) last_parsed_id: MessageId,
    pub(crate) added_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ChannelRecord {
    username: String,
    added_by: i64,
    last_parsed_id: i32,
    added_at: DateTime<Utc>,
}

impl ChannelRecord {
    fn into_app(self) -> Result<Channel> {
        Ok(Channel {
            username: self.username,
            added_by: user_id_from_db(self.added_by)?,
            last_parsed_id: MessageId(self.last_parsed_id),
            added_at: self.added_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct ChannelStats {
    pub(crate) username: String,
    pub(crate) posts: i64,
}

pub(crate) struct ChannelsRepo {
    db: sqlx::PgPool,
}

impl ChannelsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    pub(crate) async fn get(&self, username: &str) -> Result<Option<Channel>> {
        sqlx::query_as::<_, ChannelRecord>(
            "select username, added_by, last_parsed_id, added_at
            from channels where username = $1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .map(ChannelRecord::into_app)
        .transpose()
    }

    /// Returns `false` if the channel was already added
    #[instrument(skip(self))]
    pub(crate) async fn add(&self, username: &str, added_by: UserId) -> Result<bool> {
        let result = sqlx::query(
            "insert into channels (username, added_by) values ($1, $2)
            on conflict (username) do nothing",
        )
        .bind(username)
        .bind(added_by.into_db())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes the channel with all of its posts. Returns `false` if there
    /// was no such channel.
    #[instrument(skip(self))]
    pub(crate) async fn remove(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("delete from channels where username = $1")
            .bind(username)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn list(&self) -> Result<Vec<Channel>> {
        sqlx::query_as::<_, ChannelRecord>(
            "select username, added_by, last_parsed_id, added_at
            from channels order by added_at",
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(ChannelRecord::into_app)
        .collect()
    }

    /// Number of posts stored for every channel
    pub(crate) async fn stats(&self) -> Result<Vec<ChannelStats>> {
        let stats = sqlx::query_as(
            "select c.username, count(p.message_id) as posts
            from channels c
            left join posts p on p.channel = c.username
            group by c.username
            order by c.username",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(stats)
    }

    #[instrument(skip(self))]
    pub(crate) async fn set_offset(&self, username: &str, last_parsed_id: MessageId) -> Result {
        sqlx::query("update channels set last_parsed_id = $2 where username = $1")
            .bind(username)
            .bind(last_parsed_id.into_db())
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
