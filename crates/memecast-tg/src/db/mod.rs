mod cfg;
mod channels;
mod conv;
mod error;
mod posts;
mod recipients;

use crate::broadcast::{Post, PostStore};
use crate::error::err_ctx;
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use teloxide::types::UserId;

pub(crate) use cfg::*;
pub(crate) use channels::*;
pub(crate) use error::*;
pub(crate) use posts::*;
pub(crate) use recipients::*;

pub(crate) struct Repo {
    pub(crate) recipients: RecipientsRepo,
    pub(crate) channels: ChannelsRepo,
    pub(crate) posts: PostsRepo,
}

pub(crate) async fn init(config: Config) -> Result<Repo> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        // Verify that the connection is working early.
        // The connection created here can also be reused by the migrations down the road.
        // The default idle timeout should be enough for that.
        .connect(config.url.as_str())
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    info!("Database is ready");

    Ok(Repo {
        recipients: RecipientsRepo::new(pool.clone()),
        channels: ChannelsRepo::new(pool.clone()),
        posts: PostsRepo::new(pool),
    })
}

#[async_trait]
impl PostStore for Repo {
    async fn get_random_post(&self) -> Result<Option<Post>> {
        self.posts.get_random().await
    }

    async fn get_active_recipients(&self) -> Result<Vec<UserId>> {
        self.recipients.get_active().await
    }

    async fn is_privileged(&self, id: UserId) -> Result<bool> {
        self.recipients.is_privileged(id).await
    }

    async fn get_privileged_ids(&self) -> Result<Vec<UserId>> {
        self.recipients.get_privileged().await
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result {
        self.recipients.set_active(id, active).await
    }

    async fn delete_post(&self, post: &Post) -> Result<bool> {
        self.posts.delete(post).await
    }
}

/// These tests require a running Postgres instance with the `DATABASE_URL`
/// env var pointing to an empty database.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_env_or_panic;
    use teloxide::types::MessageId;

    async fn repo() -> Repo {
        let _ = dotenvy::dotenv();
        init(from_env_or_panic("DATABASE_")).await.unwrap()
    }

    #[test_log::test(tokio::test)]
    #[ignore]
    async fn channel_lifecycle() {
        let repo = repo().await;
        let admin = UserId(1);
        let channel = format!("test_{}", rand_id());

        assert!(repo.channels.add(&channel, admin).await.unwrap());
        assert!(!repo.channels.add(&channel, admin).await.unwrap());

        let post = Post::new(channel.clone(), 10);
        assert!(repo.posts.add(&post).await.unwrap());
        assert!(!repo.posts.add(&post).await.unwrap());

        repo.channels.set_offset(&channel, MessageId(10)).await.unwrap();
        let stored = repo.channels.get(&channel).await.unwrap().unwrap();
        assert_eq!(stored.last_parsed_id, MessageId(10));
        assert_eq!(stored.added_by, admin);

        let stats = repo.channels.stats().await.unwrap();
        let stats = stats.iter().find(|stats| stats.username == channel).unwrap();
        assert_eq!(stats.posts, 1);

        assert!(repo.channels.remove(&channel).await.unwrap());
        assert!(!repo.channels.remove(&channel).await.unwrap());

        // Posts are removed together with the channel
        assert!(!repo.posts.delete(&post).await.unwrap());
    }

    #[test_log::test(tokio::test)]
    #[ignore]
    async fn recipient_lifecycle() {
        let repo = repo().await;
        let id = UserId(rand_id());

        repo.recipients.subscribe(id).await.unwrap();
        assert!(repo.recipients.get_active().await.unwrap().contains(&id));

        repo.set_active(id, false).await.unwrap();
        assert!(!repo.recipients.get_active().await.unwrap().contains(&id));

        repo.recipients.subscribe(id).await.unwrap();
        assert!(repo.recipients.get_active().await.unwrap().contains(&id));

        assert!(!repo.is_privileged(id).await.unwrap());
        repo.recipients.set_privileged(id, true).await.unwrap();
        assert!(repo.is_privileged(id).await.unwrap());
        assert!(repo.get_privileged_ids().await.unwrap().contains(&id));

        repo.recipients.set_privileged(id, false).await.unwrap();
        assert!(!repo.is_privileged(id).await.unwrap());
    }

    fn rand_id() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
            % 1_000_000_000_000
    }
}
