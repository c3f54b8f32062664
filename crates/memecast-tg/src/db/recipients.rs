use super::conv::{user_id_from_db, IntoDb};
use crate::prelude::*;
use crate::Result;
use teloxide::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecipientStats {
    pub(crate) active: i64,
    pub(crate) inactive: i64,
}

impl RecipientStats {
    pub(crate) fn total(&self) -> i64 {
        self.active + self.inactive
    }
}

pub(crate) struct RecipientsRepo {
    db: sqlx::PgPool,
}

impl RecipientsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Registers the recipient or re-activates the existing one
    #[instrument(skip(self))]
    pub(crate) async fn subscribe(&self, id: UserId) -> Result {
        sqlx::query(
            "insert into recipients (id, active) values ($1, true)
            on conflict (id) do update set active = true",
        )
        .bind(id.into_db())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub(crate) async fn set_active(&self, id: UserId, active: bool) -> Result {
        sqlx::query("update recipients set active = $2 where id = $1")
            .bind(id.into_db())
            .bind(active)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub(crate) async fn get_active(&self) -> Result<Vec<UserId>> {
        let ids: Vec<i64> = sqlx::query_scalar("select id from recipients where active")
            .fetch_all(&self.db)
            .await?;

        ids.into_iter().map(user_id_from_db).collect()
    }

    pub(crate) async fn stats(&self) -> Result<RecipientStats> {
        let (active, inactive): (i64, i64) = sqlx::query_as(
            "select
                count(*) filter (where active),
                count(*) filter (where not active)
            from recipients",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(RecipientStats { active, inactive })
    }

    pub(crate) async fn is_privileged(&self, id: UserId) -> Result<bool> {
        let privileged: Option<bool> =
            sqlx::query_scalar("select privileged from recipients where id = $1")
                .bind(id.into_db())
                .fetch_optional(&self.db)
                .await?;

        Ok(privileged.unwrap_or(false))
    }

    pub(crate) async fn get_privileged(&self) -> Result<Vec<UserId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("select id from recipients where privileged order by joined_at")
                .fetch_all(&self.db)
                .await?;

        ids.into_iter().map(user_id_from_db).collect()
    }

    /// Grants or revokes the privileges. The user is registered as an inactive
    /// recipient if they never subscribed, so that the privileges are remembered.
    #[instrument(skip(self))]
    pub(crate) async fn set_privileged(&self, id: UserId, privileged: bool) -> Result {
        sqlx::query(
            "insert into recipients (id, active, privileged) values ($1, false, $2)
            on conflict (id) do update set privileged = $2",
        )
        .bind(id.into_db())
        .bind(privileged)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
