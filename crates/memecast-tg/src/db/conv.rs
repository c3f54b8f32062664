use super::DbError;
use crate::error::err_ctx;
use crate::Result;
use teloxide::types::{MessageId, UserId};

pub(crate) trait IntoDb {
    type Db;

    fn into_db(self) -> Self::Db;
}

impl IntoDb for UserId {
    type Db = i64;

    /// Telegram user identifiers take at most 52 significant bits,
    /// so they always fit into a `bigint`.
    #[allow(clippy::cast_possible_wrap)]
    fn into_db(self) -> i64 {
        self.0 as i64
    }
}

impl IntoDb for MessageId {
    type Db = i32;

    fn into_db(self) -> i32 {
        self.0
    }
}

pub(crate) fn user_id_from_db(db_val: i64) -> Result<UserId> {
    u64::try_from(db_val)
        .map(UserId)
        .map_err(err_ctx!(DbError::Deserialize {
            app_ty: std::any::type_name::<UserId>(),
            db_val: db_val.to_string(),
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_round_trips_through_bigint() {
        let id = UserId(861_583_827);
        assert_eq!(user_id_from_db(id.into_db()).unwrap(), id);
    }

    #[test]
    fn negative_user_id_is_rejected() {
        let err = user_id_from_db(-1).unwrap_err();
        assert!(err.to_string().contains("`-1`"), "{err}");
    }
}
