use crate::util::DynError;

/// Most likely unrecoverable errors from database communication layer
#[derive(Debug, thiserror::Error)]
pub(crate) enum DbError {
    #[error("Failed to connect to the database")]
    Connect { source: sqlx::Error },

    #[error("Failed to migrate the database")]
    Migrate { source: sqlx::migrate::MigrateError },

    #[error("Database query failed")]
    Query {
        #[from]
        source: sqlx::Error,
    },

    #[error("Failed to convert the database value `{db_val}` to `{app_ty}`")]
    Deserialize {
        app_ty: &'static str,
        db_val: String,
        source: Box<DynError>,
    },
}
