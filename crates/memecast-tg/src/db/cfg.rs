use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    // The bot is the only heavy user of the database, but the scheduled jobs
    // and the command handlers may run queries at the same time.
    10
}
