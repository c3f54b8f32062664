use crate::prelude::*;
use crate::{broadcast, db, schedule, source, tg};
use serde::de::DeserializeOwned;

pub struct Config {
    pub(crate) tg: tg::Config,
    pub(crate) db: db::Config,
    pub(crate) broadcast: broadcast::Config,
    pub(crate) schedule: schedule::Config,
    pub(crate) source: source::Config,
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            tg: from_env_or_panic("TG_"),
            db: from_env_or_panic("DATABASE_"),
            broadcast: from_env_or_panic("BROADCAST_"),
            schedule: from_env_or_panic(""),
            source: from_env_or_panic("SOURCE_"),
        }
    }

    /// Logs the settings that define the behavior of the bot. Secrets are omitted.
    pub fn log_summary(&self) {
        info!(
            super_admin = %self.tg.super_admin,
            db_pool_size = self.db.pool_size,
            broadcast_cron = %self.schedule.broadcast_cron,
            ingest_cron = %self.schedule.ingest_cron,
            timezone = %self.schedule.schedule_timezone,
            broadcast_delay_ms = self.broadcast.delay_ms,
            source = %self.source.base_url,
            download_dir = %self.source.download_dir.display(),
            page_delay_ms = self.source.page_delay_ms,
            "Loaded the config"
        );
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
