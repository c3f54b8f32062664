mod broadcast;
mod config;
mod db;
mod error;
mod http;
mod ingest;
mod observability;
mod schedule;
mod source;
mod tg;

pub mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
    pub(crate) use crate::util::temp_file::NamedTempFileExt;
}

/// Run the telegram bot processing loop together with the scheduled jobs
pub async fn run(config: Config) -> Result<()> {
    let db = std::sync::Arc::new(db::init(config.db).await?);

    let reader = std::sync::Arc::new(source::ChannelReader::new(
        http::create_client()?,
        config.source,
    ));

    let bot = tg::create_bot(&config.tg);
    let messenger = std::sync::Arc::new(tg::TgMessenger::new(bot.clone()));

    let broadcaster = std::sync::Arc::new(broadcast::Broadcaster::new(
        db.clone(),
        reader.clone(),
        messenger.clone(),
        config.broadcast,
    ));

    let ingestor = std::sync::Arc::new(ingest::Ingestor::new(
        db.clone(),
        reader.clone(),
        reader.page_delay(),
    ));

    let scheduler =
        schedule::Scheduler::new(&config.schedule, broadcaster.clone(), ingestor.clone())?;

    let scheduler = tokio::spawn(scheduler.run());

    let opts = tg::RunBotOptions {
        bot,
        tg_cfg: config.tg,
        db,
        reader,
        messenger,
        broadcaster,
        ingestor,
    };

    let result = tg::run_bot(opts).await;

    scheduler.abort();

    result
}
