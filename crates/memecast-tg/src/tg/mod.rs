//! Telegram commands root module

mod add_channel;
mod callback;
mod cmd;
mod config;
mod messenger;
mod moderation;

use crate::broadcast::Broadcaster;
use crate::ingest::Ingestor;
use crate::observability::metrics::{counters, labels};
use crate::prelude::*;
use crate::source::ChannelReader;
use crate::{db, Result};
use dptree::di::DependencyMap;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, DefaultParseMode, Throttle, Trace};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, UpdateKind};
use teloxide::utils::command::BotCommands;

pub(crate) use callback::delete_request_keyboard;
pub(crate) use cmd::CommandError;
pub(crate) use config::*;
pub(crate) use messenger::TgMessenger;

pub(crate) type Bot = Trace<CacheMe<DefaultParseMode<Throttle<teloxide::Bot>>>>;

labels! {
    TgUpdateLabels { kind }
}

counters! {
    /// Number of updates received from Telegram
    tg_updates_total;

    /// Number of updates received from Telegram, that were skipped by the bot
    tg_updates_skipped_total;
}

pub(crate) struct Ctx {
    bot: Bot,
    db: Arc<db::Repo>,
    cfg: Config,
    reader: Arc<ChannelReader>,
    messenger: Arc<TgMessenger>,
    broadcaster: Arc<Broadcaster>,
    ingestor: Arc<Ingestor>,
    pending_channels: add_channel::PendingChannels,
}

impl Ctx {
    /// The super admin from the config, or a user promoted by another admin
    async fn is_privileged(&self, user: UserId) -> Result<bool> {
        if user == self.cfg.super_admin {
            return Ok(true);
        }
        self.db.recipients.is_privileged(user).await
    }
}

pub(crate) fn create_bot(cfg: &Config) -> Bot {
    teloxide::Bot::new(cfg.token.clone())
        .throttle(Default::default())
        .parse_mode(ParseMode::Html)
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all())
}

pub(crate) struct RunBotOptions {
    pub(crate) bot: Bot,
    pub(crate) tg_cfg: Config,
    pub(crate) db: Arc<db::Repo>,
    pub(crate) reader: Arc<ChannelReader>,
    pub(crate) messenger: Arc<TgMessenger>,
    pub(crate) broadcaster: Arc<Broadcaster>,
    pub(crate) ingestor: Arc<Ingestor>,
}

fn update_kind_label(kind: &UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Message(_) => "message",
        UpdateKind::EditedMessage(_) => "edited_message",
        UpdateKind::CallbackQuery(_) => "callback_query",
        UpdateKind::MyChatMember(_) => "my_chat_member",
        _ => "other",
    }
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let RunBotOptions {
        bot,
        tg_cfg,
        db,
        reader,
        messenger,
        broadcaster,
        ingestor,
    } = opts;

    let mut di = DependencyMap::new();

    di.insert(Arc::new(Ctx {
        bot: bot.clone(),
        db,
        cfg: tg_cfg,
        reader,
        messenger,
        broadcaster,
        ingestor,
        pending_channels: Default::default(),
    }));

    info!("Starting bot...");

    bot.set_my_commands(cmd::regular::Cmd::bot_commands())
        .await?;

    let handler = dptree::entry()
        .inspect(|update: Update| {
            let labels = TgUpdateLabels {
                kind: update_kind_label(&update.kind),
            };
            tg_updates_total(labels).increment(1);
            trace!(
                target: "tg_update",
                "{}",
                serde_json::to_string_pretty(&update)
                    .unwrap_or_else(|err| format!("{{unserializable update: {err}}}")),
            );
        })
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::admin::Cmd>()
                .chain(dptree::filter_async(cmd::admin::filter))
                .endpoint(cmd::handle::<cmd::admin::Cmd>()),
        )
        .branch(Update::filter_callback_query().endpoint(moderation::handle_callback_query))
        .inspect(|update: Update| {
            let labels = TgUpdateLabels {
                kind: update_kind_label(&update.kind),
            };
            tg_updates_skipped_total(labels).increment(1)
        });

    Dispatcher::builder(bot, handler)
        .dependencies(di)
        // We don't handle all possible messages that users send,
        // so to suppress the warning that we don't do this we have
        // a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");

    Ok(())
}
