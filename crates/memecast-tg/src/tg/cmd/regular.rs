use super::{require_arg, sender, CommandError};
use crate::broadcast::{Audience, BatchOutcome, PostStore, PostSelector};
use crate::error::err;
use crate::prelude::*;
use crate::tg;
use crate::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Commands:")]
pub(crate) enum Cmd {
    #[command(description = "show this text")]
    Help,

    #[command(description = "subscribe to the posts")]
    Start,

    #[command(description = "unsubscribe from the posts")]
    Stop,

    #[command(description = "send a message to the admins: /support <text>")]
    Support(String),
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::Help => {
                let text = format!(
                    "The bot periodically sends a random post from the collected \
                    channels to all subscribers.\n\n{}",
                    Cmd::descriptions()
                );

                ctx.bot.reply(msg, html::escape(&text)).await?;
            }
            Cmd::Start => {
                let user = sender(msg)?;

                ctx.db.recipients.subscribe(user.id).await?;

                ctx.bot
                    .reply(
                        msg,
                        "The subscription is active. If you get tired of the posts, \
                        just send /stop. Enjoy!",
                    )
                    .await?;

                // The user is notified by the broadcaster if there is no content yet
                let outcome = ctx
                    .broadcaster
                    .broadcast(PostSelector::Random, Audience::Single(user.id))
                    .await?;

                if let BatchOutcome::Completed(report) = outcome {
                    debug!(?report, "Sent the welcome post");
                }
            }
            Cmd::Stop => {
                let user = sender(msg)?;

                ctx.db.set_active(user.id, false).await?;

                ctx.bot
                    .reply(msg, "The subscription is disabled. Come back with /start")
                    .await?;
            }
            Cmd::Support(text) => {
                let user = sender(msg)?;
                let text = require_arg(&text, "/support <text>")?;

                let admins = ctx.db.get_privileged_ids().await?;
                if admins.is_empty() {
                    return Err(err!(CommandError::NoAdmins));
                }

                let report = format!(
                    "<b>Support request</b>\n\
                    From: {} (ID: <code>{}</code>)\n\n\
                    {}",
                    user.html_link(),
                    user.id,
                    html::escape(text),
                );

                for admin in admins {
                    let result = ctx.bot.send_message(admin, report.clone()).await;

                    if let Err(err) = result {
                        warn!(
                            %admin,
                            err = tracing_err(&err),
                            "Failed to deliver the support request to the admin"
                        );
                    }
                }

                ctx.bot
                    .reply(msg, "The message was sent to the admins")
                    .await?;
            }
        }
        Ok(())
    }
}
