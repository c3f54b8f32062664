use super::{parse_user_id, require_arg, sender};
use crate::broadcast::{Audience, BatchOutcome, PostSelector};
use crate::prelude::*;
use crate::source::normalize_username;
use crate::{tg, Result};
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "The following commands are available to the admins:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    AdminHelp,

    #[command(description = "grant admin rights: /add_admin <user id>")]
    AddAdmin(String),

    #[command(description = "revoke admin rights: /remove_admin <user id>")]
    RemoveAdmin(String),

    #[command(description = "add a source channel: /add_channel <username or link>")]
    AddChannel(String),

    #[command(description = "remove a channel with all its posts: /remove_channel <username>")]
    RemoveChannel(String),

    #[command(description = "show the statistics of the bot")]
    Stats,

    #[command(description = "send a random post to all subscribers right now")]
    Broadcast,
}

#[instrument(skip_all, fields(chat = %msg.chat.debug_id()))]
pub(crate) async fn filter(ctx: Arc<tg::Ctx>, msg: Message) -> bool {
    let Some(user) = &msg.from else {
        return false;
    };

    match ctx.is_privileged(user.id).await {
        Ok(true) => true,
        Ok(false) => {
            info!(user = %user.debug_id(), "Non-admin user tried to access admin command");
            false
        }
        Err(err) => {
            error!(
                err = tracing_err(&err),
                "Couldn't check the user rights, conservatively denying admin access"
            );
            false
        }
    }
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let admin = sender(msg)?;

        match self {
            Cmd::AdminHelp => {
                ctx.bot.reply_help::<Cmd>(msg).await?;
            }
            Cmd::AddAdmin(arg) => {
                let target = parse_user_id(require_arg(&arg, "/add_admin <user id>")?)?;

                if ctx.is_privileged(target).await? {
                    ctx.bot.reply(msg, "The user is already an admin").await?;
                    return Ok(());
                }

                ctx.db.recipients.set_privileged(target, true).await?;

                info!(admin = %admin.debug_id(), %target, "Granted admin rights");

                ctx.bot
                    .reply(msg, format!("The user {target} is now an admin"))
                    .await?;

                let notice = format!(
                    "You were granted admin rights by {}. See the available commands: /admin_help",
                    admin.html_link(),
                );

                if let Err(err) = ctx.bot.send_message(target, notice).await {
                    warn!(
                        %target,
                        err = tracing_err(&err),
                        "Failed to notify the new admin"
                    );
                    ctx.bot
                        .reply(
                            msg,
                            "The rights are granted, but the user couldn't be notified. \
                            They probably haven't started the bot yet.",
                        )
                        .await?;
                }
            }
            Cmd::RemoveAdmin(arg) => {
                let target = parse_user_id(require_arg(&arg, "/remove_admin <user id>")?)?;

                if target == ctx.cfg.super_admin {
                    info!(admin = %admin.debug_id(), "Attempt to demote the super admin");
                    ctx.bot.reply(msg, "The super admin can't be demoted").await?;
                    return Ok(());
                }

                if !ctx.db.recipients.is_privileged(target).await? {
                    ctx.bot.reply(msg, "The user is not an admin").await?;
                    return Ok(());
                }

                ctx.db.recipients.set_privileged(target, false).await?;

                info!(admin = %admin.debug_id(), %target, "Revoked admin rights");

                ctx.bot
                    .reply(msg, format!("The user {target} is no longer an admin"))
                    .await?;

                let notice = format!("Your admin rights were revoked by {}", admin.html_link());

                if let Err(err) = ctx.bot.send_message(target, notice).await {
                    debug!(
                        %target,
                        err = tracing_err(&err),
                        "Failed to notify the demoted admin"
                    );
                }
            }
            Cmd::AddChannel(arg) => {
                let input = require_arg(&arg, "/add_channel <username or link>")?;
                tg::add_channel::preview(ctx, msg, admin.id, input).await?;
            }
            Cmd::RemoveChannel(arg) => {
                let username =
                    normalize_username(require_arg(&arg, "/remove_channel <username>")?)?;

                let text = if ctx.db.channels.remove(&username).await? {
                    info!(admin = %admin.debug_id(), channel = %username, "Removed the channel");
                    format!("The channel @{username} and all its posts were removed")
                } else {
                    format!("The channel @{username} is not in the database")
                };

                ctx.bot.reply(msg, html::escape(&text)).await?;
            }
            Cmd::Stats => {
                ctx.bot.reply(msg, stats(ctx).await?).await?;
            }
            Cmd::Broadcast => {
                ctx.bot.reply(msg, "Starting the broadcast...").await?;

                let outcome = ctx
                    .broadcaster
                    .broadcast(PostSelector::Random, Audience::Subscribers)
                    .await?;

                let text = match outcome {
                    BatchOutcome::NoContent => "There are no posts in the database".to_owned(),
                    BatchOutcome::NoRecipients => "There are no active subscribers".to_owned(),
                    BatchOutcome::AlreadyRunning => {
                        "Another broadcast is in progress, try again later".to_owned()
                    }
                    BatchOutcome::Completed(report) => format!(
                        "The broadcast is finished: {}/{} delivered, \
                        {} skipped, {} unsubscribed",
                        report.delivered, report.attempted, report.skipped, report.deactivated,
                    ),
                };

                ctx.bot.reply(msg, text).await?;
            }
        }
        Ok(())
    }
}

async fn stats(ctx: &tg::Ctx) -> Result<String> {
    let recipients = ctx.db.recipients.stats().await?;
    let admins = ctx.db.recipients.get_privileged().await?;
    let channels = ctx.db.channels.stats().await?;

    let mut admin_lines = Vec::with_capacity(admins.len());
    for admin in &admins {
        let line = match ctx.bot.get_chat(*admin).await {
            Ok(chat) => {
                let name = [chat.first_name(), chat.last_name()]
                    .into_iter()
                    .flatten()
                    .join(" ");
                let username = chat
                    .username()
                    .map(|username| format!(" @{username}"))
                    .unwrap_or_default();
                format!("• {}{} (ID: <code>{admin}</code>)", html::escape(&name), username)
            }
            Err(err) => {
                warn!(%admin, err = tracing_err(&err), "Failed to get the admin info");
                format!("• ID: <code>{admin}</code> (failed to get the user info)")
            }
        };
        admin_lines.push(line);
    }

    let channel_lines = channels
        .iter()
        .map(|channel| format!("• @{}: {} posts", channel.username, channel.posts))
        .join("\n");

    let or_empty = |lines: String| {
        if lines.is_empty() {
            "• none".to_owned()
        } else {
            lines
        }
    };

    Ok(format!(
        "<b>Subscribers</b>\n\
        • total: {}\n\
        • active: {}\n\
        • inactive: {}\n\n\
        <b>Admins ({})</b>\n\
        {}\n\n\
        <b>Channels ({})</b>\n\
        {}",
        recipients.total(),
        recipients.active,
        recipients.inactive,
        admins.len(),
        or_empty(admin_lines.join("\n")),
        channels.len(),
        or_empty(channel_lines),
    ))
}
