pub(crate) mod admin;
pub(crate) mod regular;

use crate::error::err;
use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use teloxide::types::{Message, User, UserId};
use teloxide::utils::html;

/// Errors caused by invalid input of the user. These are replied to the user,
/// but not reported as warnings.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("The command requires an argument. Usage: {usage}")]
    MissingArgument { usage: &'static str },

    #[error("User ID must consist of digits only, but got `{input}`")]
    BadUserId { input: String },

    #[error("The command can be used only by a user, not on behalf of a chat")]
    NoSender,

    #[error("There are no admins to deliver the message to")]
    NoAdmins,
}

#[async_trait]
pub(crate) trait Command: fmt::Debug + Send + Sync + 'static {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result;
}

pub(crate) fn handle<'a, C: Command>(
) -> impl Fn(Arc<tg::Ctx>, Message, C) -> BoxFuture<'a, DynResult> {
    move |ctx, msg, cmd| {
        let info = info_span!(
            "handle_message",
            sender = msg.from.as_ref().map(User::debug_id).as_deref(),
            msg_text = msg.text(),
            chat = %msg.chat.debug_id(),
            cmd = format_args!("{cmd:#?}")
        );

        let fut = async move {
            debug!("Processing command");

            let result = cmd.handle(&ctx, &msg).await;
            if let Err(err) = &result {
                let span = warn_span!("err", err = tracing_err(err), id = err.id());
                async {
                    if !err.is_user_error() {
                        warn!("Command handler returned an error");
                    }

                    let reply_msg = html::code_block(&err.display_chain().to_string());

                    let msg_result = ctx.bot.reply(&msg, reply_msg).await;

                    if let Err(err) = msg_result {
                        warn!(
                            err = tracing_err(&err),
                            "Failed to reply with the error message to the user"
                        );
                    }
                }
                .instrument(span)
                .await;
            }
            result.map_err(Into::into)
        };

        Box::pin(fut.instrument(info))
    }
}

/// Commands are accepted only in the private chat with the bot
pub(crate) fn filter_pm_with_bot(msg: Message) -> bool {
    msg.chat.is_private()
}

fn sender(msg: &Message) -> Result<&User> {
    msg.from
        .as_ref()
        .ok_or_else(|| err!(CommandError::NoSender))
}

fn require_arg<'a>(arg: &'a str, usage: &'static str) -> Result<&'a str> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(err!(CommandError::MissingArgument { usage }));
    }
    Ok(arg)
}

fn parse_user_id(input: &str) -> Result<UserId> {
    input
        .parse()
        .map(UserId)
        .map_err(|_| err!(CommandError::BadUserId { input }))
}
