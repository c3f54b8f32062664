//! Handling of the inline keyboard buttons: deletion requests from the
//! recipients, decisions of the admins on them, and confirmation of new channels.

use super::add_channel;
use super::callback::{moderation_keyboard, CallbackData};
use super::messenger::without_link_preview;
use crate::broadcast::{Post, PostStore};
use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Result};
use std::sync::Arc;
use teloxide::prelude::*;

#[instrument(skip_all, fields(
    from = %query.from.debug_id(),
    data = query.data.as_deref(),
))]
pub(crate) async fn handle_callback_query(ctx: Arc<tg::Ctx>, query: CallbackQuery) -> DynResult {
    debug!("Processing callback query");

    let result = handle(&ctx, &query).await;

    let alert = match &result {
        Ok(alert) => alert.clone(),
        Err(err) => {
            error!(err = tracing_err(err), "Failed to handle the callback query");
            Some(format!("Something went wrong (error id: {})", err.id()))
        }
    };

    let mut answer = ctx.bot.answer_callback_query(query.id.clone());
    if let Some(alert) = alert {
        answer = answer.text(alert).show_alert(true);
    }

    if let Err(err) = answer.await {
        warn!(err = tracing_err(&err), "Failed to answer the callback query");
    }

    result.map(drop).map_err(Into::into)
}

/// Returns the text of the alert to show to the user
async fn handle(ctx: &tg::Ctx, query: &CallbackQuery) -> Result<Option<String>> {
    let Some(data) = query.data.as_deref().and_then(CallbackData::decode) else {
        warn!("Received malformed callback data");
        return Ok(Some("Bad button data".to_owned()));
    };

    let user = query.from.id;

    match data {
        CallbackData::RequestDeletion(post) => {
            if ctx.is_privileged(user).await? {
                clear_keyboard(ctx, query).await;
                let alert = delete_post(ctx, &post).await?;
                info!(%post, "Admin deleted the post directly");
                return Ok(Some(alert));
            }

            report_post(ctx, query, &post).await.map(Some)
        }
        CallbackData::ModerationDecision { delete, post } => {
            if !ctx.is_privileged(user).await? {
                warn!(%post, "Non-admin user tried to moderate the post");
                return Ok(Some("Only admins can moderate posts".to_owned()));
            }

            clear_keyboard(ctx, query).await;

            if !delete {
                info!(%post, "Admin decided to keep the post");
                return Ok(Some("The post is kept".to_owned()));
            }

            delete_post(ctx, &post).await.map(Some)
        }
        CallbackData::AddChannel { confirm } => {
            let text = add_channel::decide(ctx, user, confirm).await?;

            if let Some(message) = &query.message {
                // Editing the text also removes the keyboard
                ctx.bot
                    .edit_message_text(message.chat().id, message.id(), text)
                    .await?;
            }

            Ok(None)
        }
    }
}

async fn delete_post(ctx: &tg::Ctx, post: &Post) -> Result<String> {
    let alert = if ctx.db.delete_post(post).await? {
        info!(%post, "Deleted the post");
        "The post was deleted"
    } else {
        "The post has already been deleted"
    };
    Ok(alert.to_owned())
}

async fn report_post(ctx: &tg::Ctx, query: &CallbackQuery, post: &Post) -> Result<String> {
    let admins = ctx.db.get_privileged_ids().await?;

    if admins.is_empty() {
        return Ok("There are no admins to handle the report :(".to_owned());
    }

    let reporter = &query.from;

    let report = format!(
        "<b>Report on a post</b>\n\
        From: {} (ID: <code>{}</code>)\n\
        Post: <a href='{}'>open the post</a>\n\n\
        Delete it from the database?",
        reporter.html_link(),
        reporter.id,
        post.url(),
    );

    let mut delivered = 0;

    for admin in admins {
        let result = without_link_preview(ctx.bot.send_message(admin, report.clone()))
            .reply_markup(moderation_keyboard(post))
            .await;

        match result {
            Ok(_) => delivered += 1,
            Err(err) => error!(
                %admin,
                err = tracing_err(&err),
                "Failed to deliver the report to the admin"
            ),
        }
    }

    info!(%post, delivered, "Sent the report on the post to the admins");

    clear_keyboard(ctx, query).await;

    Ok("The report was sent to the admins".to_owned())
}

async fn clear_keyboard(ctx: &tg::Ctx, query: &CallbackQuery) {
    let Some(message) = &query.message else {
        return;
    };

    let result = ctx
        .bot
        .edit_message_reply_markup(message.chat().id, message.id())
        .await;

    if let Err(err) = result {
        debug!(err = tracing_err(&err), "Failed to remove the inline keyboard");
    }
}
