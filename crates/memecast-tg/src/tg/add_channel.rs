//! Two-step addition of a source channel: the admin sees a preview of the
//! channel first, and then confirms or cancels adding it with a button.

use super::callback::add_channel_keyboard;
use crate::broadcast::{MediaFetcher, MediaKind, MediaSource, Messenger, Post};
use crate::prelude::*;
use crate::source::normalize_username;
use crate::{tg, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::utils::html;

/// Pause between the preview posts to stay within the rate limits
const PREVIEW_DELAY: Duration = Duration::from_secs(1);

/// Channels waiting for the confirmation of the admin that requested them.
/// Requesting a new preview replaces the previous pending channel.
#[derive(Default)]
pub(super) struct PendingChannels {
    by_admin: Mutex<HashMap<UserId, String>>,
}

impl PendingChannels {
    fn insert(&self, admin: UserId, username: String) {
        self.by_admin.lock().insert(admin, username);
    }

    fn take(&self, admin: UserId) -> Option<String> {
        self.by_admin.lock().remove(&admin)
    }
}

#[instrument(skip(ctx, msg))]
pub(super) async fn preview(ctx: &tg::Ctx, msg: &Message, admin: UserId, input: &str) -> Result {
    let username = normalize_username(input)?;

    ctx.bot
        .reply(
            msg,
            format!("Checking the channel @{username}. This may take a while..."),
        )
        .await?;

    let preview = ctx.reader.check_channel(&username).await?;

    ctx.bot
        .send_message(
            msg.chat.id,
            format!("Preview (latest {} posts):", preview.preview_ids.len()),
        )
        .await?;

    // Oldest first, the same way they appear in the channel
    for &message_id in preview.preview_ids.iter().rev() {
        send_preview_post(ctx, admin, &username, message_id).await?;
        tokio::time::sleep(PREVIEW_DELAY).await;
    }

    ctx.bot
        .send_message(
            msg.chat.id,
            format!(
                "Found: {} (@{username})\nAdd it to the database?",
                html::escape(&preview.title)
            ),
        )
        .reply_markup(add_channel_keyboard())
        .await?;

    ctx.pending_channels.insert(admin, username);

    Ok(())
}

/// Shows the post the same way the broadcast does: a copy if possible, and
/// the re-uploaded media otherwise.
async fn send_preview_post(
    ctx: &tg::Ctx,
    admin: UserId,
    channel: &str,
    message_id: MessageId,
) -> Result {
    let post = Post {
        channel: channel.to_owned(),
        message_id,
    };

    let Err(err) = ctx.messenger.copy(admin, &post).await else {
        return Ok(());
    };

    warn!(
        %post,
        err = tracing_err(&err),
        "Failed to copy the preview post, falling back to uploading its media"
    );

    let media = match ctx.reader.fetch(&post).await {
        Ok(Some(media)) => media,
        Ok(None) => return send_preview_link(ctx, admin, &post).await,
        Err(err) => {
            warn!(%post, err = tracing_err(&err), "Failed to download the preview post");
            return send_preview_link(ctx, admin, &post).await;
        }
    };

    let source = MediaSource::Local(&media.path);

    let result = match media.kind {
        MediaKind::Photo => ctx.messenger.send_photo(admin, source, &media.caption).await,
        MediaKind::Video => ctx.messenger.send_video(admin, source, &media.caption).await,
    };

    let path = media.path.display();

    if let Err(err) = fs_err::tokio::remove_file(&media.path).await {
        warn!(%path, err = tracing_err(&err), "Failed to remove temporary media file");
    }

    if let Err(err) = result {
        warn!(%post, err = tracing_err(&err), "Failed to upload the preview post");
        return send_preview_link(ctx, admin, &post).await;
    }

    Ok(())
}

async fn send_preview_link(ctx: &tg::Ctx, admin: UserId, post: &Post) -> Result {
    let text = format!(
        "<a href='{}'>Post #{}</a> (the bot couldn't show it)",
        post.url(),
        post.message_id.0
    );
    ctx.messenger.send_text(admin, text).await
}

/// Finishes the addition of the channel previewed by the admin. Returns the
/// text to replace the confirmation message with.
#[instrument(skip(ctx))]
pub(super) async fn decide(ctx: &tg::Ctx, admin: UserId, confirm: bool) -> Result<String> {
    let Some(username) = ctx.pending_channels.take(admin) else {
        return Ok("There is no channel waiting for confirmation, use /add_channel again".to_owned());
    };

    if !confirm {
        return Ok(format!("Adding the channel @{username} was cancelled"));
    }

    if !ctx.db.channels.add(&username, admin).await? {
        return Ok(format!("The channel @{username} is already in the database"));
    }

    info!(channel = %username, "Added the channel, starting the full backfill");

    let ingestor = ctx.ingestor.clone();
    let channel = username.clone();

    tokio::spawn(
        async move {
            if let Err(err) = ingestor.full_backfill(&channel).await {
                error!(err = tracing_err(&err), "Full backfill of the channel failed");
            }
        }
        .instrument(info_span!("backfill", channel = %username)),
    );

    Ok(format!(
        "The channel @{username} was added! Collecting all of its posts \
        in the background, this will take a while."
    ))
}
