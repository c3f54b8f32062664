//! Delivery of a single post to a set of recipients.
//!
//! Every recipient first gets a cheap copy of the original message. If the
//! platform refuses to copy it (the channel forbids forwarding, for example),
//! the media is downloaded once per batch, uploaded to the first recipient
//! that needs it, and the handle of the uploaded file is reused for the rest
//! of the batch.

mod cache;
mod model;
mod traits;

#[cfg(test)]
mod tests;

use crate::observability::metrics::{counters, histograms, labels};
use crate::prelude::*;
use crate::{tg, Result};
use cache::MediaCache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::UserId;
use teloxide::utils::html;

pub(crate) use model::*;
pub(crate) use traits::*;

labels! {
    DeliveryLabels { path }
    FailureLabels { reason }
    BatchLabels { audience }
}

counters! {
    /// Number of recipients that received a post
    broadcast_deliveries_total;

    /// Number of recipients that didn't receive a post
    broadcast_failures_total;
}

histograms! {
    /// Time it took to deliver a post to all recipients of a batch
    broadcast_batch_duration_seconds;
}

const NO_CONTENT_NOTICE: &str = "There are no posts in the database yet, come back later!";

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    /// Pause between deliveries to consecutive recipients. It's a crude
    /// rate limit of the outbound messages.
    #[serde(default = "default_delay_ms")]
    pub(crate) delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    50
}

impl Config {
    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BroadcastError {
    #[error("There are no posts to broadcast")]
    NoContentAvailable,

    #[error("Another broadcast to all subscribers is already in progress")]
    AlreadyRunning,
}

/// Why a single recipient didn't get the post
#[derive(Debug, thiserror::Error)]
pub(crate) enum DeliveryError {
    /// The post can't be copied and its media can't be downloaded. This is
    /// a problem of the post, not of the recipient.
    #[error("Media of the post is unavailable")]
    MediaUnavailable,

    /// The platform refused to deliver the message to the recipient
    #[error("Recipient is unreachable")]
    Unreachable { source: crate::Error },
}

impl DeliveryError {
    fn reason(&self) -> &'static str {
        match self {
            Self::MediaUnavailable => "media_unavailable",
            Self::Unreachable { .. } => "unreachable",
        }
    }
}

pub(crate) struct Broadcaster {
    store: Arc<dyn PostStore>,
    fetcher: Arc<dyn MediaFetcher>,
    messenger: Arc<dyn Messenger>,
    config: Config,

    /// Guards against overlapping batches for all subscribers
    subscribers_batch: tokio::sync::Mutex<()>,
}

impl Broadcaster {
    pub(crate) fn new(
        store: Arc<dyn PostStore>,
        fetcher: Arc<dyn MediaFetcher>,
        messenger: Arc<dyn Messenger>,
        config: Config,
    ) -> Self {
        Self {
            store,
            fetcher,
            messenger,
            config,
            subscribers_batch: Default::default(),
        }
    }

    /// Draws one post uniformly at random. Returns [`None`] if there are no posts.
    pub(crate) async fn pick_random_post(&self) -> Result<Option<Post>> {
        self.store.get_random_post().await
    }

    #[instrument(skip(self))]
    pub(crate) async fn broadcast(
        &self,
        selector: PostSelector,
        audience: Audience,
    ) -> Result<BatchOutcome> {
        let _guard = match audience {
            Audience::Subscribers => match self.subscribers_batch.try_lock() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    warn!("{}, skipping this one", BroadcastError::AlreadyRunning);
                    return Ok(BatchOutcome::AlreadyRunning);
                }
            },
            Audience::Single(_) => None,
        };

        let post = match selector {
            PostSelector::Explicit(post) => post,
            PostSelector::Random => match self.pick_random_post().await? {
                Some(post) => post,
                None => {
                    self.report_no_content(audience).await;
                    return Ok(BatchOutcome::NoContent);
                }
            },
        };

        let recipients = match audience {
            Audience::Subscribers => self.store.get_active_recipients().await?,
            Audience::Single(id) => vec![id],
        };

        if recipients.is_empty() {
            info!(%post, "No recipients to deliver the post to");
            return Ok(BatchOutcome::NoRecipients);
        }

        let labels = BatchLabels {
            audience: match audience {
                Audience::Subscribers => "subscribers",
                Audience::Single(_) => "single",
            },
        };

        let (report, duration) = self
            .deliver_batch(&post, &recipients)
            .with_duration()
            .await;

        broadcast_batch_duration_seconds(labels).record(duration);

        Ok(BatchOutcome::Completed(report))
    }

    async fn report_no_content(&self, audience: Audience) {
        warn!("{}, the post store is empty", BroadcastError::NoContentAvailable);

        let Audience::Single(requester) = audience else {
            return;
        };

        let result = self
            .messenger
            .send_text(requester, NO_CONTENT_NOTICE.to_owned())
            .await;

        if let Err(err) = result {
            warn!(
                %requester,
                err = tracing_err(&err),
                "Failed to notify the requester that there is no content"
            );
        }
    }

    #[instrument(skip_all, fields(%post, recipients = recipients.len()))]
    async fn deliver_batch(&self, post: &Post, recipients: &[UserId]) -> BatchReport {
        let mut cache = MediaCache::default();
        let mut report = BatchReport {
            attempted: recipients.len(),
            ..Default::default()
        };

        for (i, &recipient) in recipients.iter().enumerate() {
            if i != 0 {
                tokio::time::sleep(self.config.delay()).await;
            }

            let result = self.deliver(post, recipient, &mut cache).await;

            match &result {
                Ok(path) => {
                    report.delivered += 1;
                    let path: &'static str = path.into();
                    broadcast_deliveries_total(DeliveryLabels { path }).increment(1);
                }
                Err(err) => {
                    broadcast_failures_total(FailureLabels {
                        reason: err.reason(),
                    })
                    .increment(1);
                }
            }

            match result {
                Ok(path) => debug!(%recipient, ?path, "Delivered the post"),
                Err(DeliveryError::MediaUnavailable) => {
                    report.skipped += 1;
                    warn!(%recipient, "Skipping the recipient, media of the post is unavailable");
                }
                Err(DeliveryError::Unreachable { source }) => {
                    report.deactivated += 1;
                    self.deactivate(recipient, &source).await;
                }
            }
        }

        cache.cleanup().await;

        info!(
            delivered = report.delivered,
            attempted = report.attempted,
            skipped = report.skipped,
            deactivated = report.deactivated,
            "Broadcast finished: {}/{}",
            report.delivered,
            report.attempted,
        );

        report
    }

    async fn deactivate(&self, recipient: UserId, cause: &crate::Error) {
        warn!(
            %recipient,
            err = tracing_err(cause),
            "Failed to deliver the post, deactivating the recipient"
        );

        if let Err(err) = self.store.set_active(recipient, false).await {
            error!(
                %recipient,
                err = tracing_err(&err),
                "Failed to deactivate the recipient"
            );
        }
    }

    async fn deliver(
        &self,
        post: &Post,
        recipient: UserId,
        cache: &mut MediaCache,
    ) -> Result<DeliveryPath, DeliveryError> {
        let path = match self.messenger.copy(recipient, post).await {
            Ok(()) => DeliveryPath::Copy,
            Err(err) => {
                debug!(
                    %recipient,
                    err = tracing_err(&err),
                    "Failed to copy the post, falling back to uploading its media"
                );
                self.deliver_fallback(post, recipient, cache).await?
            }
        };

        let text = format!(
            "<a href='{}'>Source @{}</a>",
            post.url(),
            html::escape(&post.channel)
        );

        self.messenger
            .send_text_with_markup(recipient, text, tg::delete_request_keyboard(post))
            .await
            .map_err(|source| DeliveryError::Unreachable { source })?;

        Ok(path)
    }

    async fn deliver_fallback(
        &self,
        post: &Post,
        recipient: UserId,
        cache: &mut MediaCache,
    ) -> Result<DeliveryPath, DeliveryError> {
        if let Some(uploaded) = cache.uploaded() {
            let source = MediaSource::Cached(&uploaded.file_id);
            self.send_media(recipient, uploaded.kind, source, &uploaded.caption)
                .await
                .map_err(|source| DeliveryError::Unreachable { source })?;

            return Ok(DeliveryPath::Cached);
        }

        let media = match cache.media() {
            Some(media) => media.clone(),
            None => cache.store_media(self.fetch(post).await?).clone(),
        };

        let uploaded = self
            .send_media(
                recipient,
                media.kind,
                MediaSource::Local(&media.path),
                &media.caption,
            )
            .await
            .map_err(|source| DeliveryError::Unreachable { source })?;

        cache.store_uploaded(uploaded.file_id);

        Ok(DeliveryPath::Upload)
    }

    async fn fetch(&self, post: &Post) -> Result<FetchedMedia, DeliveryError> {
        match self.fetcher.fetch(post).await {
            Ok(Some(media)) => Ok(media),
            Ok(None) => {
                warn!(%post, "The post has no photo or video to upload");
                Err(DeliveryError::MediaUnavailable)
            }
            Err(err) => {
                warn!(%post, err = tracing_err(&err), "Failed to fetch media of the post");
                Err(DeliveryError::MediaUnavailable)
            }
        }
    }

    async fn send_media(
        &self,
        recipient: UserId,
        kind: MediaKind,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia> {
        match kind {
            MediaKind::Photo => self.messenger.send_photo(recipient, source, caption).await,
            MediaKind::Video => self.messenger.send_video(recipient, source, caption).await,
        }
    }
}
