//! Collection of posts from the source channels into the post store.
//!
//! Both passes are append-only. The stored offset of a channel is the id of the
//! newest message observed in it, even if that message wasn't eligible for
//! broadcasting, so the next incremental pass starts right after it.

use crate::broadcast::Post;
use crate::observability::metrics::{counters, labels};
use crate::prelude::*;
use crate::source::{ChannelPage, ChannelReader};
use crate::{db, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::MessageId;

labels! {
    IngestLabels { mode }
}

counters! {
    /// Number of new posts stored by the ingestion
    ingest_posts_total;

    /// Number of channels that failed to be ingested
    ingest_channel_failures_total;
}

/// Channel together with the id of the newest message seen in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelCursor {
    pub(crate) username: String,
    pub(crate) offset: MessageId,
}

#[async_trait]
pub(crate) trait IngestStore: Send + Sync {
    async fn list_channel_cursors(&self) -> Result<Vec<ChannelCursor>>;

    /// Returns `false` if the post is already stored
    async fn add_post(&self, post: &Post) -> Result<bool>;

    async fn set_channel_offset(&self, channel: &str, offset: MessageId) -> Result;
}

/// Paginated access to the history of a channel
#[async_trait]
pub(crate) trait ChannelHistory: Send + Sync {
    /// Messages with ids strictly greater than `after` in ascending order.
    /// An empty page means the end of the history.
    async fn page_after(&self, channel: &str, after: MessageId) -> Result<ChannelPage>;
}

#[async_trait]
impl ChannelHistory for ChannelReader {
    async fn page_after(&self, channel: &str, after: MessageId) -> Result<ChannelPage> {
        ChannelReader::page_after(self, channel, after).await
    }
}

#[async_trait]
impl IngestStore for db::Repo {
    async fn list_channel_cursors(&self) -> Result<Vec<ChannelCursor>> {
        let channels = self.channels.list().await?;

        Ok(channels
            .into_iter()
            .map(|channel| ChannelCursor {
                username: channel.username,
                offset: channel.last_parsed_id,
            })
            .collect())
    }

    async fn add_post(&self, post: &Post) -> Result<bool> {
        self.posts.add(post).await
    }

    async fn set_channel_offset(&self, channel: &str, offset: MessageId) -> Result {
        self.channels.set_offset(channel, offset).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WalkReport {
    /// Number of posts that were not stored before
    pub(crate) inserted: u64,

    /// Number of valid media messages seen, including already stored ones
    pub(crate) valid: u64,

    /// The newest message id observed, [`None`] if there were no new messages
    pub(crate) last_seen: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IncrementalReport {
    pub(crate) channels: usize,
    pub(crate) failed_channels: usize,
    pub(crate) inserted: u64,
}

pub(crate) struct Ingestor {
    store: Arc<dyn IngestStore>,
    history: Arc<dyn ChannelHistory>,
    page_delay: Duration,
}

impl Ingestor {
    pub(crate) fn new(
        store: Arc<dyn IngestStore>,
        history: Arc<dyn ChannelHistory>,
        page_delay: Duration,
    ) -> Self {
        Self {
            store,
            history,
            page_delay,
        }
    }

    /// Walks the whole history of the channel oldest-first and stores every
    /// valid media post in it.
    #[instrument(skip(self))]
    pub(crate) async fn full_backfill(&self, channel: &str) -> Result<WalkReport> {
        info!("Starting full backfill of the channel");

        let report = self.walk(channel, MessageId(0)).await?;

        if let Some(last_seen) = report.last_seen {
            self.store.set_channel_offset(channel, last_seen).await?;
        }

        ingest_posts_total(IngestLabels { mode: "full" }).increment(report.inserted);

        info!(
            inserted = report.inserted,
            valid = report.valid,
            "Full backfill of the channel finished"
        );

        Ok(report)
    }

    /// Picks up the messages that appeared in every stored channel since the
    /// previous pass. A failure in one channel doesn't stop the others.
    #[instrument(skip(self))]
    pub(crate) async fn incremental(&self) -> Result<IncrementalReport> {
        let cursors = self.store.list_channel_cursors().await?;

        let mut report = IncrementalReport {
            channels: cursors.len(),
            ..Default::default()
        };

        if cursors.is_empty() {
            warn!("There are no channels to ingest posts from");
            return Ok(report);
        }

        info!(channels = cursors.len(), "Starting incremental ingestion");

        for cursor in cursors {
            match self.ingest_channel(&cursor).await {
                Ok(inserted) => report.inserted += inserted,
                Err(err) => {
                    report.failed_channels += 1;
                    ingest_channel_failures_total(IngestLabels {
                        mode: "incremental",
                    })
                    .increment(1);

                    error!(
                        channel = %cursor.username,
                        err = tracing_err(&err),
                        "Failed to ingest the channel, skipping it"
                    );
                }
            }
        }

        ingest_posts_total(IngestLabels {
            mode: "incremental",
        })
        .increment(report.inserted);

        info!(
            inserted = report.inserted,
            failed_channels = report.failed_channels,
            "Incremental ingestion finished"
        );

        Ok(report)
    }

    async fn ingest_channel(&self, cursor: &ChannelCursor) -> Result<u64> {
        let report = self.walk(&cursor.username, cursor.offset).await?;

        let Some(last_seen) = report.last_seen.filter(|id| id.0 > cursor.offset.0) else {
            debug!(channel = %cursor.username, "No new messages in the channel");
            return Ok(report.inserted);
        };

        self.store
            .set_channel_offset(&cursor.username, last_seen)
            .await?;

        Ok(report.inserted)
    }

    async fn walk(&self, channel: &str, from: MessageId) -> Result<WalkReport> {
        let mut report = WalkReport::default();
        let mut cursor = from;

        loop {
            let page = self.history.page_after(channel, cursor).await?;

            let Some(newest) = page.messages.iter().map(|message| message.id.0).max() else {
                break;
            };

            if newest <= cursor.0 {
                warn!(
                    channel,
                    cursor = cursor.0,
                    newest,
                    "The history page didn't advance, stopping"
                );
                break;
            }

            for message in page.messages.iter().filter(|message| message.is_valid_media()) {
                report.valid += 1;

                let post = Post {
                    channel: channel.to_owned(),
                    message_id: message.id,
                };

                if self.store.add_post(&post).await? {
                    report.inserted += 1;
                }
            }

            cursor = MessageId(newest);
            report.last_seen = Some(cursor);

            tokio::time::sleep(self.page_delay).await;
        }

        Ok(report)
    }
}
