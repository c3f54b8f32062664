use super::{FetchedMedia, MediaSource, Post, UploadedMedia};
use crate::Result;
use async_trait::async_trait;
use teloxide::types::{InlineKeyboardMarkup, UserId};

/// Persistent storage of the posts and the subscription state of recipients.
#[async_trait]
pub(crate) trait PostStore: Send + Sync {
    /// Uniformly random post or [`None`] if there are no posts at all
    async fn get_random_post(&self) -> Result<Option<Post>>;

    async fn get_active_recipients(&self) -> Result<Vec<UserId>>;

    async fn is_privileged(&self, id: UserId) -> Result<bool>;

    async fn get_privileged_ids(&self) -> Result<Vec<UserId>>;

    async fn set_active(&self, id: UserId, active: bool) -> Result;

    /// Returns `false` if there was no such post
    async fn delete_post(&self, post: &Post) -> Result<bool>;
}

/// Downloads the original media of the post when the platform refuses to
/// copy the message.
#[async_trait]
pub(crate) trait MediaFetcher: Send + Sync {
    /// Returns [`None`] if the post has no photo or video in it. The caller
    /// owns the downloaded file and is responsible for its deletion.
    async fn fetch(&self, post: &Post) -> Result<Option<FetchedMedia>>;
}

/// Outbound messaging primitives used to deliver the posts
#[async_trait]
pub(crate) trait Messenger: Send + Sync {
    /// Re-emit the original message from the channel without transferring
    /// any data through the bot.
    async fn copy(&self, to: UserId, post: &Post) -> Result;

    async fn send_photo(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia>;

    async fn send_video(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia>;

    async fn send_text_with_markup(
        &self,
        to: UserId,
        text: String,
        markup: InlineKeyboardMarkup,
    ) -> Result;

    async fn send_text(&self, to: UserId, text: String) -> Result;
}
