//! Reader of public telegram channels via their web preview at `t.me/s/{channel}`.
//! It doesn't require a user session, but works only for channels that
//! have the preview enabled.

mod parse;

use crate::broadcast::{FetchedMedia, MediaFetcher, MediaKind, Post};
use crate::error::err;
use crate::observability::metrics::{counters, labels};
use crate::prelude::*;
use crate::util::temp_file::{create_temp_file_in, NamedTempFileExt};
use crate::{http, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use teloxide::types::MessageId;
use url::Url;

pub(crate) use parse::{ChannelPage, SourceMedia, SourceMessage};

labels! {
    MediaFetchLabels { kind, result }
}

counters! {
    /// Number of attempts to download the media of a post
    source_media_fetches_total;
}

/// Max number of posts shown to the admin before adding the channel
const PREVIEW_POSTS_LIMIT: usize = 5;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    #[serde(default = "default_base_url")]
    pub(crate) base_url: Url,

    #[serde(default = "default_download_dir")]
    pub(crate) download_dir: PathBuf,

    /// Pause between consecutive page requests when walking the history
    #[serde(default = "default_page_delay_ms")]
    pub(crate) page_delay_ms: u64,
}

fn default_base_url() -> Url {
    Url::parse("https://t.me").unwrap_or_else(|err| panic!("BUG: invalid default url: {err}"))
}

fn default_download_dir() -> PathBuf {
    "downloads".into()
}

fn default_page_delay_ms() -> u64 {
    200
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SourceError {
    #[error("`{input}` is not a valid channel username or link")]
    BadUsername { input: String },

    #[error("@{channel} is not a public channel or its preview is disabled")]
    NotAChannel { channel: String },

    #[error("@{channel} is empty or has no posts with photos or videos")]
    NoMediaPosts { channel: String },

    #[error("Invalid media URL `{url}` in the preview of {post}")]
    BadMediaUrl {
        url: String,
        post: String,
        source: url::ParseError,
    },
}

impl SourceError {
    pub(crate) fn is_user_error(&self) -> bool {
        match self {
            Self::BadUsername { .. } | Self::NotAChannel { .. } | Self::NoMediaPosts { .. } => true,
            Self::BadMediaUrl { .. } => false,
        }
    }
}

/// Summary of the channel shown before adding it to the database
#[derive(Debug, Clone)]
pub(crate) struct ChannelPreview {
    pub(crate) title: String,

    /// Newest posts with media, newest first
    pub(crate) preview_ids: Vec<MessageId>,
}

/// Extracts the channel username from `@username`, `username` or a
/// `t.me/username` link. Usernames are case-insensitive, so they are lowercased.
pub(crate) fn normalize_username(input: &str) -> Result<String> {
    let input = input.trim();

    let username = input
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_start_matches('@');

    if !lazy_regex::regex_is_match!(r"^[A-Za-z][A-Za-z0-9_]{4,31}$", username) {
        return Err(err!(SourceError::BadUsername { input }));
    }

    Ok(username.to_lowercase())
}

pub(crate) struct ChannelReader {
    http: http::Client,
    config: Config,
}

impl ChannelReader {
    pub(crate) fn new(http: http::Client, config: Config) -> Self {
        Self { http, config }
    }

    pub(crate) fn page_delay(&self) -> Duration {
        Duration::from_millis(self.config.page_delay_ms)
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.config
            .base_url
            .join(path)
            .fatal_ctx(|| format!("Failed to build the URL for path `{path}`"))
    }

    async fn load_page(&self, url: Url, channel: &str) -> Result<ChannelPage> {
        let html = self.http.get(url).read_text().await?;
        let page = parse::parse_page(&html);

        if !page.is_channel {
            return Err(err!(SourceError::NotAChannel { channel }));
        }

        Ok(page)
    }

    /// Messages of the channel with ids strictly greater than `after`.
    /// Returns an empty page when there are no newer messages.
    #[instrument(skip(self))]
    pub(crate) async fn page_after(&self, channel: &str, after: MessageId) -> Result<ChannelPage> {
        let mut url = self.url(&format!("s/{channel}"))?;
        url.query_pairs_mut()
            .append_pair("after", &after.0.to_string());

        let mut page = self.load_page(url, channel).await?;
        page.messages.retain(|message| message.id.0 > after.0);

        debug!(messages = page.messages.len(), "Loaded channel page");

        Ok(page)
    }

    /// The most recent messages of the channel
    #[instrument(skip(self))]
    pub(crate) async fn latest_page(&self, channel: &str) -> Result<ChannelPage> {
        let url = self.url(&format!("s/{channel}"))?;
        self.load_page(url, channel).await
    }

    /// Verifies that the channel can be used as a source of posts
    #[instrument(skip(self))]
    pub(crate) async fn check_channel(&self, channel: &str) -> Result<ChannelPreview> {
        let page = self.latest_page(channel).await?;

        let preview_ids: Vec<_> = page
            .messages
            .iter()
            .rev()
            .filter(|message| message.is_valid_media())
            .map(|message| message.id)
            .take(PREVIEW_POSTS_LIMIT)
            .collect();

        if preview_ids.is_empty() {
            return Err(err!(SourceError::NoMediaPosts { channel }));
        }

        Ok(ChannelPreview {
            title: page.title.unwrap_or_else(|| format!("@{channel}")),
            preview_ids,
        })
    }

    async fn download(&self, url: Url, kind: MediaKind) -> Result<PathBuf> {
        let suffix = match kind {
            MediaKind::Photo => ".jpg",
            MediaKind::Video => ".mp4",
        };

        let (mut file, path) = create_temp_file_in(self.config.download_dir.clone(), suffix)
            .await?
            .into_tokio();

        // The file is removed automatically if the download fails
        self.http
            .get(url)
            .try_send()
            .await?
            .read_to_file_handle(&mut file)
            .await?;

        path.keep()
            .fatal_ctx(|| "Failed to persist the downloaded media file")
    }
}

#[async_trait]
impl MediaFetcher for ChannelReader {
    #[instrument(skip_all, fields(%post))]
    async fn fetch(&self, post: &Post) -> Result<Option<FetchedMedia>> {
        let mut url = self.url(&format!("{}/{}", post.channel, post.message_id.0))?;
        url.set_query(Some("embed=1"));

        let html = self.http.get(url).read_text().await?;

        let message = parse::parse_page(&html)
            .messages
            .into_iter()
            .find(|message| message.id == post.message_id);

        let Some(message) = message else {
            warn!("The post was not found, it was probably deleted");
            return Ok(None);
        };

        if message.is_service {
            return Ok(None);
        }

        let (media_url, kind) = match message.media {
            SourceMedia::Photo { url } => (url, MediaKind::Photo),
            SourceMedia::Video { url: Some(url) } => (url, MediaKind::Video),
            SourceMedia::Video { url: None } => {
                warn!("The video is too big to be downloaded from the preview");
                return Ok(None);
            }
            SourceMedia::None => return Ok(None),
        };

        // Protocol-relative and absolute URLs are both resolved here
        let media_url = self
            .config
            .base_url
            .join(&media_url)
            .map_err(|source| {
                err!(SourceError::BadMediaUrl {
                    url: media_url,
                    post: post.to_string(),
                    source,
                })
            })?;

        let kind_label: &'static str = kind.into();

        let result = self
            .download(media_url, kind)
            .with_duration_log("Downloaded post media")
            .await;

        source_media_fetches_total(MediaFetchLabels {
            kind: kind_label,
            result: if result.is_ok() { "ok" } else { "err" },
        })
        .increment(1);

        Ok(Some(FetchedMedia {
            path: result?,
            caption: message.caption,
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    #[track_caller]
    fn assert_normalize(input: &str, expected: Expect) {
        let actual = match normalize_username(input) {
            Ok(username) => username,
            Err(err) => format!("error: {}", err.kind()),
        };
        expected.assert_eq(&actual);
    }

    #[test]
    fn username_normalization() {
        use assert_normalize as test;
        test("super_memes", expect!["super_memes"]);
        test("@Super_Memes", expect!["super_memes"]);
        test("  @super_memes  ", expect!["super_memes"]);
        test("https://t.me/super_memes", expect!["super_memes"]);
        test("t.me/super_memes/", expect!["super_memes"]);
        test("https://t.me/s/super_memes?before=10", expect!["super_memes"]);
        test("", expect!["error: `` is not a valid channel username or link"]);
        test("1memes", expect!["error: `1memes` is not a valid channel username or link"]);
        test("me", expect!["error: `me` is not a valid channel username or link"]);
        test("abcd", expect!["error: `abcd` is not a valid channel username or link"]);
        test("abcde", expect!["abcde"]);
        test("bad-name", expect!["error: `bad-name` is not a valid channel username or link"]);
    }

    #[test]
    fn user_errors() {
        let err = normalize_username("?").unwrap_err();
        assert!(err.is_user_error());
    }
}
