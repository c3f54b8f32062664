use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::{MessageId, UserId};

/// Reference to a message in a public source channel, that is eligible
/// for broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Post {
    /// Username of the channel without the leading `@`
    pub(crate) channel: String,
    pub(crate) message_id: MessageId,
}

impl Post {
    pub(crate) fn new(channel: impl Into<String>, message_id: i32) -> Self {
        Self {
            channel: channel.into(),
            message_id: MessageId(message_id),
        }
    }

    /// Public link to the post in the channel
    pub(crate) fn url(&self) -> String {
        format!("https://t.me/{}/{}", self.channel, self.message_id.0)
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.channel, self.message_id.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum MediaKind {
    Photo,
    Video,
}

/// Media of the post downloaded to the local file system. The file is owned
/// by whoever requested the download, it must be deleted after use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchedMedia {
    pub(crate) path: PathBuf,
    pub(crate) caption: String,
    pub(crate) kind: MediaKind,
}

/// Where to take the media from when sending it to telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaSource<'a> {
    /// Upload the bytes of the local file
    Local(&'a Path),

    /// Reuse the file that was already uploaded to telegram
    Cached(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadedMedia {
    pub(crate) file_id: String,
}

/// Which post to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PostSelector {
    /// Pick uniformly at random from the post store
    Random,
    Explicit(Post),
}

/// Whom to deliver the post to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Audience {
    /// All active recipients. Only one such batch may run at a time.
    Subscribers,

    /// Targeted delivery that ignores the subscription state of the user.
    /// The user is notified if there is nothing to send.
    Single(UserId),
}

/// How the post reached the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum DeliveryPath {
    /// The platform copied the message from the source channel
    Copy,

    /// The media was downloaded and uploaded from the local file
    Upload,

    /// The media uploaded earlier in the same batch was reused
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    /// The post store is empty
    NoContent,

    /// There is no one to deliver the post to
    NoRecipients,

    /// Another batch for all subscribers is in progress
    AlreadyRunning,

    Completed(BatchReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub(crate) attempted: usize,
    pub(crate) delivered: usize,

    /// Recipients skipped because the media of the post could not be fetched
    pub(crate) skipped: usize,

    /// Recipients that couldn't be reached and were unsubscribed
    pub(crate) deactivated: usize,
}
