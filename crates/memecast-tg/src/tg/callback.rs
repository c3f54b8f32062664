//! Payloads of the inline keyboard buttons.
//!
//! Telegram limits the callback data to 64 bytes, so the payloads are compact
//! colon-separated strings instead of any structured encoding.

use crate::broadcast::Post;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackData {
    /// A recipient asks to remove the post from the database
    RequestDeletion(Post),

    /// An admin decided on the deletion request
    ModerationDecision { delete: bool, post: Post },

    /// An admin confirmed or cancelled adding the previewed channel
    AddChannel { confirm: bool },
}

fn encode_bool(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn decode_bool(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn decode_post(channel: &str, message_id: &str) -> Option<Post> {
    if channel.is_empty() {
        return None;
    }
    Some(Post::new(channel, message_id.parse().ok()?))
}

impl CallbackData {
    pub(crate) fn encode(&self) -> String {
        match self {
            Self::RequestDeletion(post) => {
                format!("req_del:{}:{}", post.channel, post.message_id.0)
            }
            Self::ModerationDecision { delete, post } => format!(
                "mod_dec:{}:{}:{}",
                encode_bool(*delete),
                post.channel,
                post.message_id.0
            ),
            Self::AddChannel { confirm } => format!("add_ch:{}", encode_bool(*confirm)),
        }
    }

    /// Returns [`None`] if the payload is malformed
    pub(crate) fn decode(data: &str) -> Option<Self> {
        let parts: Vec<_> = data.split(':').collect();

        let data = match parts.as_slice() {
            ["req_del", channel, message_id] => {
                Self::RequestDeletion(decode_post(channel, message_id)?)
            }
            ["mod_dec", delete, channel, message_id] => Self::ModerationDecision {
                delete: decode_bool(delete)?,
                post: decode_post(channel, message_id)?,
            },
            ["add_ch", confirm] => Self::AddChannel {
                confirm: decode_bool(confirm)?,
            },
            _ => return None,
        };

        Some(data)
    }

    fn button(self, text: &str) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(text, self.encode())
    }
}

/// Attached to every delivered post so that recipients can flag it
pub(crate) fn delete_request_keyboard(post: &Post) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        CallbackData::RequestDeletion(post.clone()).button("🗑 Remove from the database")
    ]])
}

pub(crate) fn moderation_keyboard(post: &Post) -> InlineKeyboardMarkup {
    let decision = |delete| CallbackData::ModerationDecision {
        delete,
        post: post.clone(),
    };

    InlineKeyboardMarkup::new([[
        decision(true).button("Delete"),
        decision(false).button("Keep"),
    ]])
}

pub(crate) fn add_channel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        CallbackData::AddChannel { confirm: true }.button("Add to the database"),
        CallbackData::AddChannel { confirm: false }.button("Cancel"),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    #[track_caller]
    fn assert_decode(data: &str, expected: Expect) {
        let actual = match CallbackData::decode(data) {
            Some(decoded) => {
                assert_eq!(decoded.encode(), data, "encoding must be the inverse");
                format!("{decoded:?}")
            }
            None => "malformed".to_owned(),
        };
        expected.assert_eq(&actual);
    }

    #[test]
    fn decoding() {
        use assert_decode as test;
        test(
            "req_del:memes:42",
            expect![[r#"RequestDeletion(Post { channel: "memes", message_id: MessageId(42) })"#]],
        );
        test(
            "mod_dec:yes:memes:42",
            expect![[r#"ModerationDecision { delete: true, post: Post { channel: "memes", message_id: MessageId(42) } }"#]],
        );
        test(
            "mod_dec:no:memes:7",
            expect![[r#"ModerationDecision { delete: false, post: Post { channel: "memes", message_id: MessageId(7) } }"#]],
        );
        test("add_ch:yes", expect!["AddChannel { confirm: true }"]);
        test("add_ch:no", expect!["AddChannel { confirm: false }"]);

        test("req_del:memes", expect!["malformed"]);
        test("req_del::42", expect!["malformed"]);
        test("req_del:memes:abc", expect!["malformed"]);
        test("mod_dec:maybe:memes:42", expect!["malformed"]);
        test("add_ch", expect!["malformed"]);
        test("vote:up:memes:1", expect!["malformed"]);
        test("", expect!["malformed"]);
    }

    #[test]
    fn payloads_fit_telegram_limit() {
        let post = Post::new("a".repeat(32), i32::MAX);
        let data = CallbackData::ModerationDecision { delete: true, post }.encode();
        assert!(data.len() <= 64, "{data}");
    }
}
