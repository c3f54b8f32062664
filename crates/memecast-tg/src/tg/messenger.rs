use crate::broadcast::{MediaSource, Messenger, Post, UploadedMedia};
use crate::error::fatal;
use crate::prelude::*;
use crate::tg::Bot;
use crate::Result;
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, LinkPreviewOptions, Recipient};
use teloxide::utils::html;

/// Telegram doesn't accept captions longer than this number of characters
const MAX_CAPTION_LEN: usize = 1024;

pub(crate) struct TgMessenger {
    bot: Bot,
}

impl TgMessenger {
    pub(crate) fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn input_file(source: MediaSource<'_>) -> InputFile {
    match source {
        MediaSource::Local(path) => InputFile::file(path.to_path_buf()),
        MediaSource::Cached(file_id) => InputFile::file_id(file_id.to_owned()),
    }
}

/// Source captions are plain text, while the bot sends HTML
fn caption_html(caption: &str) -> String {
    let truncated: String = caption.chars().take(MAX_CAPTION_LEN).collect();
    html::escape(&truncated)
}

/// The messages that accompany the posts link to them. A preview of such a
/// link would show the media of the post once again.
pub(crate) fn without_link_preview<R: SendMessageSetters>(request: R) -> R {
    request.link_preview_options(LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    })
}

pub(crate) fn source_chat(post: &Post) -> Recipient {
    Recipient::ChannelUsername(format!("@{}", post.channel))
}

#[async_trait]
impl Messenger for TgMessenger {
    async fn copy(&self, to: UserId, post: &Post) -> Result {
        self.bot
            .copy_message(to, source_chat(post), post.message_id)
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia> {
        let msg = self
            .bot
            .send_photo(to, input_file(source))
            .caption(caption_html(caption))
            .await?;

        // Sizes are sorted from the smallest to the largest
        let file_id = msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|size| size.file.id.clone())
            .ok_or_else(|| fatal!("Sent photo message has no photo in it: {:?}", msg.id))?;

        Ok(UploadedMedia { file_id })
    }

    async fn send_video(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia> {
        let msg = self
            .bot
            .send_video(to, input_file(source))
            .caption(caption_html(caption))
            .supports_streaming(true)
            .await?;

        let file_id = msg
            .video()
            .map(|video| video.file.id.clone())
            .ok_or_else(|| fatal!("Sent video message has no video in it: {:?}", msg.id))?;

        Ok(UploadedMedia { file_id })
    }

    async fn send_text_with_markup(
        &self,
        to: UserId,
        text: String,
        markup: InlineKeyboardMarkup,
    ) -> Result {
        without_link_preview(self.bot.send_message(to, text))
            .reply_markup(markup)
            .await?;
        Ok(())
    }

    async fn send_text(&self, to: UserId, text: String) -> Result {
        self.bot.send_message(to, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use teloxide::payloads::SendMessage;
    use teloxide::types::ChatId;

    #[test]
    fn captions_are_escaped_and_truncated() {
        expect!["Tom &amp; Jerry &lt;3"].assert_eq(&caption_html("Tom & Jerry <3"));

        let long = "ж".repeat(MAX_CAPTION_LEN + 10);
        assert_eq!(caption_html(&long).chars().count(), MAX_CAPTION_LEN);
    }

    #[test]
    fn source_links_have_no_preview() {
        let payload = without_link_preview(SendMessage::new(ChatId(42), "Source @memes"));

        let options = payload.link_preview_options.unwrap();
        assert!(options.is_disabled);
        assert_eq!(options.url, None);
        assert_eq!(payload.text, "Source @memes");
    }
}
