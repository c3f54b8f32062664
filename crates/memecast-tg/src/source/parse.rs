//! Scraping of the public web preview of telegram channels.

use lazy_regex::{regex, regex_captures};
use teloxide::types::MessageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelPage {
    pub(crate) title: Option<String>,

    /// Only public channels have a web preview with the message history.
    /// Users, bots and groups get a plain profile page instead.
    pub(crate) is_channel: bool,

    /// Sorted by the message id in ascending order
    pub(crate) messages: Vec<SourceMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceMessage {
    pub(crate) id: MessageId,
    pub(crate) media: SourceMedia,

    /// Messages about pinning, changing the title, etc.
    pub(crate) is_service: bool,
    pub(crate) caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceMedia {
    Photo {
        url: String,
    },
    Video {
        /// The preview doesn't include the video file if it's too big
        url: Option<String>,
    },
    None,
}

impl SourceMessage {
    /// Whether the message is eligible for broadcasting
    pub(crate) fn is_valid_media(&self) -> bool {
        !self.is_service && !matches!(self.media, SourceMedia::None)
    }
}

pub(crate) fn parse_page(html: &str) -> ChannelPage {
    let title = regex_captures!(r#"<meta property="og:title" content="([^"]*)""#, html)
        .map(|(_, title)| html_to_text(title))
        .filter(|title| !title.is_empty());

    let is_channel = html.contains(r#"class="tgme_channel_info""#);

    let headers = regex!(
        r#"<div class="(tgme_widget_message\b[^"]*)"[^>]*?\bdata-post="[^"/]+/(\d+)""#
    );

    let starts: Vec<_> = headers.captures_iter(html).collect();

    let mut messages: Vec<_> = starts
        .iter()
        .enumerate()
        .filter_map(|(i, header)| {
            let whole = header.get(0)?;
            let end = starts
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|next| next.start())
                .unwrap_or(html.len());

            let classes = header.get(1)?.as_str();
            let id = header.get(2)?.as_str().parse().ok()?;

            Some(parse_message(
                MessageId(id),
                classes,
                &html[whole.end()..end],
            ))
        })
        .collect();

    messages.sort_by_key(|message| message.id.0);
    messages.dedup_by_key(|message| message.id);

    ChannelPage {
        title,
        is_channel,
        messages,
    }
}

fn parse_message(id: MessageId, classes: &str, body: &str) -> SourceMessage {
    let is_service = classes.split_whitespace().any(|class| class == "service_message");

    let photo = regex_captures!(
        r#"tgme_widget_message_photo_wrap[^"]*"[^>]*?background-image:url\('([^']+)'\)"#,
        body
    );

    let media = if let Some((_, url)) = photo {
        SourceMedia::Photo {
            url: html_to_text(url),
        }
    } else if body.contains("tgme_widget_message_video_player") {
        let url = regex_captures!(r#"<video[^>]*?\bsrc="([^"]+)""#, body)
            .map(|(_, url)| html_to_text(url));
        SourceMedia::Video { url }
    } else {
        SourceMedia::None
    };

    let caption = regex_captures!(
        r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#,
        body
    )
    .map(|(_, caption)| html_to_text(caption))
    .unwrap_or_default();

    SourceMessage {
        id,
        media,
        is_service,
        caption,
    }
}

/// Strips the markup, keeping only the text with line breaks
pub(crate) fn html_to_text(html: &str) -> String {
    let text = regex!(r"<br\s*/?>").replace_all(html, "\n");
    let text = regex!(r"<[^>]*>").replace_all(&text, "");
    unescape_html(&text).trim().to_owned()
}

fn unescape_html(text: &str) -> String {
    regex!(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")
        .replace_all(text, |caps: &lazy_regex::regex::Captures<'_>| {
            let entity = &caps[1];

            let decoded = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };

            decoded.map_or_else(|| caps[0].to_owned(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    const CHANNEL_PAGE: &str = r#"
<html>
<head>
<meta property="og:title" content="Memes &amp; Co">
</head>
<body>
<div class="tgme_channel_info">
  <div class="tgme_channel_info_header_title"><span dir="auto">Memes &amp; Co</span></div>
</div>
<section class="tgme_channel_history js-message_history">
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message text_not_supported_wrap js-widget_message" data-post="memes/43" data-view="abc">
  <div class="tgme_widget_message_bubble">
    <a class="tgme_widget_message_video_player js-message_video_player" href="https://t.me/memes/43">
      <div class="tgme_widget_message_video_wrap"><video src="https://cdn4.telesco.pe/file/clip.mp4?token=a&amp;b=1" class="tgme_widget_message_video js-message_video" width="100%"></video></div>
    </a>
    <div class="tgme_widget_message_text js-message_text" dir="auto">Funny <b>cat</b><br/>second line &#036;5 &#x1F602;</div>
  </div>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message text_not_supported_wrap js-widget_message" data-post="memes/42" data-view="abc">
  <div class="tgme_widget_message_bubble">
    <a class="tgme_widget_message_photo_wrap 5348 js-message_photo" style="width:800px;background-image:url('https://cdn4.telesco.pe/file/photo.jpg')" href="https://t.me/memes/42"></a>
  </div>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message service_message js-widget_message" data-post="memes/44" data-view="abc">
  <div class="tgme_widget_message_bubble">
    <div class="tgme_widget_message_text js-message_text" dir="auto">Channel photo updated</div>
  </div>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="memes/45" data-view="abc">
  <div class="tgme_widget_message_bubble">
    <a class="tgme_widget_message_video_player not_supported js-message_video_player" href="https://t.me/memes/45">
      <div class="message_media_not_supported_label">Media is too big</div>
    </a>
  </div>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="memes/46" data-view="abc">
  <div class="tgme_widget_message_bubble">
    <div class="tgme_widget_message_text js-message_text" dir="auto">Just &lt;text&gt;</div>
  </div>
</div></div>
</section>
</body>
</html>
"#;

    fn render(page: &ChannelPage) -> String {
        let messages = page.messages.iter().map(|message| {
            format!(
                "{} service={} valid={} media={:?} caption={:?}",
                message.id.0,
                message.is_service,
                message.is_valid_media(),
                message.media,
                message.caption,
            )
        });

        std::iter::once(format!(
            "title={:?} is_channel={}",
            page.title, page.is_channel
        ))
        .chain(messages)
        .collect::<Vec<_>>()
        .join("\n")
    }

    #[test]
    fn channel_page() {
        expect![[r#"
            title=Some("Memes & Co") is_channel=true
            42 service=false valid=true media=Photo { url: "https://cdn4.telesco.pe/file/photo.jpg" } caption=""
            43 service=false valid=true media=Video { url: Some("https://cdn4.telesco.pe/file/clip.mp4?token=a&b=1") } caption="Funny cat\nsecond line $5 😂"
            44 service=true valid=false media=None caption="Channel photo updated"
            45 service=false valid=true media=Video { url: None } caption=""
            46 service=false valid=false media=None caption="Just <text>""#]]
        .assert_eq(&render(&parse_page(CHANNEL_PAGE)));
    }

    #[test]
    fn profile_page_is_not_a_channel() {
        let html = r#"
            <meta property="og:title" content="Some User">
            <div class="tgme_page_title"><span dir="auto">Some User</span></div>
        "#;

        expect![[r#"title=Some("Some User") is_channel=false"#]]
            .assert_eq(&render(&parse_page(html)));
    }

    #[track_caller]
    fn assert_html_to_text(html: &str, expected: Expect) {
        expected.assert_eq(&html_to_text(html));
    }

    #[test]
    fn html_to_text_conversion() {
        use assert_html_to_text as test;
        test("plain", expect!["plain"]);
        test("a<br>b<br/>c<br />d", expect![[r#"
            a
            b
            c
            d"#]]);
        test(r#"<a href="https://t.me">link</a> &amp; <b>bold</b>"#, expect!["link & bold"]);
        test("&unknown; &#65;&#x42;", expect!["&unknown; AB"]);
        test(
            r#"<i class="emoji" style="background-image:url('//telegram.org/img/emoji/40/F09F9882.png')"><b>😂</b></i>"#,
            expect!["😂"],
        );
    }
}
