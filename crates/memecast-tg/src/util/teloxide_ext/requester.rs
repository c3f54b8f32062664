//! Rust analyzer is very slow on processing requester extension here, so extracted
//! it to a separate module to limit the scope of analysis.

use easy_ext::ext;
use teloxide::payloads::setters::*;
use teloxide::requests::Requester;
use teloxide::types::{Message, ReplyParameters};
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

/// There is [`RequesterExt`](teloxide::requests::RequesterExt) in [`teloxide::prelude`].
/// We name this symbol different to avoid collisions.
#[ext(UtilRequesterExt)]
pub(crate) impl<T: Requester> T {
    /// Reply to the message, but don't fail if the original message was deleted.
    fn reply(&self, msg: &Message, text: impl Into<String>) -> Self::SendMessage {
        self.send_message(msg.chat.id, text)
            .reply_parameters(ReplyParameters::new(msg.id).allow_sending_without_reply())
    }

    fn reply_help<Cmd: BotCommands>(&self, msg: &Message) -> Self::SendMessage {
        self.reply(msg, html::escape(&Cmd::descriptions().to_string()))
    }
}
