mod requester;

use easy_ext::ext;
use teloxide::types::{Chat, User};
use teloxide::utils::html;

pub(crate) mod prelude {
    pub(crate) use super::{
        requester::UtilRequesterExt as _, ChatExt as _, UserExt as _,
    };
}

#[ext(UserExt)]
pub(crate) impl User {
    fn username_or_full_name(&self) -> String {
        self.username
            .as_ref()
            .map(|username| format!("@{username}"))
            .unwrap_or_else(|| self.full_name())
    }

    /// Clickable HTML mention of the user.
    fn html_link(&self) -> String {
        // We are using `preferably_tme_url` instead of user ID style `tg://user?id={}`
        // because links to of this form to users with the restricted
        // 'Forwarded Messages' privacy setting won't be clickable in telegram
        // messages.
        html::link(
            self.preferably_tme_url().as_str(),
            &html::escape(&self.full_name()),
        )
    }

    fn debug_id(&self) -> String {
        format!("{} ({})", self.username_or_full_name(), self.id)
    }
}

#[ext(ChatExt)]
pub(crate) impl Chat {
    fn debug_id(&self) -> String {
        let title = self
            .title()
            .or_else(|| self.username())
            .unwrap_or("{unknown_chat_title}");

        format!("{title} ({})", self.id)
    }
}
