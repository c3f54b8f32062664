use serde::Deserialize;
use teloxide::types::UserId;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    /// ID of the user, who owns the bot. This user always has admin access,
    /// and can't be demoted.
    pub(crate) super_admin: UserId,
}
