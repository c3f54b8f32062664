//! Assorted utility functions (missing batteries).
mod std_ext;
mod teloxide_ext;

pub(crate) mod display;
pub(crate) mod temp_file;
pub(crate) mod tokio;

pub(crate) mod prelude {
    pub(crate) use super::std_ext::prelude::*;
    pub(crate) use super::teloxide_ext::prelude::*;
}

pub(crate) type DynResult<T = (), E = Box<DynError>> = std::result::Result<T, E>;
pub(crate) type DynError = dyn std::error::Error + Send + Sync;
