//! Authentication against the archive's login form.

pub mod blocking;

pub use blocking::{LoginInfo, Token};
