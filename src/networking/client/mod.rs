//! HTTP client and transport abstraction.

pub mod blocking;

pub use blocking::{Method, Request, Response, Transport};
