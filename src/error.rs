//! Errors surfaced by the session's public API.
//!
//! Transport and protocol failures are logged and recovered internally;
//! only misuse of the API itself is reported to the caller.

use thiserror::Error;

/// Errors returned by [`SessionConnection`](crate::session::SessionConnection).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An empty captcha token was submitted.
    #[error("empty captcha token")]
    EmptyCaptchaToken,
}
