//! Error types for gitroast.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RoastError>;

/// All the ways a roast request can fail.
///
/// Variants map 1:1 to the HTTP taxonomy: `MissingUsername` → 400,
/// `UserNotFound` → 404, `RateLimited` → 429, everything else → 500.
/// Localized response messages are chosen at the HTTP/CLI boundary; the
/// error itself only carries the machine-readable detail.
#[derive(Debug, Error)]
pub enum RoastError {
    /// Request arrived without a `username` query parameter.
    #[error("github username is required")]
    MissingUsername,

    /// GitHub has no user by that name.
    #[error("github user not found: {0}")]
    UserNotFound(String),

    /// Client exceeded its request window.
    #[error("rate limit exceeded, resets in {reset_seconds}s")]
    RateLimited { reset_seconds: u64 },

    /// Profile fetch or generation failed for any reason other than a
    /// missing user. Detail is logged server-side, never sent to clients.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Cache store failure. Read-path callers treat this as a miss;
    /// write-path callers log it and keep the in-flight response.
    #[error("cache store error: {0}")]
    Cache(String),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
