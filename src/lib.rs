//! gitroast: roast a GitHub profile.
//!
//! An HTTP service that fetches a GitHub user's public profile, asks an
//! LLM for a lighthearted roast, and delivers it either as one JSON object
//! or as a token-by-token SSE stream. A persistent cache deduplicates
//! generations per (username, language, model), and a fixed-window limiter
//! throttles clients. The `client` module mirrors the cache and stream
//! handling for the bundled terminal client.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod github;
pub mod i18n;
pub mod limiter;
pub mod llm;
pub mod server;

pub use config::Config;
pub use error::{Result, RoastError};
