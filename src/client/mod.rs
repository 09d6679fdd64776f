//! Terminal client internals: the local roast cache and the streaming
//! consumer/renderer.

pub mod cache;
pub mod stream;

pub use cache::{LocalCache, LocalEntry};
pub use stream::{consume_sse, simulate_typing, StreamedRoast};
