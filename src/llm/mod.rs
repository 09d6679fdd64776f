//! Roast generation backends.

mod openai;

pub use openai::OpenAiGenerator;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::github::Profile;
use crate::i18n::{translations, Language};

/// Ordered text deltas from a streaming generation call.
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// One generation request: prompts plus backend selection.
#[derive(Debug, Clone)]
pub struct RoastRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

impl RoastRequest {
    /// Build the prompt pair for a profile in the given language.
    pub fn for_profile(profile: &Profile, lang: Language, model: &str, max_tokens: u32) -> Self {
        let serialized =
            serde_json::to_string(profile).unwrap_or_else(|_| profile.username.clone());
        Self {
            system_prompt: translations(lang).system_prompt.to_string(),
            user_prompt: format!("Roast this GitHub profile in a funny way: {serialized}"),
            model: model.to_string(),
            max_tokens,
        }
    }
}

/// A text generator that can deliver a roast whole or token by token.
///
/// Implementations return raw model output; empty-result fallback and
/// caching are the orchestrator's job.
#[async_trait]
pub trait RoastGenerator: Send + Sync {
    /// Await the complete roast text.
    async fn complete(&self, req: &RoastRequest) -> Result<String>;

    /// Open an incremental delta stream. Deltas arrive in generation order.
    async fn stream(&self, req: &RoastRequest) -> Result<DeltaStream>;
}
