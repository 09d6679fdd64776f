//! The roast request pipeline.
//!
//! One pipeline for both delivery modes: rate gate (in the handler) →
//! cache lookup → profile fetch → generation, parameterized by
//! [`DeliveryMode`] at the generation-and-delivery step. Collaborators are
//! injected through [`AppState`] so every stage can be faked in tests.

use std::sync::Arc;

use axum::http::HeaderMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, error};

use crate::cache::{CacheRow, ShameCache};
use crate::error::Result;
use crate::i18n::{translations, Language};
use crate::llm::RoastRequest;

use super::AppState;

/// How a cache miss is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Await the whole roast, respond with one JSON object.
    Buffered,
    /// Forward generator deltas as SSE frames as they arrive.
    Streamed,
}

/// Resolved request context: the effective triple plus display language.
#[derive(Debug, Clone)]
pub struct RoastContext {
    pub username: String,
    pub language: Language,
    pub model: String,
}

/// Events on the streamed delivery path, one per wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoastEvent {
    /// A text delta. The opening frame has empty text and carries the
    /// avatar URL when one is known.
    Delta {
        text: String,
        avatar_url: Option<String>,
    },
    /// Terminal marker (`[DONE]` on the wire).
    Done,
}

/// Pipeline outcome, handed back to the HTTP handler for delivery.
pub enum RoastOutcome {
    /// Fresh cache row; no external calls were made.
    Cached(CacheRow),
    /// Buffered generation result, already cached.
    Fresh {
        text: String,
        avatar_url: Option<String>,
    },
    /// Open delta stream. The cache write happens after the terminal
    /// event, inside the stream.
    Streaming(BoxStream<'static, Result<RoastEvent>>),
}

impl std::fmt::Debug for RoastOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoastOutcome::Cached(_) => f.debug_tuple("Cached").finish(),
            RoastOutcome::Fresh { text, avatar_url } => f
                .debug_struct("Fresh")
                .field("text", text)
                .field("avatar_url", avatar_url)
                .finish(),
            RoastOutcome::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

/// Client identifier for rate limiting: first `x-forwarded-for` entry,
/// else a sentinel.
pub fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Run the pipeline for one admitted request.
pub async fn run(state: &AppState, ctx: &RoastContext, mode: DeliveryMode) -> Result<RoastOutcome> {
    if state.config.cache.enabled {
        if let Some(row) =
            state
                .cache
                .lookup(&ctx.username, ctx.language.as_str(), Some(ctx.model.as_str()))
        {
            return Ok(RoastOutcome::Cached(row));
        }
    }

    let profile = state.profiles.fetch_profile(&ctx.username).await?;
    let avatar_url = profile.avatar_url.clone();
    let request = RoastRequest::for_profile(
        &profile,
        ctx.language,
        &ctx.model,
        state.config.llm.max_tokens,
    );
    debug!(username = %ctx.username, language = %ctx.language, ?mode, "cache miss, generating");

    match mode {
        DeliveryMode::Buffered => {
            let text = state.generator.complete(&request).await?;
            let text = non_empty_or_fallback(text, ctx.language);

            if state.config.cache.enabled {
                if let Err(e) = state.cache.upsert(
                    &ctx.username,
                    ctx.language.as_str(),
                    &ctx.model,
                    &text,
                    avatar_url.clone(),
                ) {
                    // The response is already computed; persistence failure
                    // only costs us a repeat generation later.
                    error!(username = %ctx.username, "cache write failed: {e}");
                }
            }

            Ok(RoastOutcome::Fresh { text, avatar_url })
        }
        DeliveryMode::Streamed => {
            let deltas = state.generator.stream(&request).await?;
            let events = stream_events(
                deltas,
                ctx.clone(),
                avatar_url,
                state.config.cache.enabled.then(|| state.cache.clone()),
            );
            Ok(RoastOutcome::Streaming(events))
        }
    }
}

/// Assemble the SSE event sequence from a delta stream.
///
/// Deltas are forwarded in generation order and accumulated; after the
/// terminal event the accumulated text is written to the cache on a
/// detached task (fire-and-forget relative to the client connection). If
/// the client disconnects the stream is dropped before `Done`, so partial
/// output is never cached. A generator error ends the stream with an error
/// item so the transport sees the failure instead of a silent truncation.
fn stream_events(
    mut deltas: BoxStream<'static, Result<String>>,
    ctx: RoastContext,
    avatar_url: Option<String>,
    cache: Option<Arc<ShameCache>>,
) -> BoxStream<'static, Result<RoastEvent>> {
    let stream = async_stream::stream! {
        yield Ok(RoastEvent::Delta {
            text: String::new(),
            avatar_url: avatar_url.clone(),
        });

        let mut accumulated = String::new();
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    accumulated.push_str(&text);
                    yield Ok(RoastEvent::Delta { text, avatar_url: None });
                }
                Err(e) => {
                    error!(username = %ctx.username, "generation stream failed: {e}");
                    yield Err(e);
                    return;
                }
            }
        }

        if accumulated.trim().is_empty() {
            accumulated = translations(ctx.language).fallback_text.to_string();
            yield Ok(RoastEvent::Delta {
                text: accumulated.clone(),
                avatar_url: None,
            });
        }

        yield Ok(RoastEvent::Done);

        if let Some(cache) = cache {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = cache.upsert(
                    &ctx.username,
                    ctx.language.as_str(),
                    &ctx.model,
                    &accumulated,
                    avatar_url,
                ) {
                    error!(username = %ctx.username, "deferred cache write failed: {e}");
                }
            });
        }
    };
    Box::pin(stream)
}

fn non_empty_or_fallback(text: String, lang: Language) -> String {
    if text.trim().is_empty() {
        translations(lang).fallback_text.to_string()
    } else {
        text
    }
}
