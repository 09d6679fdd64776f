//! The roast endpoint.
//!
//! `GET /roast?username=<name>&lang=<en-US|pt-BR>` returns either one JSON
//! object or a `text/event-stream` of `data: {"text": …}` frames ending in
//! `data: [DONE]`, depending on configuration. Cache hits are always
//! buffered JSON with `fromCache: true`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::error::RoastError;
use crate::i18n::{translations, Language};
use crate::server::orchestrator::{
    self, client_identifier, DeliveryMode, RoastContext, RoastEvent, RoastOutcome,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RoastParams {
    pub username: Option<String>,
    pub lang: Option<String>,
}

pub async fn roast(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RoastParams>,
    headers: HeaderMap,
) -> Response {
    let accept_language = headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let language = Language::resolve(params.lang.as_deref(), accept_language);
    let t = translations(language);

    // Rate gate first; rejected requests touch nothing else.
    let identifier = client_identifier(&headers);
    if !state.limiter.admit(&identifier) {
        let reset = state.limiter.reset_seconds(&identifier);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("x-ratelimit-reset", reset.to_string())],
            Json(json!({
                "error": t.rate_limit_exceeded,
                "resetInSeconds": reset,
            })),
        )
            .into_response();
    }

    let username = match params.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": t.username_required })),
            )
                .into_response();
        }
    };

    let ctx = RoastContext {
        username,
        language,
        model: state.config.llm.model.clone(),
    };
    let mode = if state.config.server.stream_responses {
        DeliveryMode::Streamed
    } else {
        DeliveryMode::Buffered
    };

    match orchestrator::run(&state, &ctx, mode).await {
        Ok(RoastOutcome::Cached(row)) => {
            let model = row.model.unwrap_or(ctx.model);
            Json(json!({
                "shame": row.shame_text,
                "language": row.language,
                "model": model,
                "fromCache": true,
                "avatarUrl": row.avatar_url,
            }))
            .into_response()
        }
        Ok(RoastOutcome::Fresh { text, avatar_url }) => Json(json!({
            "shame": text,
            "language": language.as_str(),
            "model": ctx.model,
            "fromCache": false,
            "avatarUrl": avatar_url,
        }))
        .into_response(),
        Ok(RoastOutcome::Streaming(events)) => {
            let frames = events.map(|event| match event {
                Ok(event) => Ok::<_, axum::Error>(to_sse_event(event)),
                Err(e) => Err(axum::Error::new(e)),
            });
            Sse::new(frames).into_response()
        }
        Err(e) => error_response(e, language),
    }
}

/// Wire encoding of one pipeline event.
fn to_sse_event(event: RoastEvent) -> Event {
    match event {
        RoastEvent::Delta { text, avatar_url } => {
            let payload = match avatar_url {
                Some(avatar) => json!({ "text": text, "avatarUrl": avatar }),
                None => json!({ "text": text }),
            };
            Event::default().data(payload.to_string())
        }
        RoastEvent::Done => Event::default().data("[DONE]"),
    }
}

/// Map a pipeline error to the HTTP taxonomy, localized.
fn error_response(err: RoastError, language: Language) -> Response {
    let t = translations(language);
    match err {
        RoastError::MissingUsername => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": t.username_required })),
        )
            .into_response(),
        RoastError::UserNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": t.user_not_found })),
        )
            .into_response(),
        RoastError::RateLimited { reset_seconds } => (
            StatusCode::TOO_MANY_REQUESTS,
            [("x-ratelimit-reset", reset_seconds.to_string())],
            Json(json!({
                "error": t.rate_limit_exceeded,
                "resetInSeconds": reset_seconds,
            })),
        )
            .into_response(),
        other => {
            // Detail stays in the log; clients get the generic message.
            error!("roast request failed: {other}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": t.request_failed })),
            )
                .into_response()
        }
    }
}
