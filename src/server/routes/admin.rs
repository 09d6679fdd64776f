//! Admin endpoints: avatar backfill and the cache report.
//!
//! Both are gated on the shared admin secret. With no secret configured
//! they are effectively disabled (401 / 404).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub secret: String,
}

fn secret_matches(state: &AppState, supplied: &str) -> bool {
    matches!(&state.config.admin.secret, Some(secret) if secret == supplied)
}

/// Handler for `POST /admin/refresh-avatars`.
///
/// Re-fetches the avatar of every username that has cache rows without
/// one, and backfills those rows.
pub async fn refresh_avatars(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshBody>,
) -> (StatusCode, Json<Value>) {
    if !secret_matches(&state, &body.secret) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Unauthorized" })),
        );
    }

    let usernames = state.cache.usernames_missing_avatar();
    let mut updates = Vec::new();
    let mut total_updated = 0usize;

    for username in &usernames {
        // One bad username must not abort the batch.
        let avatar = match state.profiles.fetch_avatar(username).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                warn!(username = %username, "no avatar URL on the profile, skipping");
                continue;
            }
            Err(e) => {
                warn!(username = %username, "avatar fetch failed: {e}");
                continue;
            }
        };

        match state.cache.backfill_avatar(username, &avatar) {
            Ok(count) => {
                total_updated += count;
                updates.push(json!({
                    "username": username,
                    "updatedCount": count,
                    "avatarUrl": avatar,
                }));
            }
            Err(e) => warn!(username = %username, "avatar backfill failed: {e}"),
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Avatars updated for all users with missing avatars",
            "uniqueUsersUpdated": usernames.len(),
            "totalRecordsUpdated": total_updated,
            "updates": updates,
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub s: Option<String>,
}

/// One row of the report view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    id: u64,
    username: String,
    language: String,
    model: Option<String>,
    shame_text: String,
    avatar_url: Option<String>,
    created_at: String,
    last_access: String,
}

fn rfc3339(secs: u64) -> String {
    DateTime::from_timestamp(secs as i64, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

/// Handler for `GET /admin/report?s=<secret>`.
///
/// Returns all cache rows, most recently accessed first. A wrong or
/// missing secret looks like a missing page.
pub async fn report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Response {
    let supplied = params.s.as_deref().unwrap_or("");
    if !secret_matches(&state, supplied) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let rows: Vec<ReportRow> = state
        .cache
        .list_all()
        .into_iter()
        .map(|row| ReportRow {
            id: row.id,
            username: row.username,
            language: row.language,
            model: row.model,
            shame_text: row.shame_text,
            avatar_url: row.avatar_url,
            created_at: rfc3339(row.created_at),
            last_access: rfc3339(row.last_access),
        })
        .collect();

    Json(rows).into_response()
}
