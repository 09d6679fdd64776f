//! The `gitroast roast` terminal client.
//!
//! Mirrors the original web client: check the local cache first, otherwise
//! call the server and switch on the response content type. Streamed
//! responses print as frames arrive; buffered and cached text is replayed
//! through the typing simulator so the pacing feels the same either way.

use std::io::Write;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::client::{consume_sse, simulate_typing, LocalCache};
use crate::config::Config;
use crate::i18n::Language;

/// Buffered roast response body.
#[derive(Debug, Deserialize)]
struct RoastResponse {
    shame: String,
    language: String,
    model: String,
    #[serde(rename = "fromCache", default)]
    from_cache: bool,
    #[serde(rename = "avatarUrl")]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(rename = "resetInSeconds")]
    reset_in_seconds: Option<u64>,
}

fn print_chunk(chunk: &str) {
    print!("{chunk}");
    let _ = std::io::stdout().flush();
}

/// Run the client flow for one username.
pub async fn run(config: &Config, username: &str, lang: Option<&str>, server: &str) -> anyhow::Result<()> {
    let language = Language::resolve(lang, "");
    let model = &config.llm.model;

    let mut cache = LocalCache::open(Config::data_dir().join("client_cache.json"));

    // A fresh local hit never touches the network.
    if let Some(entry) = cache.check(username, language.as_str(), model) {
        let text = entry.result.clone();
        simulate_typing(&text, print_chunk).await;
        println!();
        return Ok(());
    }

    let url = format!(
        "{}/roast?username={}&lang={}",
        server.trim_end_matches('/'),
        username,
        language.as_str()
    );
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("request to {server} failed"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
            match err.reset_in_seconds {
                Some(reset) => bail!("{} (retry in {}s)", err.error, reset),
                None => bail!("{}", err.error),
            }
        }
        bail!("server returned {status}");
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("text/event-stream") {
        let roast = consume_sse(response.bytes_stream(), print_chunk).await?;
        println!();
        cache.add(
            username,
            language.as_str(),
            model,
            &roast.text,
            roast.avatar_url,
        );
    } else {
        let roast: RoastResponse = response.json().await.context("malformed roast response")?;
        simulate_typing(&roast.shame, print_chunk).await;
        println!();
        if roast.from_cache {
            tracing::debug!("server answered from cache");
        }
        cache.add(
            username,
            &roast.language,
            &roast.model,
            &roast.shame,
            roast.avatar_url,
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roast_response_parses_wire_shape() {
        let body = r#"{
            "shame": "Nice repos, very empty.",
            "language": "en-US",
            "model": "gpt-3.5-turbo",
            "fromCache": true,
            "avatarUrl": null
        }"#;
        let parsed: RoastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.shame, "Nice repos, very empty.");
        assert!(parsed.from_cache);
        assert!(parsed.avatar_url.is_none());
    }

    #[test]
    fn test_error_response_parses_rate_limit_shape() {
        let body = r#"{"error": "Rate limit exceeded. Try again later.", "resetInSeconds": 31}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.reset_in_seconds, Some(31));
        assert!(parsed.error.starts_with("Rate limit"));
    }

    #[test]
    fn test_error_response_parses_plain_error() {
        let body = r#"{"error": "GitHub user not found"}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.reset_in_seconds, None);
    }
}
