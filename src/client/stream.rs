//! Streaming consumer and simulated typing renderer.
//!
//! `consume_sse` parses the server's `data: <json>` frame protocol from a
//! raw byte stream. `simulate_typing` replays already-known text in small
//! randomly paced batches, so cached replays feel the same as live
//! streams.

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, RoastError};

/// A fully consumed stream: the reassembled text plus the avatar URL if
/// any frame carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedRoast {
    pub text: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    text: String,
    #[serde(rename = "avatarUrl")]
    avatar_url: Option<String>,
}

/// Consume a `text/event-stream` body.
///
/// Frames are newline-delimited `data: <json>` records terminated by
/// `data: [DONE]`. Each text delta is appended to the result and handed to
/// `on_chunk` as it arrives; the first frame carrying an avatar URL wins.
/// Malformed frames and non-data lines are skipped, matching the tolerant
/// reader on the original web client.
pub async fn consume_sse<S, B, E>(body: S, mut on_chunk: impl FnMut(&str)) -> Result<StreamedRoast>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error,
{
    let mut buffer = String::new();
    let mut text = String::new();
    let mut avatar_url: Option<String> = None;
    futures::pin_mut!(body);

    'outer: while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return Err(RoastError::Upstream(format!("stream read failed: {e}"))),
        };
        buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer = buffer[line_end + 1..].to_string();

            let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                continue;
            };
            if data == "[DONE]" {
                break 'outer;
            }
            let Ok(frame) = serde_json::from_str::<Frame>(data) else {
                continue;
            };
            if avatar_url.is_none() {
                avatar_url = frame.avatar_url;
            }
            if !frame.text.is_empty() {
                text.push_str(&frame.text);
                on_chunk(&frame.text);
            }
        }
    }

    Ok(StreamedRoast { text, avatar_url })
}

/// Replay known text through `on_chunk` in randomly sized batches of word
/// tokens with randomized delays. Pure UI pacing: the concatenation of all
/// chunks is exactly the input.
pub async fn simulate_typing(text: &str, mut on_chunk: impl FnMut(&str)) {
    let words = split_keeping_whitespace(text);
    let mut i = 0;
    while i < words.len() {
        let batch = 1 + jitter(5);
        let end = (i + batch).min(words.len());
        let chunk: String = words[i..end].concat();
        on_chunk(&chunk);
        i = end;

        let delay_ms = 10 + jitter(31) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Split into alternating word / whitespace runs; concatenating the tokens
/// reproduces the input byte for byte.
fn split_keeping_whitespace(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_ws: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let ws = ch.is_whitespace();
        match in_ws {
            Some(prev) if prev == ws => {}
            Some(_) => {
                tokens.push(&text[start..idx]);
                start = idx;
                in_ws = Some(ws);
            }
            None => in_ws = Some(ws),
        }
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Uniform-ish value in `0..bound` from CSPRNG bytes (UUID v4 is backed by
/// `getrandom`). The modulo bias is irrelevant for UI pacing.
fn jitter(bound: u32) -> usize {
    let bytes = *Uuid::new_v4().as_bytes();
    let n = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (n % bound.max(1)) as usize
}
