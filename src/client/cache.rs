//! Client-side roast cache.
//!
//! Mirrors the server's triple key with its own freshness check, so a
//! fresh local hit skips the network entirely. Size-bounded ring: past 50
//! entries the oldest goes. Persisted as JSON under `~/.gitroast/`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum entries kept; the oldest beyond this are dropped.
const CAPACITY: usize = 50;

/// Freshness window, matching the server's 24 hours.
const FRESHNESS_SECS: u64 = 24 * 60 * 60;

/// One locally cached roast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalEntry {
    pub username: String,
    pub language: String,
    pub model: String,
    pub result: String,
    pub avatar_url: Option<String>,
    /// Unix seconds at write time.
    pub timestamp: u64,
}

/// Persistent ring of recent roasts, newest last.
pub struct LocalCache {
    entries: Vec<LocalEntry>,
    path: PathBuf,
    capacity: usize,
}

impl LocalCache {
    /// Open (or create) the cache at `path`. Unreadable files start empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        Self {
            entries,
            path,
            capacity: CAPACITY,
        }
    }

    /// Fresh entry for the triple, if any. Case-insensitive on username.
    pub fn check(&self, username: &str, language: &str, model: &str) -> Option<&LocalEntry> {
        let now = Self::now_secs();
        self.entries.iter().find(|e| {
            e.username.eq_ignore_ascii_case(username)
                && e.language == language
                && e.model == model
                && now.saturating_sub(e.timestamp) < FRESHNESS_SECS
        })
    }

    /// Record a roast, replacing any entry for the same triple and
    /// dropping the oldest entries past capacity.
    pub fn add(
        &mut self,
        username: &str,
        language: &str,
        model: &str,
        result: &str,
        avatar_url: Option<String>,
    ) {
        self.entries.retain(|e| {
            !(e.username.eq_ignore_ascii_case(username)
                && e.language == language
                && e.model == model)
        });
        self.entries.push(LocalEntry {
            username: username.to_string(),
            language: language.to_string(),
            model: model.to_string(),
            result: result.to_string(),
            avatar_url,
            timestamp: Self::now_secs(),
        });
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
        self.save_to_disk();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -- private helpers ---------------------------------------------------

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn load_from_disk(path: &Path) -> Vec<LocalEntry> {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Client cache file is corrupt, starting empty: {}", e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Failed to read client cache, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    // A failed save only costs a re-fetch next time; the session keeps going.
    fn save_to_disk(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(data) = serde_json::to_string_pretty(&self.entries) {
            if let Err(e) = std::fs::write(&self.path, data) {
                warn!("Failed to save client cache: {}", e);
            }
        }
    }

    #[cfg(test)]
    fn backdate(&mut self, username: &str, secs: u64) {
        for e in self
            .entries
            .iter_mut()
            .filter(|e| e.username.eq_ignore_ascii_case(username))
        {
            e.timestamp -= secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (LocalCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalCache::open(dir.path().join("client_cache.json")), dir)
    }

    #[test]
    fn test_miss_on_empty() {
        let (cache, _dir) = test_cache();
        assert!(cache.check("octocat", "en-US", "gpt-3.5-turbo").is_none());
    }

    #[test]
    fn test_add_then_check() {
        let (mut cache, _dir) = test_cache();
        cache.add("octocat", "en-US", "gpt-3.5-turbo", "roasted", None);
        let entry = cache.check("octocat", "en-US", "gpt-3.5-turbo").unwrap();
        assert_eq!(entry.result, "roasted");
    }

    #[test]
    fn test_check_is_case_insensitive_on_username() {
        let (mut cache, _dir) = test_cache();
        cache.add("OctoCat", "en-US", "m", "r", None);
        assert!(cache.check("octocat", "en-US", "m").is_some());
    }

    #[test]
    fn test_model_mismatch_is_a_miss() {
        let (mut cache, _dir) = test_cache();
        cache.add("octocat", "en-US", "gpt-3.5-turbo", "r", None);
        assert!(cache.check("octocat", "en-US", "gpt-4o").is_none());
        assert!(cache.check("octocat", "pt-BR", "gpt-3.5-turbo").is_none());
    }

    #[test]
    fn test_stale_entry_is_a_miss() {
        let (mut cache, _dir) = test_cache();
        cache.add("octocat", "en-US", "m", "r", None);
        cache.backdate("octocat", 25 * 60 * 60);
        assert!(cache.check("octocat", "en-US", "m").is_none());
    }

    #[test]
    fn test_add_replaces_same_triple() {
        let (mut cache, _dir) = test_cache();
        cache.add("octocat", "en-US", "m", "first", None);
        cache.add("octocat", "en-US", "m", "second", None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.check("octocat", "en-US", "m").unwrap().result, "second");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (mut cache, _dir) = test_cache();
        for i in 0..55 {
            cache.add(&format!("user{i}"), "en-US", "m", "r", None);
        }
        assert_eq!(cache.len(), 50);
        assert!(cache.check("user0", "en-US", "m").is_none(), "oldest evicted");
        assert!(cache.check("user54", "en-US", "m").is_some(), "newest kept");
        assert!(cache.check("user5", "en-US", "m").is_some());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_cache.json");
        {
            let mut cache = LocalCache::open(path.clone());
            cache.add("octocat", "en-US", "m", "saved", Some("https://x/a.png".into()));
        }
        let cache = LocalCache::open(path);
        let entry = cache.check("octocat", "en-US", "m").unwrap();
        assert_eq!(entry.result, "saved");
        assert_eq!(entry.avatar_url.as_deref(), Some("https://x/a.png"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_cache.json");
        std::fs::write(&path, "[{ broken").unwrap();
        let cache = LocalCache::open(path);
        assert!(cache.is_empty());
    }
}
