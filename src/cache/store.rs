//! Server-side roast cache.
//!
//! Persists to `~/.gitroast/shame_cache.json`. Rows are keyed by the
//! (username, language, model) triple; `upsert` enforces one live row per
//! triple by lookup-before-write, the storage itself carries no uniqueness
//! constraint (duplicate rows from concurrent misses are possible and
//! tolerated). Freshness for serving and retention for deletion are
//! separate windows.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RoastError};

/// One cached roast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRow {
    pub id: u64,
    /// Lowercased at write time.
    pub username: String,
    pub language: String,
    /// `None` on rows written before generation was model-tagged.
    pub model: Option<String>,
    pub shame_text: String,
    pub avatar_url: Option<String>,
    /// Unix seconds. Freshness anchor; reset on every regeneration.
    pub created_at: u64,
    /// Unix seconds. Refreshed on every hit; drives retention sweeps.
    pub last_access: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    rows: Vec<CacheRow>,
}

/// Persistent roast cache with a freshness window and JSON persistence.
///
/// Constructed explicitly and shared behind an `Arc`; all methods take
/// `&self` and serialize access internally.
pub struct ShameCache {
    store: Mutex<StoreFile>,
    path: PathBuf,
    freshness_secs: u64,
}

impl ShameCache {
    /// Open (or create) the cache at `path`.
    ///
    /// A corrupt or unreadable file logs a warning and starts empty; the
    /// cache is never allowed to take the service down.
    pub fn open(path: PathBuf, freshness_secs: u64) -> Self {
        let store = Self::load_from_disk(&path);
        Self {
            store: Mutex::new(store),
            path,
            freshness_secs,
        }
    }

    /// Fresh-row lookup for a triple.
    ///
    /// Username matches case-insensitively. A row tagged with a model
    /// matches only that model; legacy rows (no tag) match any request; a
    /// caller passing `None` matches any row. A hit refreshes
    /// `last_access` in memory; the disk flush is deferred to the next
    /// mutating call, avoiding a write per read.
    pub fn lookup(&self, username: &str, language: &str, model: Option<&str>) -> Option<CacheRow> {
        let now = Self::now_secs();
        let username = username.to_lowercase();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());

        let freshness = self.freshness_secs;
        let row = store.rows.iter_mut().find(|r| {
            r.username == username
                && r.language == language
                && model_matches(r.model.as_deref(), model)
                && now.saturating_sub(r.created_at) <= freshness
        })?;

        row.last_access = now;
        debug!(username = %row.username, language = %row.language, "cache hit");
        Some(row.clone())
    }

    /// Insert or replace the row for an exact triple.
    ///
    /// An existing row keeps its id and its avatar unless `avatar_url`
    /// supplies a new one; `created_at` and `last_access` reset to now. A
    /// persistence failure is returned to the caller (the in-memory row is
    /// still updated, so the running process stays coherent).
    pub fn upsert(
        &self,
        username: &str,
        language: &str,
        model: &str,
        shame_text: &str,
        avatar_url: Option<String>,
    ) -> Result<CacheRow> {
        let now = Self::now_secs();
        let username = username.to_lowercase();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());

        let row = match store
            .rows
            .iter_mut()
            .find(|r| r.username == username && r.language == language && r.model.as_deref() == Some(model))
        {
            Some(existing) => {
                existing.shame_text = shame_text.to_string();
                existing.created_at = now;
                existing.last_access = now;
                if avatar_url.is_some() {
                    existing.avatar_url = avatar_url;
                }
                existing.clone()
            }
            None => {
                store.next_id += 1;
                let row = CacheRow {
                    id: store.next_id,
                    username,
                    language: language.to_string(),
                    model: Some(model.to_string()),
                    shame_text: shame_text.to_string(),
                    avatar_url,
                    created_at: now,
                    last_access: now,
                };
                store.rows.push(row.clone());
                row
            }
        };

        self.save_to_disk(&store)?;
        Ok(row)
    }

    /// Set the avatar on every row of a username that lacks one.
    ///
    /// Text and timestamps are untouched. Returns the number of rows
    /// updated.
    pub fn backfill_avatar(&self, username: &str, avatar_url: &str) -> Result<usize> {
        let username = username.to_lowercase();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());

        let mut updated = 0;
        for row in store
            .rows
            .iter_mut()
            .filter(|r| r.username == username && r.avatar_url.is_none())
        {
            row.avatar_url = Some(avatar_url.to_string());
            updated += 1;
        }

        if updated > 0 {
            self.save_to_disk(&store)?;
        }
        Ok(updated)
    }

    /// Distinct usernames having at least one avatar-less row.
    pub fn usernames_missing_avatar(&self) -> Vec<String> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = store
            .rows
            .iter()
            .filter(|r| r.avatar_url.is_none())
            .map(|r| r.username.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Delete rows untouched for longer than `retention_secs`. Returns the
    /// number deleted.
    pub fn sweep(&self, retention_secs: u64) -> Result<usize> {
        let now = Self::now_secs();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());

        let before = store.rows.len();
        store
            .rows
            .retain(|r| now.saturating_sub(r.last_access) <= retention_secs);
        let deleted = before - store.rows.len();

        if deleted > 0 {
            debug!(deleted, "swept stale cache rows");
            self.save_to_disk(&store)?;
        }
        Ok(deleted)
    }

    /// All rows, most recently accessed first. Report view only.
    pub fn list_all(&self) -> Vec<CacheRow> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows = store.rows.clone();
        rows.sort_by(|a, b| b.last_access.cmp(&a.last_access));
        rows
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- private helpers ---------------------------------------------------

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn load_from_disk(path: &Path) -> StoreFile {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(store) => store,
                Err(e) => {
                    warn!("Cache file is corrupt, starting empty: {}", e);
                    StoreFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => {
                warn!("Failed to read cache file, starting empty: {}", e);
                StoreFile::default()
            }
        }
    }

    fn save_to_disk(&self, store: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(store)
            .map_err(|e| RoastError::Cache(format!("serialize cache: {e}")))?;
        std::fs::write(&self.path, data)
            .map_err(|e| RoastError::Cache(format!("write {}: {e}", self.path.display())))
    }

    #[cfg(test)]
    fn backdate_created(&self, id: u64, secs: u64) {
        let mut store = self.store.lock().unwrap();
        if let Some(row) = store.rows.iter_mut().find(|r| r.id == id) {
            row.created_at -= secs;
        }
    }

    #[cfg(test)]
    fn backdate_access(&self, id: u64, secs: u64) {
        let mut store = self.store.lock().unwrap();
        if let Some(row) = store.rows.iter_mut().find(|r| r.id == id) {
            row.last_access -= secs;
        }
    }
}

/// Row/request model matching: tagged rows are strict, legacy rows match
/// anything, and callers that don't care match anything.
fn model_matches(row_model: Option<&str>, requested: Option<&str>) -> bool {
    match (row_model, requested) {
        (Some(row), Some(req)) => row == req,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (ShameCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShameCache::open(dir.path().join("cache.json"), 24 * 60 * 60);
        (cache, dir)
    }

    #[test]
    fn test_lookup_miss_on_empty() {
        let (cache, _dir) = test_cache();
        assert!(cache.lookup("octocat", "en-US", Some("gpt-3.5-turbo")).is_none());
    }

    #[test]
    fn test_upsert_then_lookup() {
        let (cache, _dir) = test_cache();
        cache
            .upsert("octocat", "en-US", "gpt-3.5-turbo", "Nice repos, very empty.", None)
            .unwrap();
        let row = cache
            .lookup("octocat", "en-US", Some("gpt-3.5-turbo"))
            .unwrap();
        assert_eq!(row.shame_text, "Nice repos, very empty.");
    }

    #[test]
    fn test_lookup_username_case_insensitive() {
        let (cache, _dir) = test_cache();
        cache
            .upsert("OctoCat", "en-US", "m", "text", None)
            .unwrap();
        assert!(cache.lookup("octocat", "en-US", Some("m")).is_some());
        assert!(cache.lookup("OCTOCAT", "en-US", Some("m")).is_some());
    }

    #[test]
    fn test_freshness_bound() {
        let (cache, _dir) = test_cache();
        let row = cache.upsert("octocat", "en-US", "m", "old", None).unwrap();

        // 1 hour old: still served.
        cache.backdate_created(row.id, 60 * 60);
        assert!(cache.lookup("octocat", "en-US", Some("m")).is_some());

        // 25 hours old: never served.
        cache.backdate_created(row.id, 24 * 60 * 60);
        assert!(cache.lookup("octocat", "en-US", Some("m")).is_none());
    }

    #[test]
    fn test_two_upserts_leave_one_row_with_second_text() {
        let (cache, _dir) = test_cache();
        cache.upsert("octocat", "en-US", "m", "first", None).unwrap();
        cache.upsert("octocat", "en-US", "m", "second", None).unwrap();
        assert_eq!(cache.len(), 1);
        let row = cache.lookup("octocat", "en-US", Some("m")).unwrap();
        assert_eq!(row.shame_text, "second");
    }

    #[test]
    fn test_upsert_preserves_avatar_when_not_supplied() {
        let (cache, _dir) = test_cache();
        cache
            .upsert("octocat", "en-US", "m", "v1", Some("https://x/a.png".into()))
            .unwrap();
        let row = cache.upsert("octocat", "en-US", "m", "v2", None).unwrap();
        assert_eq!(row.avatar_url.as_deref(), Some("https://x/a.png"));
        assert_eq!(row.shame_text, "v2");
    }

    #[test]
    fn test_upsert_overwrites_avatar_when_supplied() {
        let (cache, _dir) = test_cache();
        cache
            .upsert("octocat", "en-US", "m", "v1", Some("https://x/a.png".into()))
            .unwrap();
        let row = cache
            .upsert("octocat", "en-US", "m", "v2", Some("https://x/b.png".into()))
            .unwrap();
        assert_eq!(row.avatar_url.as_deref(), Some("https://x/b.png"));
    }

    #[test]
    fn test_different_triples_are_distinct_rows() {
        let (cache, _dir) = test_cache();
        cache.upsert("octocat", "en-US", "m", "en", None).unwrap();
        cache.upsert("octocat", "pt-BR", "m", "pt", None).unwrap();
        cache.upsert("octocat", "en-US", "other", "alt", None).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.lookup("octocat", "pt-BR", Some("m")).unwrap().shame_text,
            "pt"
        );
    }

    #[test]
    fn test_legacy_row_matches_any_model() {
        let (cache, _dir) = test_cache();
        // Write a legacy row directly: no model tag.
        {
            let mut store = cache.store.lock().unwrap();
            store.next_id += 1;
            let next_id = store.next_id;
            let now = ShameCache::now_secs();
            store.rows.push(CacheRow {
                id: next_id,
                username: "octocat".into(),
                language: "en-US".into(),
                model: None,
                shame_text: "legacy".into(),
                avatar_url: None,
                created_at: now,
                last_access: now,
            });
        }
        assert!(cache.lookup("octocat", "en-US", Some("gpt-4o")).is_some());
        assert!(cache.lookup("octocat", "en-US", None).is_some());
    }

    #[test]
    fn test_tagged_row_is_model_strict() {
        let (cache, _dir) = test_cache();
        cache.upsert("octocat", "en-US", "gpt-3.5-turbo", "t", None).unwrap();
        assert!(cache.lookup("octocat", "en-US", Some("gpt-4o")).is_none());
        assert!(cache.lookup("octocat", "en-US", None).is_some());
    }

    #[test]
    fn test_backfill_avatar_leaves_text_and_created_at() {
        let (cache, _dir) = test_cache();
        let row = cache.upsert("torvalds", "en-US", "m", "kernel roast", None).unwrap();
        let created = row.created_at;

        let updated = cache.backfill_avatar("torvalds", "https://x/a.png").unwrap();
        assert_eq!(updated, 1);

        let row = cache.lookup("torvalds", "en-US", Some("m")).unwrap();
        assert_eq!(row.avatar_url.as_deref(), Some("https://x/a.png"));
        assert_eq!(row.shame_text, "kernel roast");
        assert_eq!(row.created_at, created);
    }

    #[test]
    fn test_backfill_skips_rows_with_avatar() {
        let (cache, _dir) = test_cache();
        cache
            .upsert("torvalds", "en-US", "m", "a", Some("https://x/keep.png".into()))
            .unwrap();
        cache.upsert("torvalds", "pt-BR", "m", "b", None).unwrap();

        let updated = cache.backfill_avatar("torvalds", "https://x/new.png").unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            cache.lookup("torvalds", "en-US", Some("m")).unwrap().avatar_url.as_deref(),
            Some("https://x/keep.png")
        );
    }

    #[test]
    fn test_usernames_missing_avatar_dedupes() {
        let (cache, _dir) = test_cache();
        cache.upsert("alpha", "en-US", "m", "a", None).unwrap();
        cache.upsert("alpha", "pt-BR", "m", "b", None).unwrap();
        cache
            .upsert("beta", "en-US", "m", "c", Some("https://x/b.png".into()))
            .unwrap();
        assert_eq!(cache.usernames_missing_avatar(), vec!["alpha".to_string()]);
    }

    #[test]
    fn test_sweep_deletes_only_stale_rows() {
        let (cache, _dir) = test_cache();
        let stale = cache.upsert("old", "en-US", "m", "old", None).unwrap();
        cache.upsert("new", "en-US", "m", "new", None).unwrap();
        cache.backdate_access(stale.id, 8 * 24 * 60 * 60);

        let deleted = cache.sweep(7 * 24 * 60 * 60).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("new", "en-US", Some("m")).is_some());
    }

    #[test]
    fn test_hit_refreshes_last_access() {
        let (cache, _dir) = test_cache();
        let row = cache.upsert("octocat", "en-US", "m", "t", None).unwrap();
        cache.backdate_access(row.id, 1000);

        let before = cache.list_all()[0].last_access;
        cache.lookup("octocat", "en-US", Some("m")).unwrap();
        let after = cache.list_all()[0].last_access;
        assert!(after >= before + 1000 - 1);
    }

    #[test]
    fn test_list_all_descending_last_access() {
        let (cache, _dir) = test_cache();
        let a = cache.upsert("a", "en-US", "m", "a", None).unwrap();
        let b = cache.upsert("b", "en-US", "m", "b", None).unwrap();
        cache.backdate_access(a.id, 500);
        cache.backdate_access(b.id, 100);

        let rows = cache.list_all();
        assert_eq!(rows[0].username, "b");
        assert_eq!(rows[1].username, "a");
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let cache = ShameCache::open(path.clone(), 86_400);
            cache.upsert("octocat", "en-US", "m", "persisted", None).unwrap();
        }
        let cache = ShameCache::open(path, 86_400);
        assert_eq!(
            cache.lookup("octocat", "en-US", Some("m")).unwrap().shame_text,
            "persisted"
        );
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = ShameCache::open(path, 86_400);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ids_keep_incrementing_across_triples() {
        let (cache, _dir) = test_cache();
        let a = cache.upsert("a", "en-US", "m", "a", None).unwrap();
        let b = cache.upsert("b", "en-US", "m", "b", None).unwrap();
        assert!(b.id > a.id);
        // Replacing keeps the original id.
        let a2 = cache.upsert("a", "en-US", "m", "a2", None).unwrap();
        assert_eq!(a2.id, a.id);
    }
}
