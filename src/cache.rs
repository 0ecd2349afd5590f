//! Durable per-user, per-year grid snapshots for instant paint.
//!
//! Nothing here returns an error to the caller: storage failures and
//! unreadable data are logged and behave like a cache miss.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::models::{Category, CategoryType, MonthValues};

/// Bump when the snapshot layout changes; old keys then simply miss.
pub const SCHEMA_VERSION: u32 = 1;

pub fn cache_key(user_id: &str, year: i32) -> String {
    format!("finance:{SCHEMA_VERSION}:{user_id}:{year}")
}

/// Minimal key-value storage the cache is written through.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCategory {
    pub id: i64,
    pub name: String,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
    pub values: MonthValues,
}

impl CachedCategory {
    pub fn new(category: &Category, values: MonthValues) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            category_type: category.category_type,
            parent_id: category.parent_id,
            values,
        }
    }

    pub fn category(&self) -> Category {
        Category {
            id: self.id,
            name: self.name.clone(),
            category_type: self.category_type,
            parent_id: self.parent_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub income: Vec<CachedCategory>,
    pub expense: Vec<CachedCategory>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.income.is_empty() && self.expense.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &CachedCategory> {
        self.income.iter().chain(self.expense.iter())
    }
}

pub struct LocalCache<K: KvStore> {
    kv: K,
}

impl<K: KvStore> LocalCache<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn write(&self, user_id: &str, year: i32, snapshot: &Snapshot) {
        let key = cache_key(user_id, year);
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(%key, error = %e, "could not serialize grid snapshot");
                return;
            }
        };
        match self.kv.set(&key, &json) {
            Ok(()) => tracing::debug!(%key, bytes = json.len(), "grid snapshot cached"),
            Err(e) => tracing::warn!(%key, error = %e, "cache write failed"),
        }
    }

    pub fn read(&self, user_id: &str, year: i32) -> Option<Snapshot> {
        let key = cache_key(user_id, year);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(%key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    pub fn clear(&self, user_id: &str, year: i32) {
        let key = cache_key(user_id, year);
        if let Err(e) = self.kv.remove(&key) {
            tracing::warn!(%key, error = %e, "cache clear failed");
        }
    }
}

/// In-process store, mainly for tests. Can be made to fail on demand.
#[derive(Debug)]
pub struct MemoryKv {
    entries: RefCell<HashMap<String, String>>,
    available: bool,
    quota: Option<usize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: RefCell::default(),
            available: true,
            quota: None,
        }
    }

    /// A store whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// A store that refuses writes once the stored values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::new()
        }
    }

    pub fn raw_set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn check(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(TallyError::StorageUnavailable("memory store disabled".into()))
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.borrow_mut();
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > quota {
                return Err(TallyError::StorageUnavailable(format!(
                    "quota of {quota} bytes exceeded"
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Key-value table in its own SQLite file, kept apart from the ledger.
pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 updated_at TEXT DEFAULT (datetime('now'))
             );",
        )
        .map_err(unavailable)?;
        Ok(Self { conn })
    }
}

fn unavailable(e: rusqlite::Error) -> TallyError {
    TallyError::StorageUnavailable(e.to_string())
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                [key, value],
            )
            .map_err(unavailable)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZERO_MONTHS;
    use rust_decimal::Decimal;

    fn snapshot() -> Snapshot {
        let mut values = ZERO_MONTHS;
        values[0] = "100.10".parse().unwrap();
        values[11] = Decimal::from(-3);
        Snapshot {
            income: vec![
                CachedCategory {
                    id: 1,
                    name: "Salary".into(),
                    category_type: CategoryType::Income,
                    parent_id: None,
                    values,
                },
                CachedCategory {
                    id: 2,
                    name: "Bonus".into(),
                    category_type: CategoryType::Income,
                    parent_id: Some(1),
                    values,
                },
            ],
            expense: vec![CachedCategory {
                id: 3,
                name: "Food".into(),
                category_type: CategoryType::Expense,
                parent_id: None,
                values: ZERO_MONTHS,
            }],
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(cache_key("alice", 2025), format!("finance:{SCHEMA_VERSION}:alice:2025"));
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let cache = LocalCache::new(MemoryKv::new());
        let snap = snapshot();
        cache.write("alice", 2025, &snap);
        assert_eq!(cache.read("alice", 2025), Some(snap));
    }

    #[test]
    fn test_read_never_written_is_none() {
        let cache = LocalCache::new(MemoryKv::new());
        assert!(cache.read("alice", 2025).is_none());
        cache.write("alice", 2025, &snapshot());
        assert!(cache.read("alice", 2024).is_none());
        assert!(cache.read("bob", 2025).is_none());
    }

    #[test]
    fn test_clear_removes_entry() {
        let cache = LocalCache::new(MemoryKv::new());
        cache.write("alice", 2025, &snapshot());
        cache.clear("alice", 2025);
        assert!(cache.read("alice", 2025).is_none());
        assert!(cache.kv().keys().is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let kv = MemoryKv::new();
        kv.raw_set(&cache_key("alice", 2025), "{not json");
        let cache = LocalCache::new(kv);
        assert!(cache.read("alice", 2025).is_none());
    }

    #[test]
    fn test_wrong_shape_is_a_miss() {
        let kv = MemoryKv::new();
        kv.raw_set(&cache_key("alice", 2025), r#"{"income": [{"id": 1, "values": [1, 2]}]}"#);
        let cache = LocalCache::new(kv);
        assert!(cache.read("alice", 2025).is_none());
    }

    #[test]
    fn test_old_schema_keys_are_ignored() {
        let kv = MemoryKv::new();
        let old = format!("finance:{}:alice:2025", SCHEMA_VERSION + 100);
        kv.raw_set(&old, &serde_json::to_string(&snapshot()).unwrap());
        let cache = LocalCache::new(kv);
        assert!(cache.read("alice", 2025).is_none());
    }

    #[test]
    fn test_unavailable_store_never_panics() {
        let cache = LocalCache::new(MemoryKv::unavailable());
        cache.write("alice", 2025, &snapshot());
        assert!(cache.read("alice", 2025).is_none());
        cache.clear("alice", 2025);
    }

    #[test]
    fn test_quota_exhaustion_is_silent() {
        let cache = LocalCache::new(MemoryKv::with_quota(16));
        cache.write("alice", 2025, &snapshot());
        assert!(cache.read("alice", 2025).is_none());
    }

    #[test]
    fn test_sqlite_kv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let snap = snapshot();
        {
            let cache = LocalCache::new(SqliteKv::open(&path).unwrap());
            cache.write("alice", 2025, &snap);
            cache.write("alice", 2025, &snap);
        }
        let cache = LocalCache::new(SqliteKv::open(&path).unwrap());
        assert_eq!(cache.read("alice", 2025), Some(snap));
        cache.clear("alice", 2025);
        assert!(cache.read("alice", 2025).is_none());
    }

    #[test]
    fn test_snapshot_rows_cover_both_sides() {
        let snap = snapshot();
        let ids: Vec<i64> = snap.rows().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(!snap.is_empty());
        assert!(Snapshot::default().is_empty());
    }
}
