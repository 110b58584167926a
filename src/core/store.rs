//! Persistence and clock ports
//!
//! The gateway never reaches for ambient global state; it talks to a named
//! option store, an expiring cache store and a clock through these traits.
//! In-memory implementations back the tests and embedded use, the file
//! store keeps quota state across process restarts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::core::errors::{GatewayError, Result};

/// Named persistent values (credential, premium flag, quota counter)
pub trait OptionStore: Send + Sync + fmt::Debug {
    /// Read a value, `None` when absent
    fn get(&self, name: &str) -> Option<String>;

    /// Write a value
    fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Remove a value
    fn delete(&self, name: &str) -> Result<()>;

    /// Read a value with a default
    fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }
}

/// Expiring key/value store backing the request cache.
///
/// Expiry is lazy: entries past their deadline are treated as absent on
/// the next `get`, there is no eviction thread.
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Read a live value, `None` when absent or expired at `now`
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String>;

    /// Write a value valid for `ttl_secs` from `now`
    fn set(&self, key: &str, value: &str, ttl_secs: u64, now: DateTime<Utc>) -> Result<()>;
}

/// Wall clock, injected so tests can steer dates
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and deterministic embedding
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp
    pub fn at(rfc3339: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.write().unwrap();
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// In-memory option store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.values.write().unwrap().remove(name);
        Ok(())
    }
}

/// One cached value with its expiry deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheSlot {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory cache store with lazy expiry
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: RwLock<HashMap<String, CacheSlot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let expired = {
            let slots = self.slots.read().unwrap();
            match slots.get(key) {
                Some(slot) if slot.expires_at > now => return Some(slot.value.clone()),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.slots.write().unwrap().remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64, now: DateTime<Utc>) -> Result<()> {
        let slot = CacheSlot {
            value: value.to_string(),
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
        };
        self.slots.write().unwrap().insert(key.to_string(), slot);
        Ok(())
    }
}

/// JSON-file-backed option store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store at `path`, loading existing values if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content).map_err(|e| GatewayError::StoreError {
            message: format!("failed to write {}: {}", self.path.display(), e),
        })
    }
}

impl OptionStore for FileStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap();
        values.insert(name.to_string(), value.to_string());
        self.flush(&values)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut values = self.values.write().unwrap();
        values.remove(name);
        self.flush(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("api_key"), None);
        assert_eq!(store.get_or("api_key", ""), "");

        store.set("api_key", "gsk_test").unwrap();
        assert_eq!(store.get("api_key").as_deref(), Some("gsk_test"));

        store.delete("api_key").unwrap();
        assert_eq!(store.get("api_key"), None);
    }

    #[test]
    fn test_memory_cache_expires_lazily() {
        let cache = MemoryCache::new();
        let t0 = Utc::now();

        cache.set("k", "v", 3600, t0).unwrap();
        assert_eq!(cache.get("k", t0).as_deref(), Some("v"));

        // Within the TTL window
        let t1 = t0 + chrono::Duration::seconds(3599);
        assert_eq!(cache.get("k", t1).as_deref(), Some("v"));

        // Past the TTL window the entry is treated as absent
        let t2 = t0 + chrono::Duration::seconds(3601);
        assert_eq!(cache.get("k", t2), None);
        assert_eq!(cache.get("k", t0), None);
    }

    #[test]
    fn test_memory_cache_overwrite_refreshes_ttl() {
        let cache = MemoryCache::new();
        let t0 = Utc::now();

        cache.set("k", "old", 60, t0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(30);
        cache.set("k", "new", 60, t1).unwrap();

        let t2 = t0 + chrono::Duration::seconds(70);
        assert_eq!(cache.get("k", t2).as_deref(), Some("new"));
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("calls_today", "3").unwrap();
            store.set("is_premium", "true").unwrap();
            store.delete("is_premium").unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("calls_today").as_deref(), Some("3"));
        assert_eq!(store.get("is_premium"), None);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at("2026-08-06T10:00:00Z");
        let today = clock.today();

        clock.advance(chrono::Duration::hours(13));
        assert_ne!(clock.today(), today);
    }
}
