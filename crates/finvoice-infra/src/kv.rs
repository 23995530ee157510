//! In-memory key-value store with per-key expiry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use finvoice_core::error::FinvoiceResult;
use finvoice_core::external::KeyValueStore;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local store. Expired entries are dropped lazily on read.
///
/// Uses tokio's clock so expiry can be driven by paused time in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> FinvoiceResult<()> {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> FinvoiceResult<Option<String>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> FinvoiceResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
