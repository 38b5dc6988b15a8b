//! In-process key-value store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::repositories::{KeyValueStore, KvResult};

/// Key-value store backed by a map.
///
/// Expired entries are dropped when read, and swept on write once the
/// earliest known expiry has passed. Data is lost on restart and is not
/// shared between processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, (String, Instant)>,
    /// Earliest expiry among stored entries; may be stale after deletes.
    next_expiry: Option<Instant>,
}

impl Inner {
    fn sweep(&mut self, now: Instant) {
        if self.next_expiry.is_none_or(|at| at > now) {
            return;
        }
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        self.next_expiry = self.entries.values().map(|(_, expires_at)| *expires_at).min();
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut inner = self.inner.lock();

        inner.sweep(now);
        inner
            .entries
            .insert(key.to_string(), (value.to_string(), expires_at));
        inner.next_expiry = Some(inner.next_expiry.map_or(expires_at, |at| at.min(expires_at)));
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<bool> {
        let removed = self.inner.lock().entries.remove(key);
        Ok(removed.is_some_and(|(_, expires_at)| expires_at > Instant::now()))
    }

    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }
}
