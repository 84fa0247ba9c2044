use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::WindowCodecError;

/// Shared key-value storage for serialized rate limit windows.
///
/// The store is the single source of truth: the limiter reads the window on every check and
/// writes it back, with no local caching. Backends shared between processes (Redis,
/// memcached, a SQL table) make the limit global across those processes.
///
/// `get` and `set` are plain reads and writes. Two checks racing on the same key between
/// `get` and `set` may both decrement from the same base, so limits under heavy contention
/// are approximate.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Error type for storage operations.
    ///
    /// A stored value that does not decode as a window is reported through this type.
    type Error: std::error::Error + From<WindowCodecError> + Send + Sync + 'static;

    /// Fetch the serialized window at `key`. `Ok(None)` means no window yet.
    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store the serialized window at `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error>;

    /// Native key expiry, if the backend has one.
    fn expiry(&self) -> Option<&dyn ExpireKeys> {
        None
    }
}

/// Optional store capability: drop a key after a delay.
///
/// Best-effort housekeeping. The call is not awaited and its failure is not observed; the
/// limiter's own rollover check keeps stale windows harmless when expiry is missing.
pub trait ExpireKeys: Send + Sync {
    fn pexpire(&self, key: &str, ttl: Duration);
}

#[async_trait]
impl<T: WindowStore + ?Sized> WindowStore for Arc<T> {
    type Error = T::Error;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        (**self).set(key, value).await
    }

    fn expiry(&self) -> Option<&dyn ExpireKeys> {
        (**self).expiry()
    }
}

/// Errors from [`MemoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    /// A value in the map is not a valid window.
    #[error(transparent)]
    Corrupt(#[from] WindowCodecError),
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: u64,
}

/// How often a write sweeps out every expired key by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Simple in-memory window store with key expiry.
///
/// Single-process only. A key expires once the clock passes its deadline. Reading an
/// expired key drops it, and writes sweep out every expired key at most once per sweep
/// interval, so subjects that never come back do not pile up. Cloning shares the map.
#[derive(Clone, Debug)]
pub struct MemoryStore<C = SystemClock> {
    data: Arc<Mutex<Entries>>,
    sweep_interval: u64,
    clock: C,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Create a store whose expiry deadlines follow `clock`.
    pub fn with_clock(clock: C) -> Self {
        let sweep_interval = millis(DEFAULT_SWEEP_INTERVAL);
        let next_sweep = clock.now_millis().saturating_add(sweep_interval);
        Self {
            data: Arc::new(Mutex::new(Entries { map: HashMap::new(), next_sweep })),
            sweep_interval,
            clock,
        }
    }

    /// Change how often writes sweep expired keys. Takes effect after the next sweep.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = millis(interval);
        self
    }

    // Entries are plain values, so a panic mid-update cannot leave a half-written one.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live<'a>(guard: &'a mut MutexGuard<'_, Entries>, key: &str, now: u64) -> Option<&'a Entry> {
        if guard.map.get(key).is_some_and(|e| e.is_expired(now)) {
            guard.map.remove(key);
            return None;
        }
        guard.map.get(key)
    }

    fn sweep(&self, entries: &mut Entries, now: u64) -> usize {
        let before = entries.map.len();
        entries.map.retain(|_, e| !e.is_expired(now));
        entries.next_sweep = now.saturating_add(self.sweep_interval);
        before - entries.map.len()
    }

    /// Drop every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        let removed = self.sweep(&mut guard, now);
        if removed > 0 {
            debug!(removed, remaining = guard.map.len(), "Purged expired rate limit windows");
        }
        removed
    }

    /// Read the raw stored value, honoring expiry.
    pub fn raw_get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        Self::live(&mut guard, key, now).map(|e| e.value.clone())
    }

    /// Write a raw value with no expiry.
    pub fn raw_set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().map.insert(key.into(), Entry { value: value.into(), expires_at: None });
    }

    /// Remaining time to live for `key`, if it has an expiry set.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        let at = Self::live(&mut guard, key, now)?.expires_at?;
        Some(Duration::from_millis(at.saturating_sub(now)))
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.lock().map.clear();
    }
}

#[async_trait]
impl<C: Clock + 'static> WindowStore for MemoryStore<C> {
    type Error = MemoryStoreError;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.raw_get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        if now >= guard.next_sweep {
            let removed = self.sweep(&mut guard, now);
            if removed > 0 {
                debug!(removed, remaining = guard.map.len(), "Swept expired rate limit windows");
            }
        }
        // A plain SET clears any pending expiry, as in Redis.
        guard.map.insert(key.to_string(), Entry { value, expires_at: None });
        Ok(())
    }

    fn expiry(&self) -> Option<&dyn ExpireKeys> {
        Some(self)
    }
}

impl<C: Clock> ExpireKeys for MemoryStore<C> {
    fn pexpire(&self, key: &str, ttl: Duration) {
        let at = self.clock.now_millis().saturating_add(millis(ttl));
        if let Some(entry) = self.lock().map.get_mut(key) {
            entry.expires_at = Some(at);
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
