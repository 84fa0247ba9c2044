//! The fixed-window check.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::config::RateLimitConfig;
use super::key::{CacheKey, RequestMeta};
use super::store::WindowStore;
use super::window::RateLimitWindow;
use super::Verdict;
use crate::clock::{Clock, SystemClock};

/// Fixed-window limiter bound to one configuration and one store.
///
/// Holds no window state of its own; every check goes to the store. Cheap to share behind an
/// `Arc` across tasks, and several limiters (in one or many processes) may point at the same
/// store.
///
/// Each check runs strictly in order: store `get`, compute, store `set`, optional expire,
/// decide. The only suspension points are `get` and `set`.
pub struct FixedWindowLimiter<Req, S, C = SystemClock> {
    config: RateLimitConfig<Req>,
    store: Arc<S>,
    clock: C,
}

impl<Req, S, C: std::fmt::Debug> std::fmt::Debug for FixedWindowLimiter<Req, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .field("store", &"<store>")
            .field("clock", &self.clock)
            .finish()
    }
}

impl<Req, S> FixedWindowLimiter<Req, S>
where
    S: WindowStore,
{
    /// Create a limiter using the system wall clock.
    pub fn new(config: RateLimitConfig<Req>, store: S) -> Self {
        Self::from_shared(config, Arc::new(store))
    }

    /// Create a limiter over a store handle shared with other components.
    pub fn from_shared(config: RateLimitConfig<Req>, store: Arc<S>) -> Self {
        Self { config, store, clock: SystemClock }
    }
}

impl<Req, S, C> FixedWindowLimiter<Req, S, C>
where
    S: WindowStore,
    C: Clock,
{
    /// Replace the clock. Every process sharing a store must agree on the epoch.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> FixedWindowLimiter<Req, S, C2> {
        FixedWindowLimiter { config: self.config, store: self.store, clock }
    }

    pub fn config(&self) -> &RateLimitConfig<Req> {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Compose the cache key for `req` from the enabled dimensions.
    pub fn key_for(&self, req: &Req) -> CacheKey
    where
        Req: RequestMeta,
    {
        let mut key = CacheKey::builder(self.config.namespace());
        if self.config.per_route() {
            key = key.push(req.path());
        }
        if self.config.per_method() {
            key = key.push(req.method());
        }
        if let Some(lookup) = self.config.lookup() {
            key = key.extend(lookup(req));
        }
        let key = key.build();
        trace!(key = %key, "Composed rate limit key");
        key
    }

    /// Count one hit for `req` and decide.
    ///
    /// Store failures are returned unchanged and end the check: nothing after the failing
    /// step runs. A failed `set` loses the hit.
    pub async fn check(&self, req: &Req) -> Result<Verdict, S::Error>
    where
        Req: RequestMeta,
    {
        let key = self.key_for(req);
        self.check_key(key).await
    }

    /// Count one hit against an already composed key and decide.
    pub async fn check_key(&self, key: CacheKey) -> Result<Verdict, S::Error> {
        let stored = match self.store.get(key.as_str()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, op = "get", error = %e, "Rate limit store failed");
                return Err(e);
            }
        };

        // One reading for the whole check.
        let now = self.clock.now_millis();
        let total = self.config.total();
        let expire = self.config.expire();

        let mut window = match stored {
            None => {
                debug!(key = %key, total, "Creating new rate limit window");
                RateLimitWindow::fresh(total, now, expire)
            }
            Some(raw) => {
                let mut window = match RateLimitWindow::decode(&raw) {
                    Ok(window) => window,
                    Err(e) => {
                        warn!(key = %key, op = "decode", error = %e, "Rate limit store failed");
                        return Err(e.into());
                    }
                };
                if window.roll_over(now, total, expire) {
                    debug!(key = %key, reset = window.reset, "Rate limit window rolled over");
                }
                window
            }
        };

        window.hit();

        let encoded = match window.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, op = "encode", error = %e, "Rate limit store failed");
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.set(key.as_str(), encoded).await {
            warn!(key = %key, op = "set", error = %e, "Rate limit store failed");
            return Err(e);
        }

        if let Some(expiry) = self.store.expiry() {
            expiry.pexpire(key.as_str(), window.time_to_reset(now));
        }

        if window.is_allowed() {
            debug!(key = %key, remaining = window.remaining, "Rate limit check passed");
            Ok(Verdict::Allowed { key, window })
        } else {
            let retry_after = window.retry_after_secs(now);
            info!(
                key = %key,
                remaining = window.remaining,
                retry_after,
                "Rate limit exceeded"
            );
            Ok(Verdict::Limited { key, window, retry_after })
        }
    }
}
