//! Fixed-window rate limiting.
//!
//! This module provides the building blocks for rate limiting:
//! - [`FixedWindowLimiter`]: the per-request check, framework neutral.
//! - [`RateLimitLayer`]: Tower middleware for `http` services that enforces the limit.
//! - [`Verdict`]: the result of a check (Allowed/Limited).
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. On rejection it hands the request
//!   to your [`OnRateLimited`] handler; it never picks a status code itself.
//! - **Logic**: `FixedWindowLimiter` composes the [`CacheKey`], reads the window, rolls it
//!   over when it has ended, decrements, writes it back and decides.
//! - **Storage**: [`WindowStore`] (in `store` module) holds serialized windows, enabling
//!   in-memory or shared backends (e.g., Redis) so several processes share one limit.
//!
//! # Example
//!
//! ```rust
//! use cattleguard::rate_limit::{FixedWindowLimiter, RateLimitConfig, Verdict};
//! use cattleguard::rate_limit::store::MemoryStore;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = RateLimitConfig::<http::Request<()>>::builder()
//!     .total(1)
//!     .expire(Duration::from_secs(60))
//!     .per_route(true)
//!     .build()
//!     .unwrap();
//! let limiter = FixedWindowLimiter::new(config, MemoryStore::new());
//!
//! let req = http::Request::get("/login").body(()).unwrap();
//! assert!(limiter.check(&req).await.unwrap().is_allowed());
//! match limiter.check(&req).await.unwrap() {
//!     Verdict::Limited { retry_after, .. } => assert!(retry_after <= 60),
//!     other => panic!("expected limited, got {:?}", other),
//! }
//! # });
//! ```

pub mod config;
pub mod key;
pub mod limiter;
pub mod middleware;
pub mod store;
pub mod window;

pub use config::{Lookup, RateLimitConfig, RateLimitConfigBuilder, RateLimitSettings};
pub use key::{CacheKey, RequestMeta};
pub use limiter::FixedWindowLimiter;
pub use middleware::{Next, OnRateLimited, RateLimitLayer, RateLimitService, Rejection, TooManyRequests};
pub use store::{ExpireKeys, MemoryStore, WindowStore};
pub use window::RateLimitWindow;

use std::time::Duration;

/// The decision returned by a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request is allowed to proceed.
    Allowed {
        /// Key the window is stored under.
        key: CacheKey,
        /// Window as persisted after this hit.
        window: RateLimitWindow,
    },
    /// The subject has used up its window.
    Limited {
        /// Key the window is stored under.
        key: CacheKey,
        /// Window as persisted after this hit; `remaining` is negative.
        window: RateLimitWindow,
        /// Whole seconds until the window resets, rounded up.
        /// Sent as the `Retry-After` header.
        retry_after: u64,
    },
}

impl Verdict {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed { .. })
    }

    pub fn key(&self) -> &CacheKey {
        match self {
            Verdict::Allowed { key, .. } | Verdict::Limited { key, .. } => key,
        }
    }

    pub fn window(&self) -> &RateLimitWindow {
        match self {
            Verdict::Allowed { window, .. } | Verdict::Limited { window, .. } => window,
        }
    }

    /// `Retry-After` as a duration, for limited verdicts.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Verdict::Limited { retry_after, .. } => Some(Duration::from_secs(*retry_after)),
            Verdict::Allowed { .. } => None,
        }
    }
}
