//! Convenient re-exports for common Cattleguard types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    error::{ConfigError, RateLimitError},
    rate_limit::{
        CacheKey, ExpireKeys, FixedWindowLimiter, MemoryStore, Next, OnRateLimited,
        RateLimitConfig, RateLimitLayer, RateLimitSettings, RateLimitWindow, Rejection,
        RequestMeta, TooManyRequests, Verdict, WindowStore,
    },
};
