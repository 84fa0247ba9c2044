#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Cattleguard
//!
//! Fixed-window request rate limiting for `tower`/`http` services, with window state kept in
//! a pluggable key-value store so several server processes can share one limit.
//!
//! ## Features
//!
//! - **Fixed-window counting** per subject: global, per route, per method, per custom lookup
//!   (user id, API key, client IP), or any combination
//! - **Pluggable stores** through the [`WindowStore`](rate_limit::WindowStore) trait, with an
//!   optional native key-expiry capability
//! - **Tower middleware** that stamps `Retry-After` and delegates the rejection response to
//!   your handler
//! - **Framework-neutral checks** via [`FixedWindowLimiter::check`](rate_limit::FixedWindowLimiter::check)
//!
//! ## Quick Start
//!
//! ```rust
//! use cattleguard::prelude::*;
//! use std::convert::Infallible;
//! use std::time::Duration;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = RateLimitConfig::<http::Request<()>>::builder()
//!     .total(100)
//!     .expire(Duration::from_secs(60))
//!     .per_route(true)
//!     .build()
//!     .unwrap();
//! let limiter = FixedWindowLimiter::new(config, MemoryStore::new());
//!
//! let svc = RateLimitLayer::new(limiter, TooManyRequests).layer(service_fn(
//!     |_req: http::Request<()>| async { Ok::<_, Infallible>(http::Response::new(String::new())) },
//! ));
//!
//! let res = svc.oneshot(http::Request::get("/").body(()).unwrap()).await.unwrap();
//! assert_eq!(res.status(), http::StatusCode::OK);
//! # });
//! ```

pub mod clock;
pub mod error;
pub mod prelude;
pub mod rate_limit;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, RateLimitError, WindowCodecError};
pub use rate_limit::{
    FixedWindowLimiter, RateLimitConfig, RateLimitLayer, RateLimitService, RateLimitWindow,
    Verdict,
};
