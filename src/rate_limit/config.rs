//! Validated limiter configuration.

use super::key::DEFAULT_NAMESPACE;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Application-defined key dimensions derived from a request (e.g. user id, API key).
pub type Lookup<Req> = Arc<dyn Fn(&Req) -> Vec<String> + Send + Sync>;

/// Configuration for a fixed-window limiter.
pub struct RateLimitConfig<Req> {
    total: u64,
    expire: Duration,
    per_route: bool,
    per_method: bool,
    lookup: Option<Lookup<Req>>,
    namespace: String,
}

impl<Req> Clone for RateLimitConfig<Req> {
    fn clone(&self) -> Self {
        Self {
            total: self.total,
            expire: self.expire,
            per_route: self.per_route,
            per_method: self.per_method,
            lookup: self.lookup.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<Req> std::fmt::Debug for RateLimitConfig<Req> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("total", &self.total)
            .field("expire", &self.expire)
            .field("per_route", &self.per_route)
            .field("per_method", &self.per_method)
            .field("lookup", &self.lookup.as_ref().map(|_| "<lookup>"))
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<Req> RateLimitConfig<Req> {
    /// Construct a new builder with defaults.
    pub fn builder() -> RateLimitConfigBuilder<Req> {
        RateLimitConfigBuilder::new()
    }

    /// Builder pre-filled from deserialized settings.
    pub fn from_settings(settings: &RateLimitSettings) -> RateLimitConfigBuilder<Req> {
        RateLimitConfigBuilder::new()
            .total(settings.total)
            .expire(Duration::from_millis(settings.expire_ms))
            .per_route(settings.per_route)
            .per_method(settings.per_method)
            .namespace(settings.namespace.clone())
    }

    /// Hits allowed per window.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Window length.
    pub fn expire(&self) -> Duration {
        self.expire
    }

    pub fn per_route(&self) -> bool {
        self.per_route
    }

    pub fn per_method(&self) -> bool {
        self.per_method
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn lookup(&self) -> Option<&Lookup<Req>> {
        self.lookup.as_ref()
    }
}

/// Builder for [`RateLimitConfig`].
pub struct RateLimitConfigBuilder<Req> {
    total: u64,
    expire: Duration,
    per_route: bool,
    per_method: bool,
    lookup: Option<Lookup<Req>>,
    namespace: String,
}

impl<Req> RateLimitConfigBuilder<Req> {
    /// Create a builder. `total` and `expire` start at zero and must be set.
    pub fn new() -> Self {
        Self {
            total: 0,
            expire: Duration::ZERO,
            per_route: false,
            per_method: false,
            lookup: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Hits allowed per window. Must be > 0.
    pub fn total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    /// Window length. Must be at least one millisecond.
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Limit each route path separately.
    pub fn per_route(mut self, enabled: bool) -> Self {
        self.per_route = enabled;
        self
    }

    /// Limit each HTTP method separately.
    pub fn per_method(mut self, enabled: bool) -> Self {
        self.per_method = enabled;
        self
    }

    /// Add key dimensions computed from the request, one per returned value.
    pub fn lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&Req) -> Vec<String> + Send + Sync + 'static,
    {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Add a single key dimension computed from the request.
    pub fn lookup_one<F>(self, lookup: F) -> Self
    where
        F: Fn(&Req) -> String + Send + Sync + 'static,
    {
        self.lookup(move |req| vec![lookup(req)])
    }

    /// Token every key starts with. Defaults to `cattleguard`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Build the configuration, validating inputs.
    pub fn build(self) -> Result<RateLimitConfig<Req>, ConfigError> {
        if self.total == 0 {
            return Err(ConfigError::InvalidTotal(self.total));
        }
        if self.expire.as_millis() == 0 {
            return Err(ConfigError::InvalidExpire(self.expire));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(RateLimitConfig {
            total: self.total,
            expire: self.expire,
            per_route: self.per_route,
            per_method: self.per_method,
            lookup: self.lookup,
            namespace: self.namespace,
        })
    }
}

impl<Req> Default for RateLimitConfigBuilder<Req> {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain limit settings, for loading from a config file.
///
/// ```
/// use cattleguard::rate_limit::{RateLimitConfig, RateLimitSettings};
///
/// let settings: RateLimitSettings =
///     serde_json::from_str(r#"{ "total": 100, "expire_ms": 60000, "per_route": true }"#).unwrap();
/// let config = RateLimitConfig::<http::Request<()>>::from_settings(&settings).build().unwrap();
/// assert_eq!(config.total(), 100);
/// assert_eq!(config.namespace(), "cattleguard");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Hits allowed per window
    pub total: u64,
    /// Window length in milliseconds
    pub expire_ms: u64,
    #[serde(default)]
    pub per_route: bool,
    #[serde(default)]
    pub per_method: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
