//! Cache key composition.
//!
//! A key is the namespace followed by every enabled dimension, in a fixed order:
//! route path, HTTP method, then each lookup value. Parts are joined with `::`.
//!
//! ```
//! use cattleguard::rate_limit::key::CacheKey;
//!
//! let key = CacheKey::builder("cattleguard").push("/login").push("POST").push("user-42").build();
//! assert_eq!(key.as_str(), "cattleguard::/login::POST::user-42");
//! ```
//!
//! The separator is not escaped. A dimension value that itself contains `::` can make two
//! different subjects share a key; paths, methods and typical lookup ids never do.

use std::fmt;

/// Separator placed between key parts.
pub const SEPARATOR: &str = "::";

/// Default namespace token every key starts with.
pub const DEFAULT_NAMESPACE: &str = "cattleguard";

/// The request fields the limiter may read.
pub trait RequestMeta {
    /// Request path, without query string.
    fn path(&self) -> &str;
    /// HTTP method name, e.g. `GET`.
    fn method(&self) -> &str;
}

impl<B> RequestMeta for http::Request<B> {
    fn path(&self) -> &str {
        self.uri().path()
    }

    fn method(&self) -> &str {
        self.method().as_str()
    }
}

impl<T: RequestMeta + ?Sized> RequestMeta for &T {
    fn path(&self) -> &str {
        (**self).path()
    }

    fn method(&self) -> &str {
        (**self).method()
    }
}

/// A composed store key identifying one rate-limited subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key in `namespace`.
    pub fn builder(namespace: &str) -> KeyBuilder {
        KeyBuilder { key: namespace.to_string() }
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Appends dimensions to a key.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    key: String,
}

impl KeyBuilder {
    /// Append one dimension.
    pub fn push(mut self, part: &str) -> Self {
        self.key.push_str(SEPARATOR);
        self.key.push_str(part);
        self
    }

    /// Append one dimension per item.
    pub fn extend<I, P>(self, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        parts.into_iter().fold(self, |b, p| b.push(p.as_ref()))
    }

    pub fn build(self) -> CacheKey {
        CacheKey(self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_alone() {
        assert_eq!(CacheKey::builder(DEFAULT_NAMESPACE).build().as_str(), "cattleguard");
    }

    #[test]
    fn dimensions_are_joined_in_order() {
        let key = CacheKey::builder("ns").push("/test").push("GET").extend(["a", "b"]).build();
        assert_eq!(key.to_string(), "ns::/test::GET::a::b");
    }

    #[test]
    fn empty_extend_adds_nothing() {
        let key = CacheKey::builder("ns").extend(Vec::<String>::new()).build();
        assert_eq!(key.as_str(), "ns");
    }

    #[test]
    fn http_request_meta_strips_query() {
        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri("https://example.com/login?next=/home")
            .body(())
            .unwrap();
        assert_eq!(RequestMeta::path(&req), "/login");
        assert_eq!(RequestMeta::method(&req), "POST");
    }

    #[test]
    fn same_dimensions_same_key() {
        let a = CacheKey::builder("ns").push("/x").build();
        let b = CacheKey::builder("ns").push("/x").build();
        let c = CacheKey::builder("ns").push("/y").build();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
