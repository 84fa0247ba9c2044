use futures::future::{self, BoxFuture, Ready};
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

use crate::clock::{Clock, SystemClock};
use crate::rate_limit::{CacheKey, FixedWindowLimiter, RateLimitWindow, Verdict, WindowStore};
use crate::RateLimitError;

/// Details of a rejection, handed to the [`OnRateLimited`] handler.
#[derive(Debug, Clone)]
pub struct Rejection {
    key: CacheKey,
    window: RateLimitWindow,
    retry_after: u64,
    headers: HeaderMap,
}

impl Rejection {
    fn new(key: CacheKey, window: RateLimitWindow, retry_after: u64) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        Self { key, window, retry_after, headers }
    }

    /// Key of the limited subject.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Window as persisted after the rejected hit.
    pub fn window(&self) -> &RateLimitWindow {
        &self.window
    }

    /// Seconds until the window resets, rounded up.
    pub fn retry_after(&self) -> u64 {
        self.retry_after
    }

    pub fn retry_after_duration(&self) -> Duration {
        Duration::from_secs(self.retry_after)
    }

    /// Headers already decided for the response (`Retry-After`).
    ///
    /// The service also stamps these on whatever response the handler returns, unless the
    /// handler set them itself.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Continuation handed to the [`OnRateLimited`] handler.
///
/// Calling [`run`](Next::run) passes the request on to the wrapped service anyway.
/// Dropping it ends the request with whatever response the handler builds.
#[derive(Debug)]
pub struct Next<S> {
    inner: S,
}

impl<S> Next<S> {
    /// Forward `req` to the wrapped service.
    pub async fn run<ReqBody>(mut self, req: Request<ReqBody>) -> Result<S::Response, S::Error>
    where
        S: Service<Request<ReqBody>>,
    {
        future::poll_fn(|cx| self.inner.poll_ready(cx)).await?;
        self.inner.call(req).await
    }
}

/// Produces the response for a limited request.
///
/// Implemented for closures `Fn(Request<B>, Rejection, Next<S>) -> impl Future` and for
/// [`TooManyRequests`]. Errors returned here are the wrapped service's errors and surface
/// as [`RateLimitError::Inner`].
pub trait OnRateLimited<ReqBody, S>: Send + Sync + 'static
where
    S: Service<Request<ReqBody>>,
{
    type Future: Future<Output = Result<S::Response, S::Error>> + Send + 'static;

    fn on_rate_limited(&self, req: Request<ReqBody>, rejection: Rejection, next: Next<S>) -> Self::Future;
}

impl<F, Fut, ReqBody, S> OnRateLimited<ReqBody, S> for F
where
    F: Fn(Request<ReqBody>, Rejection, Next<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S::Response, S::Error>> + Send + 'static,
    S: Service<Request<ReqBody>>,
{
    type Future = Fut;

    fn on_rate_limited(&self, req: Request<ReqBody>, rejection: Rejection, next: Next<S>) -> Fut {
        self(req, rejection, next)
    }
}

/// Handler answering `429 Too Many Requests` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TooManyRequests;

impl<ReqBody, ResBody, S> OnRateLimited<ReqBody, S> for TooManyRequests
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Future = Ready<Result<Response<ResBody>, S::Error>>;

    fn on_rate_limited(&self, _req: Request<ReqBody>, rejection: Rejection, _next: Next<S>) -> Self::Future {
        let mut res = Response::new(ResBody::default());
        *res.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        res.headers_mut().extend(rejection.headers.clone());
        future::ready(Ok(res))
    }
}

/// A layer that enforces a fixed-window limit using a [`FixedWindowLimiter`].
pub struct RateLimitLayer<Req, St, H, C = SystemClock> {
    limiter: Arc<FixedWindowLimiter<Req, St, C>>,
    on_rate_limited: Arc<H>,
}

impl<Req, St, H, C> Clone for RateLimitLayer<Req, St, H, C> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), on_rate_limited: self.on_rate_limited.clone() }
    }
}

impl<Req, St, H, C> RateLimitLayer<Req, St, H, C> {
    /// Create a new rate limit layer. `on_rate_limited` builds the response for rejected
    /// requests.
    pub fn new(limiter: FixedWindowLimiter<Req, St, C>, on_rate_limited: H) -> Self {
        Self::from_shared(Arc::new(limiter), on_rate_limited)
    }

    /// Create a layer over a limiter that is also used elsewhere.
    pub fn from_shared(limiter: Arc<FixedWindowLimiter<Req, St, C>>, on_rate_limited: H) -> Self {
        Self { limiter, on_rate_limited: Arc::new(on_rate_limited) }
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter<Req, St, C>> {
        &self.limiter
    }
}

impl<S, Req, St, H, C> Layer<S> for RateLimitLayer<Req, St, H, C> {
    type Service = RateLimitService<S, Req, St, H, C>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            on_rate_limited: self.on_rate_limited.clone(),
        }
    }
}

/// Middleware service that enforces the limit.
pub struct RateLimitService<S, Req, St, H, C = SystemClock> {
    inner: S,
    limiter: Arc<FixedWindowLimiter<Req, St, C>>,
    on_rate_limited: Arc<H>,
}

impl<S: Clone, Req, St, H, C> Clone for RateLimitService<S, Req, St, H, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            on_rate_limited: self.on_rate_limited.clone(),
        }
    }
}

impl<S, Req, St, H, C> RateLimitService<S, Req, St, H, C> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, St, H, C, ReqBody, ResBody> Service<Request<ReqBody>>
    for RateLimitService<S, Request<ReqBody>, St, H, C>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    St: WindowStore + 'static,
    H: OnRateLimited<ReqBody, S>,
    C: Clock + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = RateLimitError<St::Error, S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RateLimitError::Inner)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let limiter = self.limiter.clone();
        let on_rate_limited = self.on_rate_limited.clone();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // Composed up front so the request is not borrowed across the store calls.
        let key = limiter.key_for(&req);

        Box::pin(async move {
            match limiter.check_key(key).await.map_err(RateLimitError::Store)? {
                Verdict::Allowed { .. } => inner.call(req).await.map_err(RateLimitError::Inner),
                Verdict::Limited { key, window, retry_after } => {
                    let rejection = Rejection::new(key, window, retry_after);
                    let retry_after = HeaderValue::from(rejection.retry_after);
                    let mut res = on_rate_limited
                        .on_rate_limited(req, rejection, Next { inner })
                        .await
                        .map_err(RateLimitError::Inner)?;
                    res.headers_mut().entry(RETRY_AFTER).or_insert(retry_after);
                    Ok(res)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::store::MemoryStore;
    use crate::rate_limit::RateLimitConfig;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceExt};

    type Req = Request<()>;

    fn limiter(total: u64) -> FixedWindowLimiter<Req, MemoryStore<ManualClock>, ManualClock> {
        let clock = ManualClock::new(0);
        let config = RateLimitConfig::builder()
            .total(total)
            .expire(Duration::from_millis(1000))
            .build()
            .unwrap();
        FixedWindowLimiter::new(config, MemoryStore::with_clock(clock.clone())).with_clock(clock)
    }

    type Inner = BoxCloneService<Req, Response<String>, Infallible>;

    fn ok_service(hits: Arc<AtomicUsize>) -> Inner {
        BoxCloneService::new(service_fn(move |_req: Req| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Response::new("ok".to_string()))
            }
        }))
    }

    #[tokio::test]
    async fn allowed_requests_reach_inner_service() {
        let hits = Arc::new(AtomicUsize::new(0));
        let svc = RateLimitLayer::new(limiter(2), TooManyRequests).layer(ok_service(hits.clone()));

        let res = svc.clone().oneshot(Request::new(())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(RETRY_AFTER).is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn too_many_requests_sets_status_and_retry_after() {
        let hits = Arc::new(AtomicUsize::new(0));
        let svc = RateLimitLayer::new(limiter(1), TooManyRequests).layer(ok_service(hits.clone()));

        svc.clone().oneshot(Request::new(())).await.unwrap();
        let res = svc.clone().oneshot(Request::new(())).await.unwrap();

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[RETRY_AFTER], "1");
        assert_eq!(res.body(), "");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_may_forward_to_inner_service() {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = |req: Req, _rejection: Rejection, next: Next<Inner>| next.run(req);
        let svc = RateLimitLayer::new(limiter(1), handler).layer(ok_service(hits.clone()));

        svc.clone().oneshot(Request::new(())).await.unwrap();
        let res = svc.clone().oneshot(Request::new(())).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[RETRY_AFTER], "1");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_retry_after_is_kept() {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = |_req: Req, _rejection: Rejection, _next: Next<Inner>| async {
            let mut res = Response::new("slow down".to_string());
            res.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static("60"));
            Ok::<_, Infallible>(res)
        };
        let svc = RateLimitLayer::new(limiter(1), handler).layer(ok_service(hits));

        svc.clone().oneshot(Request::new(())).await.unwrap();
        let res = svc.clone().oneshot(Request::new(())).await.unwrap();

        assert_eq!(res.headers()[RETRY_AFTER], "60");
        assert_eq!(res.body(), "slow down");
    }

    #[test]
    fn rejection_prepares_retry_after_header() {
        let rejection = Rejection::new(
            CacheKey::builder("cattleguard").build(),
            RateLimitWindow { total: 1, remaining: -1, reset: 3000 },
            3,
        );
        assert_eq!(rejection.headers()[RETRY_AFTER], "3");
        assert_eq!(rejection.retry_after_duration(), Duration::from_secs(3));
        assert_eq!(rejection.window().remaining, -1);
        assert_eq!(rejection.key().as_str(), "cattleguard");
    }
}
