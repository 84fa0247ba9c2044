//! Compile-time prelude coverage test.
use cattleguard::prelude::*;
use std::time::Duration;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let config = RateLimitConfig::<http::Request<()>>::builder()
        .total(5)
        .expire(Duration::from_secs(1))
        .per_method(true)
        .build()
        .expect("valid config");
    let limiter = FixedWindowLimiter::new(config, MemoryStore::new()).with_clock(SystemClock);
    let layer = RateLimitLayer::new(limiter, TooManyRequests);

    let mut svc = layer.layer(service_fn(|_req: http::Request<()>| async {
        Ok::<_, std::io::Error>(http::Response::new(String::new()))
    }));
    let res = svc.call(http::Request::new(())).await.expect("service call failed");
    assert_eq!(res.status(), http::StatusCode::OK);
}
