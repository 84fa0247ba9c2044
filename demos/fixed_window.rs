//! Fixed-window limiting in front of a tiny tower service.
//!
//! Allows three requests per user per second, then answers 429 until the window resets.

use cattleguard::prelude::*;
use std::convert::Infallible;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

type Req = http::Request<()>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    println!("=== Cattleguard: Fixed Window ===\n");

    let config = RateLimitConfig::<Req>::builder()
        .total(3)
        .expire(Duration::from_secs(1))
        .per_route(true)
        .lookup_one(|req: &Req| {
            req.headers()
                .get("x-user")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("anonymous")
                .to_string()
        })
        .build()?;

    let store = MemoryStore::new();
    let limiter = FixedWindowLimiter::new(config, store.clone());
    let svc = RateLimitLayer::new(limiter, TooManyRequests).layer(service_fn(|req: Req| async move {
        Ok::<_, Infallible>(http::Response::new(format!("hello from {}", req.uri().path())))
    }));

    println!("1. Five requests from alice within one window");
    for i in 1..=5 {
        let req = http::Request::get("/items").header("x-user", "alice").body(())?;
        let res = svc.clone().oneshot(req).await?;
        let retry_after = res
            .headers()
            .get(http::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        println!("   #{} -> {} (Retry-After: {})", i, res.status(), retry_after);
    }

    println!("\n2. Bob gets a separate window");
    let req = http::Request::get("/items").header("x-user", "bob").body(())?;
    println!("   -> {}", svc.clone().oneshot(req).await?.status());

    println!("\n3. Waiting for alice's window to reset");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let req = http::Request::get("/items").header("x-user", "alice").body(())?;
    println!("   -> {}", svc.clone().oneshot(req).await?.status());

    println!("\nStored windows: {}", store.len());
    Ok(())
}
