//! Rate limiter windows.

use coopstore::{ErrorKind, RateLimitRule, RateLimiter, Store};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_window_resets_after_time_frame() {
    let limiter = RateLimiter::new(Store::memory(), "rate:", CancellationToken::new());
    let rule = RateLimitRule::new("invite", 2, Duration::from_millis(100)).unwrap();

    limiter.count(&rule, "client-1").await.unwrap();
    limiter.count(&rule, "client-1").await.unwrap();
    let err = limiter.count(&rule, "client-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert_eq!(limiter.count(&rule, "client-1").await.unwrap_err().kind(), ErrorKind::RateLimitExceeded);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(limiter.count(&rule, "client-1").await.unwrap(), 1);
    assert_eq!(limiter.count(&rule, "client-1").await.unwrap(), 2);
    limiter.shutdown().await;
}

#[tokio::test]
async fn test_rules_count_independently() {
    let limiter = RateLimiter::new(Store::memory(), "rate:", CancellationToken::new());
    let strict = RateLimitRule::new("strict", 1, Duration::from_secs(60)).unwrap();
    let loose = RateLimitRule::new("loose", 10, Duration::from_secs(60)).unwrap();

    limiter.count(&strict, "c").await.unwrap();
    assert!(limiter.count(&strict, "c").await.is_err());
    assert_eq!(limiter.count(&loose, "c").await.unwrap(), 1);
    limiter.shutdown().await;
}
