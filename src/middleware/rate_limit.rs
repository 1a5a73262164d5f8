use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{config::RateLimitConfig, error::AppError};

pub const LIMIT_EXCEEDED_MESSAGE: &str =
    "Too Many Request from this IP, please try again in an hour";

/// Past this many tracked clients, expired windows are swept on insert.
const SWEEP_THRESHOLD: usize = 10_000;
/// Minimum spacing between two sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct Buckets {
    windows: HashMap<String, Window>,
    next_sweep: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Fixed-window request counter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(Buckets {
                windows: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.windows.len() >= SWEEP_THRESHOLD && buckets.next_sweep <= now {
            buckets.windows.retain(|_, w| w.reset_at > now);
            buckets.next_sweep = now + SWEEP_INTERVAL;
        }

        let window = buckets.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.config.window,
        });
        if window.reset_at <= now {
            *window = Window {
                count: 0,
                reset_at: now + self.config.window,
            };
        }

        window.count = window.count.saturating_add(1);
        RateLimitResult {
            allowed: window.count <= self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(window.count),
            reset_after: window.reset_at.saturating_duration_since(now),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().unwrap().windows.len()
    }
}

/// The socket peer, or the first `X-Forwarded-For` hop when the proxy is
/// trusted. Requests without either share one bucket.
fn client_key(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn write_headers(headers: &mut HeaderMap, limit: u32, result: &RateLimitResult) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(result.remaining));
    // Round up so a client never retries a fraction of a second early.
    let reset = result.reset_after.as_secs() + u64::from(result.reset_after.subsec_nanos() > 0);
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req, limiter.config().trust_proxy);
    let result = limiter.check(&key);

    let mut response = if result.allowed {
        next.run(req).await
    } else {
        warn!(client = %key, path = %req.uri().path(), "rate limit exceeded");
        AppError::TooManyRequests(LIMIT_EXCEEDED_MESSAGE.into()).into_response()
    };
    write_headers(response.headers_mut(), limiter.config().max_requests, &result);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn limiter(max_requests: u32, secs: u64, trust_proxy: bool) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(secs),
            trust_proxy,
        })
    }

    #[test]
    fn counts_down_and_blocks_after_max() {
        let limiter = limiter(2, 60, false);
        let now = Instant::now();
        let first = limiter.check_at("1.2.3.4", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check_at("1.2.3.4", now).allowed);
        let third = limiter.check_at("1.2.3.4", now);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter(1, 60, false);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter(1, 10, false);
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        assert!(!limiter.check_at("a", start + Duration::from_secs(5)).allowed);
        let later = limiter.check_at("a", start + Duration::from_secs(10));
        assert!(later.allowed);
        assert_eq!(later.reset_after, Duration::from_secs(10));
    }

    #[test]
    fn expired_windows_are_swept_once_the_map_is_large() {
        let limiter = limiter(1, 10, false);
        let start = Instant::now();
        for i in 0..SWEEP_THRESHOLD {
            limiter.check_at(&i.to_string(), start);
        }
        assert_eq!(limiter.tracked(), SWEEP_THRESHOLD);

        limiter.check_at("late", start + Duration::from_secs(11));
        assert_eq!(limiter.tracked(), 1);
    }

    fn app(limiter: RateLimiter) -> Router {
        Router::new()
            .route("/api/ping", get(|| async { "pong" }))
            .layer(from_fn_with_state(Arc::new(limiter), rate_limit))
    }

    fn request(forwarded_for: &str, peer: Option<[u8; 4]>) -> axum::http::Request<Body> {
        let mut req = axum::http::Request::builder()
            .uri("/api/ping")
            .header("x-forwarded-for", format!("{}, 10.0.0.1", forwarded_for))
            .body(Body::empty())
            .unwrap();
        if let Some(ip) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        }
        req
    }

    #[tokio::test]
    async fn middleware_sets_headers_and_rejects_with_envelope() {
        let app = app(limiter(1, 3600, true));

        let ok = app.clone().oneshot(request("9.9.9.9", None)).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()["x-ratelimit-limit"], "1");
        assert_eq!(ok.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(ok.headers()["x-ratelimit-reset"], "3600");

        let blocked = app.clone().oneshot(request("9.9.9.9", None)).await.unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = to_bytes(blocked.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["message"], LIMIT_EXCEEDED_MESSAGE);

        let other = app.oneshot(request("8.8.8.8", None)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_for_is_ignored_unless_proxy_is_trusted() {
        let app = app(limiter(1, 3600, false));
        let peer = Some([203, 0, 113, 7]);

        let mut statuses = Vec::new();
        for i in 1..=5 {
            let req = request(&format!("198.51.100.{}", i), peer);
            statuses.push(app.clone().oneshot(req).await.unwrap().status());
        }
        assert_eq!(statuses[0], StatusCode::OK);
        assert!(statuses[1..]
            .iter()
            .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));

        let other_peer = app
            .oneshot(request("198.51.100.1", Some([203, 0, 113, 8])))
            .await
            .unwrap();
        assert_eq!(other_peer.status(), StatusCode::OK);
    }
}
