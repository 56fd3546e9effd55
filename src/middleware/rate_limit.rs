//! Rate limiting middleware for Axum: a sliding-window in-memory limiter,
//! wrapped as a `tower::Layer`/`Service` pair, with per-key (IP-derived) and
//! global budgets checked in that order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower::{Layer, Service};
use tracing::warn;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub ws_messages_per_minute: u32,
    pub max_ws_message_bytes: usize,
    pub global_requests_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 120,
            ws_messages_per_minute: 240,
            max_ws_message_bytes: 1_048_576,
            global_requests_per_minute: 2000,
        }
    }
}

// ============================================================================
// Sliding-window limiter
// ============================================================================

struct RateLimiter {
    max_requests: u32,
    window: Duration,
    requests: RwLock<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Check and record one request for `key`, returning the seconds until
    /// the oldest request in the window expires if the budget is exhausted.
    async fn acquire(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let window_start = now - self.window;

        let mut requests = self.requests.write().await;
        let records = requests.entry(key.to_string()).or_default();
        records.retain(|t| *t > window_start);

        if records.len() as u32 >= self.max_requests {
            let reset_after = records
                .iter()
                .min()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(Duration::ZERO);
            return Err(reset_after.as_secs());
        }

        records.push(now);
        Ok(())
    }

    async fn cleanup(&self) {
        let now = Instant::now();
        let window_start = now - self.window;
        let mut requests = self.requests.write().await;
        requests.retain(|_, records| {
            records.retain(|t| *t > window_start);
            !records.is_empty()
        });
    }
}

// ============================================================================
// Shared state / layer / service
// ============================================================================

#[derive(Clone)]
pub struct RateLimitState {
    per_key: Arc<RateLimiter>,
    global: Arc<RateLimiter>,
    enabled: bool,
}

impl RateLimitState {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            per_key: Arc::new(RateLimiter::new(settings.requests_per_minute, Duration::from_secs(60))),
            global: Arc::new(RateLimiter::new(
                settings.global_requests_per_minute,
                Duration::from_secs(60),
            )),
            enabled: settings.enabled,
        }
    }

    pub async fn check_request(&self, key: &str) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }
        self.global.acquire("global").await?;
        self.per_key.acquire(key).await
    }

    pub fn spawn_cleanup(&self) {
        let per_key = self.per_key.clone();
        let global = self.global.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                per_key.cleanup().await;
                global.cleanup().await;
            }
        });
    }
}

#[derive(Clone)]
pub struct RateLimitLayer {
    state: RateLimitState,
}

impl RateLimitLayer {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            state: RateLimitState::new(settings),
        }
    }

    pub fn state(&self) -> &RateLimitState {
        &self.state
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: RateLimitState,
}

type BoxFuture<T, E> = std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> BoxFuture<Response, S::Error> {
        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let key = extract_rate_limit_key(&req);
            match state.check_request(&key).await {
                Ok(()) => inner.call(req).await,
                Err(retry_after) => {
                    warn!(key = %key, retry_after_secs = retry_after, "rate limit exceeded");
                    Ok(rate_limited_response(retry_after))
                }
            }
        })
    }
}

#[derive(Serialize)]
struct RateLimitBody {
    success: bool,
    error: String,
    code: String,
    retry_after_secs: u64,
}

fn rate_limited_response(retry_after: u64) -> Response {
    let body = RateLimitBody {
        success: false,
        error: "rate limit exceeded, retry later".to_string(),
        code: "RATE_LIMITED".to_string(),
        retry_after_secs: retry_after,
    };
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

fn extract_rate_limit_key<B>(req: &Request<B>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }
    "ip:unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_under_limit_and_denies_over() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.acquire("a").await.is_ok());
        }
        assert!(limiter.acquire("a").await.is_err());
    }

    #[tokio::test]
    async fn separate_keys_have_independent_budgets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.acquire("a").await.is_ok());
        assert!(limiter.acquire("a").await.is_err());
        assert!(limiter.acquire("b").await.is_ok());
    }

    #[tokio::test]
    async fn disabled_state_never_denies() {
        let state = RateLimitState::new(&RateLimitSettings {
            enabled: false,
            requests_per_minute: 1,
            ..RateLimitSettings::default()
        });
        for _ in 0..10 {
            assert!(state.check_request("x").await.is_ok());
        }
    }
}
