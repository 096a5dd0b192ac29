//! In-memory fixed-window request limiting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;

use super::{auth::AuthUser, error::ApiError, AppState};

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one request for `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows();
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            let elapsed = now.saturating_duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - entry.count,
        }
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub fn cleanup(&self, now: Instant) -> usize {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows().len()
    }
}

/// `user:<uid>` for authenticated callers, otherwise `ip:<addr>`.
pub fn client_key(req: &Request) -> String {
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return format!("user:{}", user.uid);
    }

    let headers = req.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let addr = forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    format!("ip:{addr}")
}

async fn enforce(limiter: &RateLimiter, req: Request, next: Next) -> Result<Response, ApiError> {
    let key = client_key(&req);
    match limiter.check(&key, Instant::now()) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.limit()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        RateDecision::Limited { retry_after } => {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            tracing::debug!(%key, retry_after = secs, "rate limit hit");
            Err(ApiError::TooManyRequests {
                message: "too many requests, please slow down".into(),
                retry_after: Some(secs.max(1)),
            })
        }
    }
}

pub async fn limit_requests(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.limiter, req, next).await
}

pub async fn limit_ai_requests(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.ai_limiter, req, next).await
}

/// Periodically drop expired windows from every limiter.
pub fn spawn_cleanup(limiters: Vec<Arc<RateLimiter>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let removed: usize = limiters.iter().map(|l| l.cleanup(now)).sum();
            if removed > 0 {
                tracing::trace!(removed, "expired rate-limit windows dropped");
            }
        }
    })
}
