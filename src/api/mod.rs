//! HTTP API, served under `/api`.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use sprintify_core::models::Notification;
use sprintify_core::quota::QuotaPolicy;
use sprintify_core::Database;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::{self, PlanGenerator};
use crate::config::Config;
use crate::push::{self, PushSender};

use self::auth::JwtKeys;
use self::rate_limit::RateLimiter;

pub use self::error::ApiError;
pub use self::response::{optional_json, ApiJson, ApiPath, ApiQuery, ApiResponse};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub keys: Arc<JwtKeys>,
    pub limiter: Arc<RateLimiter>,
    pub ai_limiter: Arc<RateLimiter>,
    pub ai: Arc<dyn PlanGenerator>,
    pub push: Arc<dyn PushSender>,
}

impl AppState {
    /// Build state from `config`, wiring Gemini and the push webhook when configured.
    pub fn new(db: Database, config: Config, secret: &str) -> Self {
        Self {
            db,
            keys: Arc::new(JwtKeys::new(secret)),
            limiter: Arc::new(RateLimiter::new(config.rate_limit, config.rate_window())),
            ai_limiter: Arc::new(RateLimiter::new(config.ai_rate_limit, config.ai_rate_window())),
            ai: ai::plan_generator(&config),
            push: push::push_sender(&config),
            config: Arc::new(config),
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn PlanGenerator>) -> Self {
        self.ai = ai;
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushSender>) -> Self {
        self.push = push;
        self
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        self.config.quota_policy()
    }

    /// Push a freshly stored notification in the background.
    pub fn notify(&self, notification: Notification) {
        let db = self.db.clone();
        let sender = self.push.clone();
        tokio::spawn(async move {
            push::deliver(&db, sender.as_ref(), &notification).await;
        });
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/auth", routes::auth::router())
        .nest("/sprints", routes::sprints::router())
        .nest("/ai", routes::ai::router(state.clone()))
        .nest("/stats", routes::stats::router())
        .nest("/notifications", routes::notifications::router())
        .nest("/users", routes::users::router())
        .nest("/upgrade-requests", routes::upgrade_requests::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config)),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}
