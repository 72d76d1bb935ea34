//! REST gateway over the version-control backend CLI.
//!
//! Request flow: validator -> endpoint handler -> command runner ->
//! response envelope. Handlers never see raw process errors; the runner
//! folds every failure mode into a [`p4_runner::CommandResult`].

use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use p4_runner::Runner;

pub mod config;
pub mod envelope;
pub mod rate_limit;
pub mod routes;
pub mod validate;

use config::RuntimeMode;
use rate_limit::ClientRateLimiter;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    runner: Arc<dyn Runner>,
    limiter: ClientRateLimiter,
    mode: RuntimeMode,
}

impl AppState {
    pub fn new(runner: Arc<dyn Runner>, mode: RuntimeMode, limiter: ClientRateLimiter) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                runner,
                limiter,
                mode,
            }),
        }
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.inner.runner
    }

    pub fn limiter(&self) -> &ClientRateLimiter {
        &self.inner.limiter
    }

    /// Whether internal error detail may be forwarded to clients.
    pub fn expose_errors(&self) -> bool {
        matches!(self.inner.mode, RuntimeMode::Development)
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/info", get(routes::server_info))
        .route("/files", get(routes::list_files))
        .route("/files/content", get(routes::file_content))
        .route("/files/history", get(routes::file_history))
        .route("/changes", get(routes::list_changes))
        .route("/changes/:id", get(routes::change_detail))
        .route("/users", get(routes::list_users))
        .route("/sync", post(routes::sync_files))
        .route("/docs", get(routes::docs))
        .layer(middleware::from_fn(rate_limit::enforce));

    // Health stays outside the rate-limited API surface so liveness
    // probes cannot exhaust a client's window.
    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api)
        .fallback(routes::unmatched)
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
