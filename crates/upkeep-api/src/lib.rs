//! # upkeep-api: HTTP Service for the Maintenance Request Lifecycle
//!
//! Thin Axum layer over [`upkeep_dispatch::DispatchEngine`]. Handlers parse
//! and validate input, call one engine operation, and map the result or
//! error to HTTP. No lifecycle rule lives here.
//!
//! ## API Surface
//!
//! | Prefix                   | Module                    |
//! |--------------------------|---------------------------|
//! | `/v1/requests/*`         | [`routes::requests`]      |
//! | `/v1/transitions`        | [`routes::transitions`]   |
//! | `/openapi.json`          | [`openapi`]               |
//! | `/health/*`              | probes (this module)      |
//!
//! ## Middleware Stack
//!
//! ```text
//! TraceLayer → Handler
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) carry no actor headers and are mounted
/// outside the traced API router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::requests::router())
        .merge(routes::transitions::router())
        .merge(openapi::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the router is serving.
async fn readiness() -> &'static str {
    "ready"
}
