//! gradient-api — REST API for Gradient.
//!
//! Provides axum route handlers for registering releases, inspecting
//! their rollout state, and tearing them down.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v1/releases` | List release summaries |
//! | POST | `/v1/releases` | Register a release |
//! | GET | `/v1/releases/{name}` | Get the full release record |
//! | DELETE | `/v1/releases/{name}` | Tear a release down and remove it |
//! | POST | `/v1/deployments` | Admit a platform deployment event |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/health` | Liveness probe |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use gradient_admission::AdmissionCheck;
use gradient_provider::Provider;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub provider: Arc<Provider>,
    pub admission: Arc<AdmissionCheck>,
}

/// Build the complete API router (REST + admission + metrics + health).
pub fn build_router(provider: Arc<Provider>) -> Router {
    let state = ApiState {
        admission: Arc::new(AdmissionCheck::new(provider.clone())),
        provider,
    };

    Router::new()
        .route(
            "/v1/releases",
            get(handlers::list_releases).post(handlers::create_release),
        )
        .route(
            "/v1/releases/{name}",
            get(handlers::get_release).delete(handlers::delete_release),
        )
        .route("/v1/deployments", post(handlers::deployment_event))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/health", get(handlers::health))
        .with_state(state)
}
