//! REST API handlers.
//!
//! Each handler goes through the [`Provider`] and returns JSON
//! responses. Definition faults map to 400, missing releases to 404.
//!
//! [`Provider`]: gradient_provider::Provider

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info};

use gradient_admission::WorkloadEvent;
use gradient_model::Release;
use gradient_provider::ProviderError;
use gradient_store::ListOptions;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: String, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg),
        }),
    )
}

fn provider_error(e: &ProviderError) -> impl IntoResponse {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_definition() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(e.to_string(), status)
}

// ── Releases ───────────────────────────────────────────────────

/// One row in the release listing.
#[derive(serde::Serialize)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub state: gradient_model::State,
    /// Traffic share currently routed to the candidate, when a rollout
    /// has recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_traffic: Option<i64>,
}

fn summarize(state: &ApiState, release: &Release) -> ReleaseSummary {
    // Prefer the live machine state over the persisted one.
    let current = state
        .provider
        .machine(&release.name)
        .map(|m| m.current_state())
        .unwrap_or(release.current_state);

    let candidate_traffic = state
        .provider
        .store()
        .get_plugin_state(&release.name, "strategy")
        .ok()
        .flatten()
        .and_then(|data| serde_json::from_slice::<serde_json::Value>(&data).ok())
        .and_then(|v| v.get("candidate_traffic").and_then(|t| t.as_i64()))
        .filter(|t| *t >= 0);

    ReleaseSummary {
        name: release.name.clone(),
        namespace: release.namespace.clone(),
        version: release.version.clone(),
        state: current,
        candidate_traffic,
    }
}

/// GET /v1/releases
pub async fn list_releases(State(state): State<ApiState>) -> impl IntoResponse {
    match state.provider.list_releases(&ListOptions::default()) {
        Ok(releases) => {
            let summaries: Vec<ReleaseSummary> =
                releases.iter().map(|r| summarize(&state, r)).collect();
            ApiResponse::ok(summaries).into_response()
        }
        Err(e) => provider_error(&e).into_response(),
    }
}

/// POST /v1/releases
pub async fn create_release(
    State(state): State<ApiState>,
    Json(release): Json<Release>,
) -> impl IntoResponse {
    let name = release.name.clone();
    match state.provider.create_release(release).await {
        Ok(_settled) => {
            // Configuration continues in the background; report what was
            // accepted.
            match state.provider.get_release(&name) {
                Ok(stored) => {
                    (StatusCode::CREATED, ApiResponse::ok(summarize(&state, &stored)))
                        .into_response()
                }
                Err(e) => provider_error(&e).into_response(),
            }
        }
        Err(e) => provider_error(&e).into_response(),
    }
}

/// GET /v1/releases/{name}
pub async fn get_release(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.provider.get_release(&name) {
        Ok(release) => ApiResponse::ok(release).into_response(),
        Err(e) => provider_error(&e).into_response(),
    }
}

/// DELETE /v1/releases/{name}
///
/// Teardown can take a while (traffic is restored to the original
/// deployment first), so the destroy runs in a background task and the
/// handler returns as soon as it is underway.
pub async fn delete_release(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = state.provider.get_release(&name) {
        return provider_error(&e).into_response();
    }

    let provider = state.provider.clone();
    let release = name.clone();
    tokio::spawn(async move {
        match provider.delete_release(&release).await {
            Ok(()) => info!(%release, "release removed"),
            Err(e) => error!(%release, error = %e, "release teardown failed"),
        }
    });

    ApiResponse::ok(serde_json::json!({
        "release": name,
        "status": "destroying"
    }))
    .into_response()
}

// ── Deployment admission ───────────────────────────────────────

/// A platform deployment event, as posted by the platform glue.
#[derive(serde::Deserialize)]
pub struct DeploymentEventRequest {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub runtime: String,
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// POST /v1/deployments
///
/// Runs the admission check for a deployment observed on the platform.
/// A rejection maps to 409 so the caller can fail the deployment.
pub async fn deployment_event(
    State(state): State<ApiState>,
    Json(req): Json<DeploymentEventRequest>,
) -> impl IntoResponse {
    let event = WorkloadEvent {
        name: req.name,
        namespace: req.namespace,
        runtime: req.runtime,
        labels: req.labels,
    };

    match state.admission.check(&event).await {
        Ok(decision) => {
            let body = ApiResponse::ok(serde_json::json!({
                "decision": decision.as_label(),
                "allowed": decision.is_allowed(),
            }));
            let status = if decision.is_allowed() {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            (status, body).into_response()
        }
        Err(e) => error_response(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Probes ─────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = gradient_metrics::render_prometheus(&state.provider.metrics().snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use gradient_lifecycle::Timing;
    use gradient_metrics::MetricsCollector;
    use gradient_model::{PluginConfig, State as ReleaseState};
    use gradient_plugins::memory::{MemoryMesh, MemoryWorkloads, StaticMetrics};
    use gradient_provider::{Clients, Provider};
    use gradient_store::ReleaseStore;
    use serde_json::json;

    fn test_state() -> (ApiState, Arc<MemoryMesh>) {
        let mesh = Arc::new(MemoryMesh::default());
        let clients = Clients {
            mesh: mesh.clone(),
            workloads: Arc::new(MemoryWorkloads::default()),
            metrics: Arc::new(StaticMetrics::default()),
        };
        let provider = Provider::new(
            ReleaseStore::open_in_memory().unwrap(),
            clients,
            MetricsCollector::new(),
            Timing::fast(),
        );
        let state = ApiState {
            admission: Arc::new(gradient_admission::AdmissionCheck::new(provider.clone())),
            provider,
        };
        (state, mesh)
    }

    fn test_release(name: &str) -> Release {
        Release {
            name: name.to_string(),
            namespace: "default".to_string(),
            version: "1".to_string(),
            releaser: PluginConfig {
                plugin_name: "mesh".to_string(),
                config: json!({"service": name}),
            },
            runtime: PluginConfig {
                plugin_name: "orchestrator".to_string(),
                config: json!({"deployment": name}),
            },
            monitor: PluginConfig {
                plugin_name: "metrics".to_string(),
                config: json!({"address": "http://metrics:9090", "queries": []}),
            },
            strategy: PluginConfig {
                plugin_name: "canary".to_string(),
                config: json!({"interval": "1ms", "traffic_step": 10, "max_traffic": 30}),
            },
            current_state: ReleaseState::Start,
            state_history: vec![],
            created: 0,
            last_updated: 0,
        }
    }

    #[tokio::test]
    async fn list_releases_empty() {
        let (state, _) = test_state();
        let resp = list_releases(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_get_release() {
        let (state, _) = test_state();

        let resp = create_release(State(state.clone()), Json(test_release("api")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_release(State(state), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_nonexistent_release() {
        let (state, _) = test_state();
        let resp = get_release(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_with_unknown_plugin_is_a_client_error() {
        let (state, _) = test_state();
        let mut release = test_release("api");
        release.releaser.plugin_name = "istio".to_string();

        let resp = create_release(State(state.clone()), Json(release))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        // Nothing was persisted.
        assert!(state.provider.get_release("api").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_with_invalid_config_is_a_client_error() {
        let (state, _) = test_state();
        let mut release = test_release("api");
        release.releaser.config = json!({});

        let resp = create_release(State(state), Json(release))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_release_destroys_in_the_background() {
        let (state, mesh) = test_state();
        mesh.set_healthy(true).await;

        create_release(State(state.clone()), Json(test_release("api"))).await;

        let resp = delete_release(State(state.clone()), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        // The background task removes the record once teardown settles.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match state.provider.get_release("api") {
                Err(e) if e.is_not_found() => break,
                _ if tokio::time::Instant::now() > deadline => {
                    panic!("release was not removed")
                }
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(state.provider.machine("api").is_none());
    }

    #[tokio::test]
    async fn delete_nonexistent_release() {
        let (state, _) = test_state();
        let resp = delete_release(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    async fn settled_idle(state: &ApiState, name: &str) {
        let handle = state.provider.machine(name).unwrap();
        let mut changes = handle.state_changes();
        tokio::time::timeout(
            Duration::from_secs(5),
            changes.wait_for(|s| *s == ReleaseState::Idle),
        )
        .await
        .expect("release did not settle")
        .unwrap();
    }

    #[tokio::test]
    async fn deployment_event_starts_a_rollout() {
        let (state, _) = test_state();
        create_release(State(state.clone()), Json(test_release("api"))).await;
        settled_idle(&state, "api").await;

        let req = DeploymentEventRequest {
            name: "api".to_string(),
            namespace: "default".to_string(),
            runtime: "orchestrator".to_string(),
            labels: std::collections::HashMap::new(),
        };
        let resp = deployment_event(State(state), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn controller_deployment_events_pass_through() {
        let (state, _) = test_state();
        create_release(State(state.clone()), Json(test_release("api"))).await;
        settled_idle(&state, "api").await;

        let mut labels = std::collections::HashMap::new();
        labels.insert(
            gradient_plugins::VERSION_LABEL.to_string(),
            "primary".to_string(),
        );
        let req = DeploymentEventRequest {
            name: "api".to_string(),
            namespace: "default".to_string(),
            runtime: "orchestrator".to_string(),
            labels,
        };
        let resp = deployment_event(State(state.clone()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        // No rollout was started.
        assert_eq!(
            state.provider.machine("api").unwrap().current_state(),
            ReleaseState::Idle
        );
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let (state, _) = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
