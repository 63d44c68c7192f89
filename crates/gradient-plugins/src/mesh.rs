//! Built-in releaser for service-mesh traffic management.
//!
//! `MeshReleaser` shapes traffic through four mesh resources per
//! service: defaults, a resolver that carves the service into primary
//! and candidate subsets, a router, and a splitter holding the actual
//! weights. Resources are created in that order and torn down in
//! reverse.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConfigError, PluginError};
use crate::releaser::{Releaser, ServiceVariant};

/// Functional interface to the mesh control plane. The in-memory
/// backend implements this for tests and single-process mode; adapters
/// for a real mesh implement it against the vendor API.
#[async_trait]
pub trait MeshClient: Send + Sync {
    async fn upsert_defaults(&self, service: &str, namespace: &str) -> Result<(), PluginError>;
    async fn upsert_resolver(&self, service: &str, namespace: &str) -> Result<(), PluginError>;
    async fn upsert_router(&self, service: &str, namespace: &str) -> Result<(), PluginError>;

    /// Create or update the splitter with the given primary/candidate
    /// weights. Weights always sum to 100.
    async fn upsert_splitter(
        &self,
        service: &str,
        namespace: &str,
        primary: i32,
        candidate: i32,
    ) -> Result<(), PluginError>;

    async fn delete_splitter(&self, service: &str, namespace: &str) -> Result<(), PluginError>;
    async fn delete_router(&self, service: &str, namespace: &str) -> Result<(), PluginError>;
    async fn delete_resolver(&self, service: &str, namespace: &str) -> Result<(), PluginError>;
    async fn delete_defaults(&self, service: &str, namespace: &str) -> Result<(), PluginError>;

    /// Whether all health checks for the given variant of the service
    /// currently pass.
    async fn service_health(
        &self,
        service: &str,
        namespace: &str,
        variant: ServiceVariant,
    ) -> Result<bool, PluginError>;
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
struct MeshConfig {
    #[serde(default)]
    service: String,
    #[serde(default = "default_namespace")]
    namespace: String,
}

/// The built-in `mesh` releaser plugin.
pub struct MeshReleaser {
    client: Arc<dyn MeshClient>,
    config: MeshConfig,
    health_timeout: Duration,
    health_interval: Duration,
}

impl MeshReleaser {
    pub fn new(client: Arc<dyn MeshClient>) -> Self {
        Self {
            client,
            config: MeshConfig::default(),
            health_timeout: Duration::from_secs(60),
            health_interval: Duration::from_secs(1),
        }
    }

    /// Override the health polling deadline and cadence.
    pub fn with_health_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.health_timeout = timeout;
        self.health_interval = interval;
        self
    }
}

#[async_trait]
impl Releaser for MeshReleaser {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError> {
        let parsed: MeshConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Decode(e.to_string()))?;

        let mut problems = Vec::new();
        if parsed.service.is_empty() {
            problems.push("service: required field is empty".to_string());
        }
        if parsed.namespace.is_empty() {
            problems.push("namespace: must not be empty".to_string());
        }
        if !problems.is_empty() {
            return Err(ConfigError::Validation(problems));
        }

        self.config = parsed;
        Ok(())
    }

    async fn setup(&self) -> Result<(), PluginError> {
        let (service, namespace) = (&self.config.service, &self.config.namespace);
        info!(service, namespace, "creating mesh resources for traffic split");

        self.client.upsert_defaults(service, namespace).await?;
        self.client.upsert_resolver(service, namespace).await?;
        self.client.upsert_router(service, namespace).await?;
        // No primary exists at setup time, so all traffic goes to the
        // candidate until the runtime clones one.
        self.client.upsert_splitter(service, namespace, 0, 100).await?;

        Ok(())
    }

    async fn scale(&self, traffic: i32) -> Result<(), PluginError> {
        let (service, namespace) = (&self.config.service, &self.config.namespace);
        let primary = 100 - traffic;
        debug!(service, primary, candidate = traffic, "updating traffic split");

        self.client
            .upsert_splitter(service, namespace, primary, traffic)
            .await
    }

    async fn destroy(&self) -> Result<(), PluginError> {
        let (service, namespace) = (&self.config.service, &self.config.namespace);
        info!(service, namespace, "removing mesh resources");

        // Reverse creation order: the splitter references the router and
        // resolver, which reference the defaults.
        self.client.delete_splitter(service, namespace).await?;
        self.client.delete_router(service, namespace).await?;
        self.client.delete_resolver(service, namespace).await?;
        self.client.delete_defaults(service, namespace).await?;

        Ok(())
    }

    async fn wait_until_healthy(&self, variant: ServiceVariant) -> Result<(), PluginError> {
        let (service, namespace) = (&self.config.service, &self.config.namespace);
        let deadline = tokio::time::Instant::now() + self.health_timeout;

        loop {
            if self.client.service_health(service, namespace, variant).await? {
                debug!(service, %variant, "service reports healthy");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PluginError::Timeout(format!(
                    "service {service} ({variant}) did not become healthy within {:?}",
                    self.health_timeout
                )));
            }
            tokio::time::sleep(self.health_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMesh;
    use serde_json::json;

    fn configured(client: Arc<MemoryMesh>) -> MeshReleaser {
        let mut releaser = MeshReleaser::new(client)
            .with_health_timing(Duration::from_millis(50), Duration::from_millis(5));
        releaser
            .configure(&json!({ "service": "api", "namespace": "prod" }))
            .unwrap();
        releaser
    }

    #[test]
    fn configure_rejects_missing_service() {
        let mut releaser = MeshReleaser::new(Arc::new(MemoryMesh::default()));
        let err = releaser.configure(&json!({})).unwrap_err();
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn configure_defaults_namespace() {
        let mut releaser = MeshReleaser::new(Arc::new(MemoryMesh::default()));
        releaser.configure(&json!({ "service": "api" })).unwrap();
        assert_eq!(releaser.config.namespace, "default");
    }

    #[tokio::test]
    async fn setup_creates_resources_and_routes_all_traffic_to_candidate() {
        let client = Arc::new(MemoryMesh::default());
        let releaser = configured(client.clone());

        releaser.setup().await.unwrap();

        assert!(client.has_defaults("api", "prod").await);
        assert!(client.has_resolver("api", "prod").await);
        assert!(client.has_router("api", "prod").await);
        assert_eq!(client.splitter("api", "prod").await, Some((0, 100)));
    }

    #[tokio::test]
    async fn scale_sets_complementary_weights() {
        let client = Arc::new(MemoryMesh::default());
        let releaser = configured(client.clone());

        releaser.setup().await.unwrap();
        releaser.scale(30).await.unwrap();

        assert_eq!(client.splitter("api", "prod").await, Some((70, 30)));
    }

    #[tokio::test]
    async fn destroy_removes_resources_in_reverse_order() {
        let client = Arc::new(MemoryMesh::default());
        let releaser = configured(client.clone());

        releaser.setup().await.unwrap();
        releaser.destroy().await.unwrap();

        assert!(!client.has_defaults("api", "prod").await);
        assert_eq!(client.splitter("api", "prod").await, None);
        assert_eq!(
            client.ops_matching("delete").await,
            vec![
                "delete_splitter api.prod",
                "delete_router api.prod",
                "delete_resolver api.prod",
                "delete_defaults api.prod",
            ]
        );
    }

    #[tokio::test]
    async fn wait_until_healthy_returns_once_checks_pass() {
        let client = Arc::new(MemoryMesh::default());
        client.set_healthy(true).await;
        let releaser = configured(client);

        releaser.wait_until_healthy(ServiceVariant::Candidate).await.unwrap();
    }

    #[tokio::test]
    async fn wait_until_healthy_times_out() {
        let client = Arc::new(MemoryMesh::default());
        client.set_healthy(false).await;
        let releaser = configured(client);

        let err = releaser
            .wait_until_healthy(ServiceVariant::Primary)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Timeout(_)));
    }
}
