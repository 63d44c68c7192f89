//! Built-in monitor backed by a time-series metrics backend.
//!
//! Queries are either presets (named, runtime-specific templates) or
//! custom template strings. Templates interpolate the workload
//! identity and check interval before execution.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::monitor::{CheckError, Monitor};

/// Functional interface to the metrics backend. Returns the sampled
/// values for a query, most recent first.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn query(&self, address: &str, query: &str) -> Result<Vec<f64>, String>;
}

#[derive(Debug, Clone, Deserialize)]
struct QueryConfig {
    name: String,
    #[serde(default)]
    preset: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct MonitorConfig {
    #[serde(default)]
    address: String,
    #[serde(default)]
    queries: Vec<QueryConfig>,
}

/// Preset query templates, keyed by `(runtime plugin, preset name)`.
fn preset_query(runtime: &str, preset: &str) -> Option<&'static str> {
    match (runtime, preset) {
        ("orchestrator", "request-success") => Some(
            "sum(rate(upstream_rq_completed{namespace=\"{{namespace}}\",deployment=~\"{{workload}}\",response_code!~\"5.*\"}[{{interval}}])) \
             / sum(rate(upstream_rq_completed{namespace=\"{{namespace}}\",deployment=~\"{{workload}}\"}[{{interval}}])) * 100",
        ),
        ("orchestrator", "request-duration") => Some(
            "histogram_quantile(0.99, sum(rate(upstream_rq_time_bucket{namespace=\"{{namespace}}\",deployment=~\"{{workload}}\"}[{{interval}}])) by (le))",
        ),
        _ => None,
    }
}

fn render(template: &str, workload: &str, namespace: &str, interval: Duration) -> String {
    template
        .replace("{{workload}}", workload)
        .replace("{{namespace}}", namespace)
        .replace("{{interval}}", &format!("{}s", interval.as_secs().max(1)))
}

/// The built-in `metrics` monitor plugin.
pub struct MetricsMonitor {
    client: std::sync::Arc<dyn MetricsClient>,
    workload: String,
    namespace: String,
    runtime_name: String,
    config: MonitorConfig,
}

impl MetricsMonitor {
    pub fn new(client: std::sync::Arc<dyn MetricsClient>) -> Self {
        Self {
            client,
            workload: String::new(),
            namespace: String::new(),
            runtime_name: String::new(),
            config: MonitorConfig::default(),
        }
    }

    /// Resolve every configured query to an executable string, failing
    /// before any backend call when the config is unusable.
    fn resolve(&self, interval: Duration) -> Result<Vec<(String, String, &QueryConfig)>, CheckError> {
        let mut resolved = Vec::with_capacity(self.config.queries.len());
        for q in &self.config.queries {
            let template = if !q.query.is_empty() {
                q.query.as_str()
            } else if !q.preset.is_empty() {
                preset_query(&self.runtime_name, &q.preset)
                    .ok_or_else(|| CheckError::UnknownPreset(q.preset.clone()))?
            } else {
                return Err(CheckError::EmptyQuery(q.name.clone()));
            };
            let query = render(template, &self.workload, &self.namespace, interval);
            resolved.push((q.name.clone(), query, q));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Monitor for MetricsMonitor {
    fn configure(
        &mut self,
        workload: &str,
        namespace: &str,
        runtime_name: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        let parsed: MonitorConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Decode(e.to_string()))?;

        if parsed.address.is_empty() {
            return Err(ConfigError::Validation(vec![
                "address: required field is empty".to_string(),
            ]));
        }

        self.workload = workload.to_string();
        self.namespace = namespace.to_string();
        self.runtime_name = runtime_name.to_string();
        self.config = parsed;
        Ok(())
    }

    async fn check(&self, interval: Duration) -> Result<(), CheckError> {
        for (name, query, q) in self.resolve(interval)? {
            debug!(%name, %query, "executing monitor query");

            let samples = self
                .client
                .query(&self.config.address, &query)
                .await
                .map_err(|cause| CheckError::Query {
                    name: name.clone(),
                    cause,
                })?;

            if samples.is_empty() {
                return Err(CheckError::NoData(name));
            }

            for value in samples {
                let below = q.min.is_some_and(|min| value < min);
                let above = q.max.is_some_and(|max| value > max);
                if below || above {
                    return Err(CheckError::OutOfBounds {
                        name,
                        value,
                        min: q.min,
                        max: q.max,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StaticMetrics;
    use serde_json::json;
    use std::sync::Arc;

    fn monitor(client: Arc<StaticMetrics>, queries: serde_json::Value) -> MetricsMonitor {
        let mut monitor = MetricsMonitor::new(client);
        monitor
            .configure(
                "api-deployment",
                "prod",
                "orchestrator",
                &json!({ "address": "http://metrics:9090", "queries": queries }),
            )
            .unwrap();
        monitor
    }

    #[test]
    fn configure_requires_an_address() {
        let mut monitor = MetricsMonitor::new(Arc::new(StaticMetrics::default()));
        let err = monitor
            .configure("api", "prod", "orchestrator", &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn render_interpolates_identity_and_interval() {
        let rendered = render(
            "x{{workload}}.{{namespace}}[{{interval}}]",
            "api",
            "prod",
            Duration::from_secs(30),
        );
        assert_eq!(rendered, "xapi.prod[30s]");
    }

    #[tokio::test]
    async fn passing_query_within_bounds() {
        let client = Arc::new(StaticMetrics::default());
        client.set_samples(vec![99.2]);
        let monitor = monitor(
            client,
            json!([{ "name": "success", "preset": "request-success", "min": 95.0 }]),
        );

        monitor.check(Duration::from_secs(30)).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_preset_fails_before_any_query() {
        let client = Arc::new(StaticMetrics::default());
        let monitor = monitor(
            client.clone(),
            json!([
                { "name": "success", "preset": "request-success", "min": 95.0 },
                { "name": "bogus", "preset": "no-such-preset" },
            ]),
        );

        let err = monitor.check(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, CheckError::UnknownPreset(_)));
        assert_eq!(client.query_count(), 0);
    }

    #[tokio::test]
    async fn empty_query_and_preset_is_a_config_fault() {
        let client = Arc::new(StaticMetrics::default());
        let monitor = monitor(client, json!([{ "name": "unnamed" }]));

        let err = monitor.check(Duration::from_secs(30)).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn no_data_points_fails_the_check() {
        let client = Arc::new(StaticMetrics::default());
        client.set_samples(vec![]);
        let monitor = monitor(
            client,
            json!([{ "name": "success", "preset": "request-success", "min": 95.0 }]),
        );

        let err = monitor.check(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, CheckError::NoData(_)));
    }

    #[tokio::test]
    async fn value_below_minimum_is_out_of_bounds() {
        let client = Arc::new(StaticMetrics::default());
        client.set_samples(vec![82.0]);
        let monitor = monitor(
            client,
            json!([{ "name": "success", "preset": "request-success", "min": 95.0 }]),
        );

        match monitor.check(Duration::from_secs(30)).await.unwrap_err() {
            CheckError::OutOfBounds { name, value, .. } => {
                assert_eq!(name, "success");
                assert_eq!(value, 82.0);
            }
            other => panic!("expected out-of-bounds, got {other}"),
        }
    }

    #[tokio::test]
    async fn custom_query_with_maximum() {
        let client = Arc::new(StaticMetrics::default());
        client.set_samples(vec![310.0]);
        let monitor = monitor(
            client,
            json!([{
                "name": "latency",
                "query": "p99{deployment=\"{{workload}}\"}",
                "max": 250.0,
            }]),
        );

        let err = monitor.check(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, CheckError::OutOfBounds { .. }));
    }
}
