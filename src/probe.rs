//! Connectivity probing for registered servers.
//!
//! A probe connects to the server's endpoint, asks for its capability list,
//! and reports how long that took. Failures are data, not errors: every probe
//! returns a [`CheckResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::RemoteConnector;
use crate::error::Result;
use crate::models::{CheckOutcome, CheckResult, ServerRecord};
use crate::store::RegistryStore;

/// Times a connect + list-capabilities round trip against a server.
#[derive(Clone)]
pub struct HealthProber {
    connector: Arc<dyn RemoteConnector>,
    timeout: Option<Duration>,
}

impl HealthProber {
    /// `timeout` bounds the whole round trip; `None` leaves it to the transport.
    pub fn new(connector: Arc<dyn RemoteConnector>, timeout: Option<Duration>) -> Self {
        Self { connector, timeout }
    }

    pub async fn probe(&self, server: &ServerRecord) -> CheckResult {
        let start = Instant::now();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.round_trip(server)).await
            {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::anyhow!(
                    "timed out after {}ms",
                    limit.as_millis()
                )),
            },
            None => self.round_trip(server).await,
        };

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(()) => CheckResult {
                ok: true,
                latency_ms,
                detail: "Connection succeeded.".to_string(),
            },
            Err(e) => {
                let detail = format!("{:#}", e);
                CheckResult {
                    ok: false,
                    latency_ms,
                    detail: if detail.is_empty() {
                        "connection failed".to_string()
                    } else {
                        detail
                    },
                }
            }
        }
    }

    async fn round_trip(&self, server: &ServerRecord) -> anyhow::Result<()> {
        let endpoint = server.endpoint.as_str();
        let session = self.connector.connect(server.transport, endpoint).await?;
        let listed = session.list_capabilities().await;
        if let Err(e) = session.disconnect().await {
            tracing::debug!(endpoint, error = %e, "disconnect after probe failed");
        }
        listed.map(|_| ())
    }
}

/// Probes a registered server and records the outcome.
///
/// Fails only when `id` is unknown or storage is unavailable.
pub async fn check_server(
    store: &RegistryStore,
    prober: &HealthProber,
    id: &str,
) -> Result<CheckOutcome> {
    let server = store.get(id).await?;
    let result = prober.probe(&server).await;
    let status = result.status();

    store
        .record_check_result(id, status, result.latency_ms, &result.detail)
        .await?;

    if result.ok {
        tracing::info!(server_id = %id, latency_ms = result.latency_ms, "connectivity check passed");
    } else {
        tracing::warn!(server_id = %id, latency_ms = result.latency_ms, detail = %result.detail, "connectivity check failed");
    }

    Ok(CheckOutcome {
        status,
        latency_ms: result.latency_ms,
        detail: result.detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CapabilityInfo, McpConnector, RemoteSession};
    use crate::models::{CheckStatus, TransportType};
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RefusingConnector;

    #[async_trait]
    impl RemoteConnector for RefusingConnector {
        async fn connect(
            &self,
            _transport: TransportType,
            endpoint: &str,
        ) -> anyhow::Result<Box<dyn RemoteSession>> {
            bail!("connection refused: {}", endpoint)
        }
    }

    struct HealthyConnector {
        disconnects: Arc<AtomicUsize>,
        delay: Duration,
    }

    struct HealthySession {
        disconnects: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteConnector for HealthyConnector {
        async fn connect(
            &self,
            _transport: TransportType,
            _endpoint: &str,
        ) -> anyhow::Result<Box<dyn RemoteSession>> {
            Ok(Box::new(HealthySession {
                disconnects: self.disconnects.clone(),
                delay: self.delay,
            }))
        }
    }

    #[async_trait]
    impl RemoteSession for HealthySession {
        async fn list_capabilities(&self) -> anyhow::Result<Vec<CapabilityInfo>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![CapabilityInfo {
                name: "add".to_string(),
                description: None,
                input_schema: serde_json::json!({ "type": "object" }),
            }])
        }

        async fn call_capability(&self, _name: &str, _arguments: Value) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn server_with(transport: TransportType, endpoint: &str) -> ServerRecord {
        ServerRecord {
            id: "0011223344556677".to_string(),
            name: "check-me".to_string(),
            endpoint: endpoint.to_string(),
            transport,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_check_at: None,
            last_check_status: None,
            last_check_latency_ms: None,
            last_check_detail: None,
        }
    }

    fn server(endpoint: &str) -> ServerRecord {
        server_with(TransportType::Http, endpoint)
    }

    #[tokio::test]
    async fn test_immediate_connect_failure_is_reported() {
        let prober = HealthProber::new(Arc::new(RefusingConnector), None);
        let result = prober.probe(&server("http://127.0.0.1:1/mcp")).await;
        assert!(!result.ok);
        assert!(result.detail.contains("connection refused"));
        assert_eq!(result.status(), CheckStatus::Unreachable);
    }

    #[tokio::test]
    async fn test_successful_probe_disconnects() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let prober = HealthProber::new(
            Arc::new(HealthyConnector {
                disconnects: disconnects.clone(),
                delay: Duration::from_millis(0),
            }),
            None,
        );
        let result = prober.probe(&server("http://ok")).await;
        assert!(result.ok);
        assert_eq!(result.detail, "Connection succeeded.");
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_turns_into_unreachable() {
        let prober = HealthProber::new(
            Arc::new(HealthyConnector {
                disconnects: Arc::new(AtomicUsize::new(0)),
                delay: Duration::from_secs(5),
            }),
            Some(Duration::from_millis(50)),
        );
        let result = prober.probe(&server("http://slow")).await;
        assert!(!result.ok);
        assert!(result.detail.contains("timed out"));
        assert!(result.latency_ms >= 50);
    }

    #[tokio::test]
    async fn test_http_server_with_command_endpoint_is_not_executed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("executed");
        let endpoint = format!("touch {}", marker.display());

        let prober = HealthProber::new(Arc::new(McpConnector), Some(Duration::from_secs(10)));
        for transport in [TransportType::Http, TransportType::Sse] {
            let result = prober.probe(&server_with(transport, &endpoint)).await;
            assert!(!result.ok);
            assert!(result.detail.contains("http:// or https://"), "{}", result.detail);
        }
        assert!(!marker.exists());
    }
}
