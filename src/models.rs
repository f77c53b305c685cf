//! Core data models for the control plane.
//!
//! [`ServerRecord`] and [`LogEntry`] are the two persisted entities; the
//! enums below are the closed vocabularies stored in their text columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a registered server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
    Sse,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Stdio => "stdio",
            TransportType::Http => "http",
            TransportType::Sse => "sse",
        }
    }

    /// Checks that `endpoint` can be reached over this transport.
    ///
    /// `http` and `sse` need an `http://` or `https://` URL; `stdio` needs a
    /// non-empty command line.
    pub fn check_endpoint(&self, endpoint: &str) -> Result<(), Error> {
        let endpoint = endpoint.trim();
        match self {
            TransportType::Http | TransportType::Sse => {
                if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    Ok(())
                } else {
                    Err(Error::Validation(format!(
                        "{} endpoint must be an http:// or https:// URL (got '{}')",
                        self, endpoint
                    )))
                }
            }
            TransportType::Stdio => {
                if endpoint.is_empty() {
                    Err(Error::Validation(
                        "stdio endpoint must be a command line".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportType::Stdio),
            "http" => Ok(TransportType::Http),
            "sse" => Ok(TransportType::Sse),
            other => Err(Error::Validation(format!(
                "type must be one of stdio, http, sse (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent connectivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unreachable,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Healthy => "healthy",
            CheckStatus::Unreachable => "unreachable",
        }
    }

    /// Log level recorded alongside a check with this status.
    pub fn log_level(&self) -> LogLevel {
        match self {
            CheckStatus::Healthy => LogLevel::Info,
            CheckStatus::Unreachable => LogLevel::Error,
        }
    }
}

impl FromStr for CheckStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(CheckStatus::Healthy),
            "unreachable" => Ok(CheckStatus::Unreachable),
            other => Err(Error::Validation(format!("unknown check status '{}'", other))),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Validation(format!("unknown log level '{}'", other))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the last connectivity check written to a server row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCheck {
    pub at: String, // ISO8601
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub detail: String,
}

/// A registered tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(rename = "type")]
    pub transport: TransportType,
    pub created_at: String, // ISO8601
    pub last_check_at: Option<String>,
    pub last_check_status: Option<CheckStatus>,
    pub last_check_latency_ms: Option<u64>,
    pub last_check_detail: Option<String>,
}

impl ServerRecord {
    /// The last check as one value; `None` until the server is first checked.
    pub fn last_check(&self) -> Option<LastCheck> {
        Some(LastCheck {
            at: self.last_check_at.clone()?,
            status: self.last_check_status?,
            latency_ms: self.last_check_latency_ms.unwrap_or(0),
            detail: self.last_check_detail.clone().unwrap_or_default(),
        })
    }
}

/// One line of a server's bounded activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub server_id: String,
    pub timestamp: String, // ISO8601
    pub level: LogLevel,
    pub message: String,
}

/// Raw result of a single reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub ok: bool,
    pub latency_ms: u64,
    pub detail: String,
}

impl CheckResult {
    pub fn status(&self) -> CheckStatus {
        if self.ok {
            CheckStatus::Healthy
        } else {
            CheckStatus::Unreachable
        }
    }
}

/// Response body of a triggered check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_rejects_unknown() {
        assert_eq!("sse".parse::<TransportType>().unwrap(), TransportType::Sse);
        let err = "websocket".parse::<TransportType>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_server_record_wire_shape() {
        let record = ServerRecord {
            id: "abc".into(),
            name: "demo".into(),
            endpoint: "http://localhost:9000/mcp".into(),
            transport: TransportType::Http,
            created_at: "2026-01-01T00:00:00Z".into(),
            last_check_at: None,
            last_check_status: None,
            last_check_latency_ms: None,
            last_check_detail: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "http");
        assert_eq!(value["createdAt"], "2026-01-01T00:00:00Z");
        for key in ["lastCheckAt", "lastCheckStatus", "lastCheckLatencyMs", "lastCheckDetail"] {
            assert!(value.get(key).is_some_and(|v| v.is_null()), "{} missing", key);
        }
        assert!(value.get("lastCheck").is_none());
        assert_eq!(record.last_check(), None);
    }

    #[test]
    fn test_checked_record_serializes_flat() {
        let record = ServerRecord {
            id: "abc".into(),
            name: "demo".into(),
            endpoint: "http://localhost:9000/mcp".into(),
            transport: TransportType::Http,
            created_at: "2026-01-01T00:00:00Z".into(),
            last_check_at: Some("2026-01-01T00:01:00Z".into()),
            last_check_status: Some(CheckStatus::Unreachable),
            last_check_latency_ms: Some(12),
            last_check_detail: Some("connection refused".into()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["lastCheckStatus"], "unreachable");
        assert_eq!(value["lastCheckLatencyMs"], 12);
        assert_eq!(record.last_check().unwrap().detail, "connection refused");
    }

    #[test]
    fn test_url_transports_reject_command_lines() {
        for transport in [TransportType::Http, TransportType::Sse] {
            let err = transport.check_endpoint("touch /tmp/x").unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert!(transport.check_endpoint("https://tools.example.com/mcp").is_ok());
        }
        assert!(TransportType::Stdio.check_endpoint("npx -y some-server").is_ok());
        assert!(TransportType::Stdio.check_endpoint("  ").is_err());
    }

    #[test]
    fn test_check_status_levels() {
        assert_eq!(CheckStatus::Healthy.log_level(), LogLevel::Info);
        assert_eq!(CheckStatus::Unreachable.log_level(), LogLevel::Error);
    }
}
