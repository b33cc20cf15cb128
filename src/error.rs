//! Error taxonomy for vote sources and configuration.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Peer bodies kept for diagnostics are cut to this many bytes.
const MAX_BODY_CAPTURE: usize = 512;

/// Failure of a single vote source query or write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Network/connection failure or timeout talking to the source.
    #[error("source unreachable: {detail}")]
    Unreachable { detail: String, timed_out: bool },

    /// The source answered but the payload or status was unusable.
    #[error("protocol error: {detail}")]
    ProtocolError {
        status: Option<u16>,
        body: String,
        detail: String,
    },

    /// The source was reachable but the query itself failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A write was attempted on a source without write authority.
    #[error("source '{0}' does not accept votes")]
    ReadOnly(String),
}

impl SourceError {
    pub fn timeout(after: Duration) -> Self {
        SourceError::Unreachable {
            detail: format!("timed out after {:.1}s", after.as_secs_f64()),
            timed_out: true,
        }
    }

    /// Build a protocol error, keeping a bounded copy of the raw body.
    pub fn protocol(status: Option<u16>, body: &str, detail: impl Into<String>) -> Self {
        SourceError::ProtocolError {
            status,
            body: truncate_body(body),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unreachable {
                timed_out: true, ..
            } => "timeout",
            SourceError::Unreachable { .. } => "unreachable",
            SourceError::ProtocolError { .. } => "protocol_error",
            SourceError::QueryFailed(_) => "query_failed",
            SourceError::ReadOnly(_) => "read_only",
        }
    }
}

impl Serialize for SourceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kind", self.kind())?;
        map.serialize_entry("message", &self.to_string())?;
        if let SourceError::ProtocolError { status, body, .. } = self {
            if let Some(status) = status {
                map.serialize_entry("http_status", status)?;
            }
            if !body.is_empty() {
                map.serialize_entry("body", body)?;
            }
        }
        map.end()
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_CAPTURE {
        return body.to_string();
    }
    let mut end = MAX_BODY_CAPTURE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Invalid or missing source configuration. Fatal at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no vote sources configured")]
    NoSources,

    #[error("duplicate source id '{0}'")]
    DuplicateSource(String),

    #[error("invalid source '{id}': {reason}")]
    InvalidSource { id: String, reason: String },

    #[error("only one writable source is allowed, found: {}", .0.join(", "))]
    MultipleWritable(Vec<String>),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let refused = SourceError::Unreachable {
            detail: "connection refused".to_string(),
            timed_out: false,
        };
        let timed_out = SourceError::timeout(Duration::from_secs(5));
        let protocol = SourceError::protocol(Some(500), "oops", "peer returned 500");
        let query = SourceError::QueryFailed("no such table: votes".to_string());

        assert_eq!(refused.kind(), "unreachable");
        assert_eq!(timed_out.kind(), "timeout");
        assert_eq!(protocol.kind(), "protocol_error");
        assert_eq!(query.kind(), "query_failed");
        assert_eq!(timed_out.to_string(), "source unreachable: timed out after 5.0s");
    }

    #[test]
    fn test_protocol_error_captures_bounded_body() {
        let body = "x".repeat(MAX_BODY_CAPTURE * 2);
        let err = SourceError::protocol(Some(502), &body, "bad gateway");
        match &err {
            SourceError::ProtocolError { body, status, .. } => {
                assert_eq!(*status, Some(502));
                assert!(body.len() <= MAX_BODY_CAPTURE + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "protocol_error");
        assert_eq!(json["http_status"], 502);
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::MultipleWritable(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "only one writable source is allowed, found: a, b");

        let err = ConfigError::InvalidSource {
            id: "azure".to_string(),
            reason: "missing url".to_string(),
        };
        assert_eq!(err.to_string(), "invalid source 'azure': missing url");
    }
}
