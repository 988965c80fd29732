//! Command headers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use twin_id::{CorrelationId, Revision};

/// Header bag carried by every command and echoed on every response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Headers {
    /// Matches responses to requests. Must be non-empty.
    #[serde(default)]
    pub correlation_id: String,

    /// Authorization subjects already resolved for the caller, e.g. `nginx:alice`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_subjects: Vec<String>,

    /// Revision the caller expects the thing to be at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<Revision>,

    /// Resource type the caller believes the command targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_resource_type: Option<String>,

    /// Per-command deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Headers {
    /// Creates headers with a freshly generated correlation id.
    pub fn new() -> Self {
        Self::with_correlation_id(CorrelationId::new().to_string())
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    pub fn auth_subject(mut self, subject: impl Into<String>) -> Self {
        self.auth_subjects.push(subject.into());
        self
    }

    pub fn expected_revision(mut self, revision: Revision) -> Self {
        self.expected_revision = Some(revision);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The per-command deadline, if the caller set one.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Headers to put on a response: the request's headers, unchanged.
    pub fn for_response(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_generates_correlation_id() {
        let headers = Headers::new();
        assert!(headers.correlation_id.starts_with("corr_"));
        assert_ne!(headers.correlation_id, Headers::new().correlation_id);
    }

    #[test]
    fn test_builder() {
        let headers = Headers::with_correlation_id("c-1")
            .auth_subject("nginx:alice")
            .expected_revision(Revision::new(3))
            .timeout(Duration::from_millis(250))
            .extra("source", "test");
        assert_eq!(headers.auth_subjects, ["nginx:alice"]);
        assert_eq!(headers.expected_revision, Some(Revision::new(3)));
        assert_eq!(headers.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_response_headers_echo_request() {
        let headers = Headers::with_correlation_id("c-1")
            .auth_subject("nginx:alice")
            .expected_revision(Revision::new(1))
            .timeout(Duration::from_millis(500))
            .extra("source", "test");
        let echoed = headers.for_response();
        assert_eq!(echoed, headers);
        assert_eq!(echoed.auth_subjects, ["nginx:alice"]);
        assert_eq!(echoed.expected_revision, Some(Revision::new(1)));
        assert_eq!(echoed.timeout_ms, Some(500));
    }

    #[test]
    fn test_deserialize_minimal() {
        let headers: Headers = serde_json::from_value(json!({"correlation_id": "x"})).unwrap();
        assert_eq!(headers, Headers::with_correlation_id("x"));

        let empty: Headers = serde_json::from_value(json!({})).unwrap();
        assert!(empty.correlation_id.is_empty());
    }
}
