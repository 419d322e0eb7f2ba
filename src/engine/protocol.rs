//! Grid RPC envelope types
//!
//! Defines the JSON request/response envelope spoken to a grid node.
//!
//! Protocol: single JSON request per line → single JSON response per line.

use serde::{Deserialize, Serialize};

/// Supported engine operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Invoke a deployed procedure by name
    Call,
    /// Upload a code/resource bundle to the engine's class loader
    UpdateClasses,
    /// Execute one declarative schema statement
    AdHoc,
}

/// RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Operation to perform
    pub op: Operation,

    /// Caller-chosen request ID for correlation
    pub request_id: String,

    /// Operation-specific payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request ID for correlation
    pub request_id: String,

    /// Whether the operation succeeded
    pub ok: bool,

    /// Operation-specific payload (present when ok=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Error details (present when ok=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorPayload>,
}

impl RpcResponse {
    /// Create a successful response
    pub fn success(request_id: String, payload: serde_json::Value) -> Self {
        Self {
            request_id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response
    pub fn failure(request_id: String, message: impl Into<String>) -> Self {
        Self {
            request_id,
            ok: false,
            payload: None,
            error: Some(RpcErrorPayload {
                message: message.into(),
            }),
        }
    }
}

/// Error payload structure
///
/// The message is the engine's literal status text; callers surface it
/// unmodified so operators can diagnose remote-side causes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    /// Human-readable, single-line status text
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(serde_json::to_string(&Operation::Call).unwrap(), "\"call\"");
        assert_eq!(
            serde_json::to_string(&Operation::UpdateClasses).unwrap(),
            "\"update_classes\""
        );
        assert_eq!(serde_json::to_string(&Operation::AdHoc).unwrap(), "\"ad_hoc\"");
    }

    #[test]
    fn test_request_round_trip() {
        let request = RpcRequest {
            op: Operation::Call,
            request_id: "req-1".to_string(),
            payload: json!({"procedure": "IsFlightLate", "args": ["SAN"]}),
        };

        let wire = serde_json::to_string(&request).unwrap();
        let parsed: RpcRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed.op, Operation::Call);
        assert_eq!(parsed.request_id, "req-1");
        assert_eq!(parsed.payload["procedure"], "IsFlightLate");
    }

    #[test]
    fn test_failure_carries_message() {
        let response = RpcResponse::failure("req-2".to_string(), "Object not found");
        assert!(!response.ok);
        assert!(response.payload.is_none());
        assert_eq!(response.error.unwrap().message, "Object not found");
    }

    #[test]
    fn test_success_omits_error_field() {
        let response = RpcResponse::success("req-3".to_string(), json!({"rows": []}));
        let wire = serde_json::to_string(&response).unwrap();
        assert!(!wire.contains("\"error\""));
    }
}
