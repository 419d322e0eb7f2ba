//! Remote execution engine client
//!
//! `EngineClient` is the lane's facade over the grid engine's three
//! operations: procedure calls, class/resource uploads, and ad-hoc schema
//! statements. It translates envelopes to [`CallResponse`] values and
//! propagates transport failures opaquely as [`RemoteCallError`];
//! timeouts and retries belong to the transport configuration, never to
//! this layer.

pub mod protocol;
pub mod transport;

pub use protocol::{Operation, RpcErrorPayload, RpcRequest, RpcResponse};
pub use transport::{MockTransport, TcpTransport, Transport, TransportError, DEFAULT_PORT};

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

/// Status of a completed engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Failure,
}

/// One result row: column name → string value.
pub type Row = BTreeMap<String, String>;

/// Outcome of an engine operation that reached the engine.
///
/// A failed procedure call is still a response; the caller decides what
/// the status text means. Only transport-level trouble becomes
/// [`RemoteCallError`].
#[derive(Debug, Clone)]
pub struct CallResponse {
    /// Operation status
    pub status: CallStatus,
    /// The engine's literal status text (empty on plain success)
    pub status_text: String,
    /// Result rows (empty unless the operation returns data)
    pub rows: Vec<Row>,
}

impl CallResponse {
    /// Successful response with rows.
    pub fn success(rows: Vec<Row>) -> Self {
        Self {
            status: CallStatus::Success,
            status_text: String::new(),
            rows,
        }
    }

    /// Failed response with the engine's status text.
    pub fn failure(status_text: impl Into<String>) -> Self {
        Self {
            status: CallStatus::Failure,
            status_text: status_text.into(),
            rows: Vec::new(),
        }
    }

    /// True when the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }
}

/// Errors raised when an operation cannot reach the engine or the reply
/// cannot be understood.
#[derive(Debug, thiserror::Error)]
pub enum RemoteCallError {
    #[error("Remote call failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed engine response: {0}")]
    Protocol(String),
}

/// The status text an engine emits when a called procedure is unknown.
///
/// The deployment probe matches this text exactly to distinguish "schema
/// absent" from every other failure.
pub fn procedure_not_found_text(procedure: &str) -> String {
    format!("Procedure {} was not found", procedure)
}

/// Client facade over a [`Transport`].
pub struct EngineClient {
    transport: Arc<dyn Transport>,
}

impl EngineClient {
    /// Create a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Invoke a deployed procedure with positional string arguments.
    pub fn call(&self, procedure: &str, args: &[String]) -> Result<CallResponse, RemoteCallError> {
        self.execute(
            Operation::Call,
            json!({ "procedure": procedure, "args": args }),
        )
    }

    /// Upload a serialized bundle through the engine's class loader.
    pub fn update_classes(&self, bundle_bytes: &[u8]) -> Result<CallResponse, RemoteCallError> {
        self.execute(
            Operation::UpdateClasses,
            json!({ "bundle_base64": BASE64.encode(bundle_bytes) }),
        )
    }

    /// Execute one declarative schema statement.
    pub fn ad_hoc(&self, statement: &str) -> Result<CallResponse, RemoteCallError> {
        self.execute(Operation::AdHoc, json!({ "statement": statement }))
    }

    fn execute(
        &self,
        op: Operation,
        payload: serde_json::Value,
    ) -> Result<CallResponse, RemoteCallError> {
        let request = RpcRequest {
            op,
            request_id: uuid::Uuid::new_v4().to_string(),
            payload,
        };

        let response = self.transport.execute(&request)?;
        if response.ok {
            let rows = match response.payload {
                Some(payload) => parse_rows(payload)?,
                None => Vec::new(),
            };
            Ok(CallResponse::success(rows))
        } else {
            let message = response
                .error
                .map(|e| e.message)
                .ok_or_else(|| {
                    RemoteCallError::Protocol("failure response without error payload".to_string())
                })?;
            Ok(CallResponse::failure(message))
        }
    }
}

fn parse_rows(payload: serde_json::Value) -> Result<Vec<Row>, RemoteCallError> {
    match payload.get("rows") {
        None => Ok(Vec::new()),
        Some(rows) => serde_json::from_value(rows.clone())
            .map_err(|e| RemoteCallError::Protocol(format!("unparseable rows: {}", e))),
    }
}
