//! Transport layer for the engine client
//!
//! Abstracts the wire connection for testability:
//! - `Transport` trait: interface for envelope exchange
//! - `TcpTransport`: newline-delimited JSON to a live grid node
//! - `MockTransport`: in-process mock engine for tests

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::mock::MockEngine;

use super::protocol::{RpcRequest, RpcResponse};

/// Default grid RPC port
pub const DEFAULT_PORT: u16 = 21121;

/// Transport trait for envelope exchange
pub trait Transport: Send + Sync {
    /// Execute an RPC request and return the response
    fn execute(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// TCP transport speaking one JSON envelope per line.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
    peer: String,
}

impl TcpTransport {
    /// Connect to the first reachable host in the list.
    ///
    /// Hosts may carry an explicit `host:port`; bare names get
    /// [`DEFAULT_PORT`]. Unreachable hosts are logged and skipped.
    pub fn connect(hosts: &[String], timeout: Duration) -> Result<Self, TransportError> {
        for host in hosts {
            let addr = if host.contains(':') {
                host.clone()
            } else {
                format!("{}:{}", host, DEFAULT_PORT)
            };

            info!(host = %addr, "connecting to grid node");
            match Self::connect_one(&addr, timeout) {
                Ok(stream) => {
                    return Ok(Self {
                        stream: Mutex::new(stream),
                        peer: addr,
                    });
                }
                Err(e) => {
                    warn!(host = %addr, error = %e, "grid node unreachable");
                }
            }
        }

        Err(TransportError::ConnectionFailed(format!(
            "no reachable grid node among: {}",
            hosts.join(",")
        )))
    }

    fn connect_one(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
        let mut last = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
        for resolved in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&resolved, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Address of the connected peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Transport for TcpTransport {
    fn execute(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        let mut stream = self.stream.lock().unwrap();

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        stream.write_all(line.as_bytes())?;
        stream.flush()?;

        let mut reader = BufReader::new(&mut *stream);
        let mut reply = String::new();
        let n = reader.read_line(&mut reply)?;
        if n == 0 {
            return Err(TransportError::Protocol(
                "connection closed before response".to_string(),
            ));
        }

        let response: RpcResponse = serde_json::from_str(reply.trim_end())?;
        if response.request_id != request.request_id {
            return Err(TransportError::Protocol(format!(
                "response correlation mismatch: sent {}, got {}",
                request.request_id, response.request_id
            )));
        }
        Ok(response)
    }
}

/// Mock transport for testing - dispatches directly to a MockEngine in-process
pub struct MockTransport {
    engine: Arc<MockEngine>,
    fail_next: Mutex<Option<(Option<crate::engine::Operation>, String)>>,
}

impl MockTransport {
    /// Create a mock transport bound to the given engine.
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self {
            engine,
            fail_next: Mutex::new(None),
        }
    }

    /// Get the underlying mock engine for test configuration.
    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }

    /// Make the next execute fail at the transport layer.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some((None, message.into()));
    }

    /// Make the next execute of the given operation fail at the
    /// transport layer; other operations pass through untouched.
    pub fn fail_next_op(&self, op: crate::engine::Operation, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some((Some(op), message.into()));
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        {
            let mut fail_next = self.fail_next.lock().unwrap();
            let matches = fail_next
                .as_ref()
                .map(|(op, _)| op.map_or(true, |op| op == request.op))
                .unwrap_or(false);
            if matches {
                let (_, message) = fail_next.take().unwrap();
                return Err(TransportError::ConnectionFailed(message));
            }
        }
        Ok(self.engine.handle_request(request))
    }
}
