//! Readiness probing for the simulator's embedded HTTP endpoint.
//!
//! This module provides [`ReadinessClient`], the seam the supervisor polls
//! while waiting for a freshly launched simulator to come up, and
//! [`HttpProbe`], the production implementation that issues a plain
//! HTTP/1.1 GET against the app's localhost server.
//!
//! Probe failures are split into two classes via
//! [`ProbeError::is_transient`]: connection refused, connection reset, and
//! truncated responses mean the app server has not finished binding its
//! socket yet and the caller should retry; everything else is fatal.
//!
//! # Example
//!
//! ```no_run
//! use simvisor_core::probe::{HttpProbe, ReadinessClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let probe = HttpProbe::new("127.0.0.1".into(), 50000);
//! let body = probe.get("/view").await?;
//! println!("simulator responded with {} bytes", body.len());
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout for establishing a TCP connection to the app server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for receiving the full response body.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while probing the simulator's HTTP endpoint.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Nothing is listening on the target port yet.
    #[error("connection refused")]
    ConnectionRefused,

    /// The peer accepted the connection but tore it down mid-exchange.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The stream closed before a complete response arrived.
    #[error("connection closed before a response was received")]
    UnexpectedEof,

    /// A connect or read operation exceeded its timeout.
    #[error("probe timed out")]
    Timeout,

    /// The server answered with a non-success status line.
    #[error("unexpected response: {0}")]
    BadResponse(String),

    /// Any other I/O error on the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Returns `true` for failures that mean "not listening yet".
    ///
    /// The supervisor keeps polling on transient errors and aborts the
    /// launch on anything else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::ConnectionRefused
                | ProbeError::ConnectionReset
                | ProbeError::UnexpectedEof
        )
    }
}

/// Map an I/O error onto the probe's transient categories where possible.
fn classify_io(err: std::io::Error) -> ProbeError {
    match err.kind() {
        ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            ProbeError::ConnectionReset
        }
        ErrorKind::UnexpectedEof => ProbeError::UnexpectedEof,
        _ => ProbeError::Io(err),
    }
}

// ---------------------------------------------------------------------------
// ReadinessClient trait
// ---------------------------------------------------------------------------

/// A client capable of issuing GET requests against the simulated app.
///
/// The supervisor uses this both to poll for readiness during launch and
/// to deliver the best-effort quit request during shutdown. Tests swap in
/// scripted implementations.
#[async_trait]
pub trait ReadinessClient: Send + Sync {
    /// Issue a GET for `path` and return the response body.
    async fn get(&self, path: &str) -> Result<String, ProbeError>;
}

// ---------------------------------------------------------------------------
// HttpProbe
// ---------------------------------------------------------------------------

/// Production [`ReadinessClient`] speaking minimal HTTP/1.1 over TCP.
///
/// Each call opens a fresh connection, writes a single GET request with
/// `Connection: close`, and reads until the server closes the stream. The
/// simulated app's embedded server is trivial enough that full response
/// parsing is unnecessary; only the status line is inspected.
pub struct HttpProbe {
    host: String,
    port: u16,
}

impl HttpProbe {
    /// Create a probe targeting `host:port`.
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

#[async_trait]
impl ReadinessClient for HttpProbe {
    async fn get(&self, path: &str) -> Result<String, ProbeError> {
        let addr = format!("{}:{}", self.host, self.port);
        trace!(%addr, path, "probing app server");

        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(classify_io)?;

        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.host
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(classify_io)?;

        let mut raw = Vec::new();
        timeout(READ_TIMEOUT, stream.read_to_end(&mut raw))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(classify_io)?;

        if raw.is_empty() {
            return Err(ProbeError::UnexpectedEof);
        }

        let text = String::from_utf8_lossy(&raw);
        let status_line = text.lines().next().unwrap_or_default();
        let ok = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code.starts_with('2'));
        if !ok {
            return Err(ProbeError::BadResponse(status_line.to_string()));
        }

        let body = match text.split_once("\r\n\r\n") {
            Some((_, body)) => body.to_string(),
            None => String::new(),
        };
        debug!(path, bytes = body.len(), "probe succeeded");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
