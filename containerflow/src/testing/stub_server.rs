//! A stub stage service speaking the HTTP/JSON execute contract.
//!
//! The HTTP handling is deliberately small: one request per connection, the
//! body is read by `Content-Length` only (missing means empty), and chunked
//! transfer encoding is not understood.

use crate::dispatch::wire::{ExecuteRequest, ExecuteResponse, EXECUTE_PATH};
use crate::registry::Endpoint;
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on request headers.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// How the stub answers execute requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubReply {
    /// Reply `success = true`.
    Succeed,
    /// Reply `success = false` with the given message.
    Fail(String),
    /// Sleep before replying successfully.
    Delay(Duration),
    /// Reply with the given HTTP status and no execute response.
    Status(u16),
    /// Reply 200 with a body that is not an execute response.
    Garbage,
}

/// A running stub stage service.
///
/// The accept loop stops when the server is dropped.
#[derive(Debug)]
pub struct StubStageServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<ExecuteRequest>>>,
    task: JoinHandle<()>,
}

impl StubStageServer {
    /// Starts a stub on an ephemeral localhost port.
    pub async fn start(reply: StubReply) -> io::Result<Self> {
        Self::bind("127.0.0.1:0", reply).await
    }

    /// Starts a stub on `addr`.
    pub async fn bind(addr: &str, reply: StubReply) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(accept_loop(listener, reply, requests.clone()));
        info!(addr = %addr, "Stub stage server listening");
        Ok(Self { addr, requests, task })
    }

    /// Returns the bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the endpoint to register for this stub.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Returns the requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for StubStageServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, reply: StubReply, requests: Arc<Mutex<Vec<ExecuteRequest>>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let reply = reply.clone();
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &reply, &requests).await {
                        warn!(peer = %peer, error = %e, "Stub connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Stub accept failed");
                return;
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    reply: &StubReply,
    requests: &Mutex<Vec<ExecuteRequest>>,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return write_response(&mut stream, 431, "{}").await;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = &buf[header_end..body_end];

    if method != "POST" || path != EXECUTE_PATH {
        return write_response(&mut stream, 404, r#"{"error":"not found"}"#).await;
    }

    let request: ExecuteRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            let body = serde_json::json!({ "error": e.to_string() }).to_string();
            return write_response(&mut stream, 400, &body).await;
        }
    };
    debug!(input = %request.input_file, output = %request.output_file, "Stub received execute request");
    requests.lock().push(request);

    let response = match reply {
        StubReply::Succeed => ExecuteResponse::ok("stub ok"),
        StubReply::Fail(message) => ExecuteResponse::failed(message.clone()),
        StubReply::Delay(delay) => {
            tokio::time::sleep(*delay).await;
            ExecuteResponse::ok("stub ok")
        }
        StubReply::Status(status) => return write_response(&mut stream, *status, r#"{"error":"stub"}"#).await,
        StubReply::Garbage => return write_response(&mut stream, 200, "not json").await,
    };
    let body = serde_json::to_string(&response).map_err(io::Error::other)?;
    write_response(&mut stream, 200, &body).await
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
