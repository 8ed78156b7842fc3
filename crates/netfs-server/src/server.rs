// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Accept loop and per-connection exchange

use crate::handler::{DEFAULT_MAX_READ_LEN, Reply, RequestHandler};
use crate::root::ServedRoot;
use crate::transfer::send_file_range;
use netfs_proto::{
    FRAME_HEADER_LEN, FrameHeader, ProtocolError, ReadResponse, Request, Response, Status,
    validate_request,
};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Bound on every socket read and write unless configured otherwise.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

const COMPONENT: &str = "netfs-server";

/// Pause after a failed accept, so that descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Requests carry a path and two integers; anything larger is not a request.
const MAX_REQUEST_PAYLOAD: u64 = 8 * 1024;

/// Errors that stop the server as a whole
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot serve {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("io_timeout must be greater than zero")]
    ZeroTimeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Why a connection ended without a complete exchange.
#[derive(Error, Debug)]
enum ConnectionError {
    #[error("peer closed the connection before sending a request")]
    Closed,

    #[error("timed out {0}")]
    Timeout(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory to export.
    pub root: PathBuf,
    pub bind_addr: SocketAddr,
    pub io_timeout: Duration,
    pub max_read_len: u64,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>, bind_addr: SocketAddr) -> Self {
        Self {
            root: root.into(),
            bind_addr,
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_read_len: DEFAULT_MAX_READ_LEN,
        }
    }
}

/// NetFS server bound to a TCP port.
pub struct NetFsServer {
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    io_timeout: Duration,
}

impl NetFsServer {
    /// Canonicalise the served root and bind the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        if config.io_timeout.is_zero() {
            return Err(ServerError::ZeroTimeout);
        }
        let root = ServedRoot::new(&config.root).map_err(|source| ServerError::Root {
            path: config.root.clone(),
            source,
        })?;
        let listener =
            TcpListener::bind(config.bind_addr).await.map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            component = COMPONENT,
            root = %root.path().display(),
            addr = %listener.local_addr()?,
            "NetFS server listening"
        );

        Ok(Self {
            listener,
            handler: Arc::new(RequestHandler::new(root).with_max_read_len(config.max_read_len)),
            io_timeout: config.io_timeout,
        })
    }

    /// Address actually bound, which differs from the configured one when
    /// port 0 was requested.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process ends.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(component = COMPONENT, "NetFS server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&self.handler);
                        let io_timeout = self.io_timeout;
                        tokio::spawn(async move {
                            match serve_connection(stream, peer, handler, io_timeout).await {
                                Ok(()) => {}
                                Err(ConnectionError::Closed) => {
                                    debug!(component = COMPONENT, %peer, "closed without a request");
                                }
                                Err(err) => {
                                    warn!(
                                        component = COMPONENT,
                                        %peer,
                                        error = %err,
                                        "connection failed"
                                    );
                                }
                            }
                        });
                    }
                    Err(err) => {
                        error!(component = COMPONENT, error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Run one exchange: read a request, answer it, close.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<RequestHandler>,
    io_timeout: Duration,
) -> Result<(), ConnectionError> {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(component = COMPONENT, %peer, error = %err, "failed to set TCP_NODELAY");
    }

    let request = read_request(&mut stream, io_timeout).await?;
    if let Err(err) = validate_request(&request) {
        if err.is_protocol_error() {
            return Err(ProtocolError::UnsupportedVersion(request.version()).into());
        }
    }

    let opcode = request.opcode();
    debug!(
        component = COMPONENT,
        %peer,
        %opcode,
        path = %String::from_utf8_lossy(request.path()),
        "request"
    );

    let reply = dispatch(handler, request).await;
    debug!(component = COMPONENT, %peer, %opcode, status = %reply.status(), "reply");
    write_reply(&mut stream, reply, io_timeout).await?;

    // The reply is already written; shutdown failures are not reported.
    if let Ok(Err(err)) = tokio::time::timeout(io_timeout, stream.shutdown()).await {
        debug!(component = COMPONENT, %peer, error = %err, "shutdown failed");
    }
    Ok(())
}

async fn read_request(
    stream: &mut TcpStream,
    io_timeout: Duration,
) -> Result<Request, ConnectionError> {
    let mut header_buf = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let read = stream.read(&mut header_buf[filled..]);
        let n = deadline(io_timeout, "reading request header", read).await?;
        if n == 0 {
            if filled == 0 {
                return Err(ConnectionError::Closed);
            }
            return Err(ProtocolError::Truncated {
                expected: FRAME_HEADER_LEN as u64,
                available: filled as u64,
            }
            .into());
        }
        filled += n;
    }

    let header = FrameHeader::from_bytes(&header_buf)?;
    if header.payload_len > MAX_REQUEST_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            length: header.payload_len,
            max: MAX_REQUEST_PAYLOAD,
        }
        .into());
    }

    let mut payload = Vec::with_capacity(header.payload_len as usize);
    let read = deadline(
        io_timeout,
        "reading request payload",
        (&mut *stream).take(header.payload_len).read_to_end(&mut payload),
    )
    .await? as u64;
    if read < header.payload_len {
        return Err(ProtocolError::Truncated {
            expected: header.payload_len,
            available: read,
        }
        .into());
    }

    Ok(Request::decode_payload(header.opcode, &payload)?)
}

/// Run the handler on the blocking pool. A panic inside it becomes an
/// `IoFailure` reply for the same opcode.
async fn dispatch(handler: Arc<RequestHandler>, request: Request) -> Reply {
    let opcode = request.opcode();
    match tokio::task::spawn_blocking(move || handler.handle(&request)).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(component = COMPONENT, %opcode, error = %err, "request handler failed");
            Reply::Message(Response::failure(opcode, Status::IoFailure))
        }
    }
}

async fn write_reply(
    stream: &mut TcpStream,
    reply: Reply,
    io_timeout: Duration,
) -> Result<(), ConnectionError> {
    match reply {
        Reply::Message(response) => {
            let frame = response.encode();
            deadline(io_timeout, "writing response", stream.write_all(&frame)).await?;
        }
        Reply::FileRange(range) => {
            let prefix = ReadResponse::streamed_prefix(range.len);
            deadline(io_timeout, "writing response header", stream.write_all(&prefix)).await?;
            send_file_range(stream, range, io_timeout).await?;
        }
    }
    deadline(io_timeout, "flushing response", stream.flush()).await?;
    Ok(())
}

async fn deadline<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, ConnectionError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ConnectionError::Io),
        Err(_) => Err(ConnectionError::Timeout(what)),
    }
}
