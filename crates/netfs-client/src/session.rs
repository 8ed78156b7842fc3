// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One connection carrying one request/response exchange

use crate::config::ClientConfig;
use crate::error::ClientError;
use netfs_proto::{ProtocolError, Request, Response, read_frame, write_frame};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use tracing::debug;

/// A connected socket that has not yet carried its exchange.
///
/// [`Session::exchange`] consumes the session, so a connection can never be
/// reused; dropping it closes the socket.
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Session {
    /// Resolve the configured server and connect to the first address that
    /// accepts, applying the connect and I/O timeouts.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let resolve_error = |source| ClientError::Resolve {
            host: config.server.clone(),
            port: config.port,
            source,
        };
        let addrs: Vec<SocketAddr> = (config.server.as_str(), config.port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .collect();
        if addrs.is_empty() {
            return Err(resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses found",
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
                Ok(stream) => return Self::configure(stream, addr, config),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(ClientError::Connect {
            host: config.server.clone(),
            port: config.port,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address tried")),
        })
    }

    fn configure(
        stream: TcpStream,
        peer: SocketAddr,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let io_timeout = Some(config.io_timeout());
        stream.set_read_timeout(io_timeout).map_err(ClientError::Transport)?;
        stream.set_write_timeout(io_timeout).map_err(ClientError::Transport)?;
        stream.set_nodelay(true).map_err(ClientError::Transport)?;
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send `request`, wait for its response and close the connection.
    ///
    /// The response must carry the request's opcode.
    pub fn exchange(mut self, request: &Request) -> Result<Response, ClientError> {
        write_frame(&mut self.stream, request.opcode(), &request.encode_payload())?;

        let (header, payload) = read_frame(&mut self.stream)?;
        if header.opcode != request.opcode() {
            return Err(ProtocolError::OpcodeMismatch {
                expected: request.opcode().as_u16(),
                actual: header.opcode.as_u16(),
            }
            .into());
        }

        Ok(Response::decode_payload(header.opcode, &payload)?)
    }
}
