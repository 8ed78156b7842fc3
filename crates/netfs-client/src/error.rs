// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use netfs_proto::{FrameError, ProtocolError, Status};
use std::io;
use thiserror::Error;

/// Outcome of a failed client call.
///
/// Connection failures, transport failures, protocol failures and statuses
/// reported by the server stay distinguishable; [`ClientError::errno`]
/// collapses them for the mount layer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server replied: {0}")]
    Status(Status),
}

impl ClientError {
    /// Error number reported to the mount layer.
    pub fn errno(&self) -> i32 {
        match self {
            ClientError::Status(Status::NotFound) => libc::ENOENT,
            ClientError::Status(Status::Denied) => libc::EACCES,
            ClientError::Status(Status::NotADirectory) => libc::ENOTDIR,
            ClientError::Status(Status::IsADirectory) => libc::EISDIR,
            _ => libc::EIO,
        }
    }

    /// The server could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ClientError::Resolve { .. } | ClientError::Connect { .. })
    }

    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    /// The server answered with this status.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Closed => ClientError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection without replying",
            )),
            FrameError::Io(err) => ClientError::Transport(err),
            FrameError::Protocol(err) => ClientError::Protocol(err),
        }
    }
}
