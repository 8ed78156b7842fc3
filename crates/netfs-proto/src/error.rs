// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the NetFS wire protocol

use std::io;
use thiserror::Error;

/// A frame or payload that cannot be interpreted.
///
/// Protocol errors are fatal to the session that produced them: the peer is
/// no longer known to be byte-aligned, so the connection is closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame truncated: expected {expected} bytes, {available} available")]
    Truncated { expected: u64, available: u64 },
    #[error("unknown operation code {0}")]
    UnknownOperation(u16),
    #[error("frame payload of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge { length: u64, max: u64 },
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
    #[error("response opcode {actual} does not answer request opcode {expected}")]
    OpcodeMismatch { expected: u16, actual: u16 },
}

impl ProtocolError {
    pub(crate) fn from_ssz(err: ssz::DecodeError) -> Self {
        ProtocolError::Malformed(format!("{:?}", err))
    }
}

/// Failure while pulling a frame off a byte stream.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The peer closed the stream before sending a single header byte.
    #[error("connection closed before a frame arrived")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
