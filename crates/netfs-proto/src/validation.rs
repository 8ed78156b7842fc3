// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Schema validation for NetFS messages
//!
//! Decoding only proves a payload is well-formed SSZ. These checks enforce
//! what the fields may contain.

use crate::messages::{PROTOCOL_VERSION, Request};
use thiserror::Error;

/// Longest request path accepted, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Longest single path component or directory entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported protocol version {0}")]
    Version(u16),
    #[error("path contains a NUL byte")]
    NulByte,
    #[error("path is {0} bytes long (limit 4096)")]
    PathTooLong(usize),
    #[error("path component is {0} bytes long (limit 255)")]
    NameTooLong(usize),
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
}

impl ValidationError {
    /// Whether the peer is speaking a protocol this build does not understand,
    /// as opposed to sending a path the server refuses.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, ValidationError::Version(_))
    }
}

/// Validate a decoded request against its logical schema
pub fn validate_request(request: &Request) -> Result<(), ValidationError> {
    if request.version() != PROTOCOL_VERSION {
        return Err(ValidationError::Version(request.version()));
    }
    validate_path(request.path())
}

/// Check the shape of a request path without touching the filesystem.
pub fn validate_path(path: &[u8]) -> Result<(), ValidationError> {
    if path.contains(&0) {
        return Err(ValidationError::NulByte);
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::PathTooLong(path.len()));
    }
    if let Some(component) = path.split(|b| *b == b'/').find(|c| c.len() > MAX_NAME_LEN) {
        return Err(ValidationError::NameTooLong(component.len()));
    }
    Ok(())
}

/// Check a directory entry name received from a server.
///
/// Names must be single, non-empty components; `.` and `..` are synthesised
/// by the client and never come over the wire.
pub fn validate_entry_name(name: &[u8]) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidName(String::from_utf8_lossy(name).into_owned());
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') {
        return Err(invalid());
    }
    if name.contains(&0) {
        return Err(ValidationError::NulByte);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong(name.len()));
    }
    Ok(())
}
