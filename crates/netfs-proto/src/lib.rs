// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! NetFS Protocol: wire framing, message types and validation
//!
//! Every message travels as one frame:
//!
//! ```text
//! +---------------------------+-------------------+------------------+
//! | payload length (u64, BE)  | opcode (u16, BE)  | SSZ payload      |
//! +---------------------------+-------------------+------------------+
//! ```
//!
//! Requests and responses share the opcode table; a response frame always
//! carries the opcode of the request it answers. One TCP connection carries
//! exactly one request/response exchange.

pub mod error;
pub mod frame;
pub mod messages;
pub mod validation;

/// TCP port used when neither side is told otherwise.
pub const DEFAULT_PORT: u16 = 4455;

pub use error::{FrameError, ProtocolError};
pub use frame::{
    FRAME_HEADER_LEN, FrameHeader, MAX_FRAME_PAYLOAD, Opcode, encode_frame, read_frame,
    split_frame, write_frame,
};
pub use messages::{
    AttrResponse, DirEntry, DirResponse, OpenResponse, PROTOCOL_VERSION, PathRequest,
    ReadRequest, ReadResponse, Request, Response, Status,
};
pub use validation::*;
