// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request and response payloads for NetFS
//!
//! Payloads are SSZ containers. Variable-length fields (paths, entry names,
//! file data) are offset-delimited by SSZ itself, so arbitrary bytes are
//! carried without terminators.

use crate::error::ProtocolError;
use crate::frame::{
    FRAME_HEADER_LEN, FrameHeader, MAX_FRAME_PAYLOAD, Opcode, encode_frame, split_frame,
};
use ssz::{Decode, DecodeError, Encode};
use ssz_derive::{Decode, Encode};
use std::fmt;

/// Version carried in every request payload.
pub const PROTOCOL_VERSION: u16 = 1;

/// Application-level outcome of a request.
///
/// Statuses travel inside responses; they never tear down the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    NotFound = 1,
    Denied = 2,
    NotADirectory = 3,
    IsADirectory = 4,
    IoFailure = 5,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Status::Ok),
            1 => Some(Status::NotFound),
            2 => Some(Status::Denied),
            3 => Some(Status::NotADirectory),
            4 => Some(Status::IsADirectory),
            5 => Some(Status::IoFailure),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "ok",
            Status::NotFound => "not found",
            Status::Denied => "denied",
            Status::NotADirectory => "not a directory",
            Status::IsADirectory => "is a directory",
            Status::IoFailure => "I/O failure",
        };
        f.write_str(text)
    }
}

impl Encode for Status {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        1
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }

    fn ssz_bytes_len(&self) -> usize {
        1
    }
}

impl Decode for Status {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        1
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        match bytes {
            [byte] => Status::from_byte(*byte)
                .ok_or_else(|| DecodeError::BytesInvalid(format!("unknown status {}", byte))),
            _ => Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: 1,
            }),
        }
    }
}

/// Payload for GET_ATTR, READ_DIR and OPEN.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PathRequest {
    pub version: u16,
    pub path: Vec<u8>,
}

/// Payload for READ.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReadRequest {
    pub version: u16,
    pub path: Vec<u8>,
    pub offset: u64,
    pub length: u64,
}

/// A request; the variant selects the frame opcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    ReadDir(PathRequest),
    GetAttr(PathRequest),
    Open(PathRequest),
    Read(ReadRequest),
}

impl Request {
    pub fn get_attr(path: impl Into<Vec<u8>>) -> Self {
        Request::GetAttr(PathRequest {
            version: PROTOCOL_VERSION,
            path: path.into(),
        })
    }

    pub fn read_dir(path: impl Into<Vec<u8>>) -> Self {
        Request::ReadDir(PathRequest {
            version: PROTOCOL_VERSION,
            path: path.into(),
        })
    }

    pub fn open(path: impl Into<Vec<u8>>) -> Self {
        Request::Open(PathRequest {
            version: PROTOCOL_VERSION,
            path: path.into(),
        })
    }

    pub fn read(path: impl Into<Vec<u8>>, offset: u64, length: u64) -> Self {
        Request::Read(ReadRequest {
            version: PROTOCOL_VERSION,
            path: path.into(),
            offset,
            length,
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::ReadDir(_) => Opcode::ReadDir,
            Request::GetAttr(_) => Opcode::GetAttr,
            Request::Open(_) => Opcode::Open,
            Request::Read(_) => Opcode::Read,
        }
    }

    pub fn path(&self) -> &[u8] {
        match self {
            Request::ReadDir(req) | Request::GetAttr(req) | Request::Open(req) => &req.path,
            Request::Read(req) => &req.path,
        }
    }

    pub fn version(&self) -> u16 {
        match self {
            Request::ReadDir(req) | Request::GetAttr(req) | Request::Open(req) => req.version,
            Request::Read(req) => req.version,
        }
    }

    /// SSZ payload without the frame header.
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Request::ReadDir(req) | Request::GetAttr(req) | Request::Open(req) => {
                req.as_ssz_bytes()
            }
            Request::Read(req) => req.as_ssz_bytes(),
        }
    }

    /// Encode as a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(self.opcode(), &self.encode_payload())
    }

    /// Decode a complete frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (header, payload) = split_frame(bytes)?;
        Self::decode_payload(header.opcode, payload)
    }

    /// Decode a payload whose header has already been consumed.
    pub fn decode_payload(opcode: Opcode, payload: &[u8]) -> Result<Self, ProtocolError> {
        let request = match opcode {
            Opcode::ReadDir => Request::ReadDir(decode_ssz(payload)?),
            Opcode::GetAttr => Request::GetAttr(decode_ssz(payload)?),
            Opcode::Open => Request::Open(decode_ssz(payload)?),
            Opcode::Read => Request::Read(decode_ssz(payload)?),
        };
        Ok(request)
    }
}

/// GET_ATTR result. Timestamps are seconds and nanoseconds since the epoch.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AttrResponse {
    pub status: Status,
    pub exists: bool,
    pub is_directory: bool,
    pub size: u64,
    /// Permission and file-type bits with every write bit cleared.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime_secs: u64,
    pub atime_nsec: u32,
    pub mtime_secs: u64,
    pub mtime_nsec: u32,
    pub ctime_secs: u64,
    pub ctime_nsec: u32,
}

impl AttrResponse {
    /// The path does not exist under the served root.
    pub fn missing() -> Self {
        Self::failure(Status::NotFound)
    }

    pub fn failure(status: Status) -> Self {
        Self {
            status,
            exists: false,
            is_directory: false,
            size: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            atime_secs: 0,
            atime_nsec: 0,
            mtime_secs: 0,
            mtime_nsec: 0,
            ctime_secs: 0,
            ctime_nsec: 0,
        }
    }
}

/// One directory entry. `.` and `..` are never sent.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub is_directory: bool,
}

/// READ_DIR result.
///
/// `count` states the number of entries up front; decoding fails if the
/// list disagrees with it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DirResponse {
    pub status: Status,
    pub count: u32,
    pub entries: Vec<DirEntry>,
}

impl DirResponse {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            status: Status::Ok,
            count: entries.len() as u32,
            entries,
        }
    }

    pub fn failure(status: Status) -> Self {
        Self {
            status,
            count: 0,
            entries: Vec::new(),
        }
    }

    /// Whether the encoded payload stays within [`MAX_FRAME_PAYLOAD`].
    pub fn fits_in_frame(&self) -> bool {
        self.ssz_bytes_len() as u64 <= MAX_FRAME_PAYLOAD
    }
}

/// OPEN result. No handle is returned: the protocol is stateless.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct OpenResponse {
    pub status: Status,
}

/// READ result.
///
/// `data` is the last field so the payload is the fixed part followed by
/// the raw file bytes; see [`ReadResponse::streamed_prefix`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReadResponse {
    pub status: Status,
    pub bytes_returned: u64,
    pub data: Vec<u8>,
}

impl ReadResponse {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            bytes_returned: data.len() as u64,
            data,
        }
    }

    pub fn failure(status: Status) -> Self {
        Self {
            status,
            bytes_returned: 0,
            data: Vec::new(),
        }
    }

    /// Frame header and fixed payload part of a successful READ carrying
    /// `bytes_returned` bytes of data.
    ///
    /// Writing this prefix and then exactly `bytes_returned` raw bytes
    /// produces the same frame as `Response::Read(ReadResponse::new(data))`,
    /// which lets the server stream file contents straight to the socket.
    pub fn streamed_prefix(bytes_returned: u64) -> Vec<u8> {
        let fixed = ReadResponse {
            status: Status::Ok,
            bytes_returned,
            data: Vec::new(),
        }
        .as_ssz_bytes();
        let header = FrameHeader::new(Opcode::Read, fixed.len() as u64 + bytes_returned);

        let mut prefix = Vec::with_capacity(FRAME_HEADER_LEN + fixed.len());
        prefix.extend_from_slice(&header.to_bytes());
        prefix.extend_from_slice(&fixed);
        prefix
    }
}

/// A response; the variant matches the opcode of the request it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    ReadDir(DirResponse),
    GetAttr(AttrResponse),
    Open(OpenResponse),
    Read(ReadResponse),
}

impl Response {
    /// A response for `opcode` carrying only a failure status.
    pub fn failure(opcode: Opcode, status: Status) -> Self {
        match opcode {
            Opcode::ReadDir => Response::ReadDir(DirResponse::failure(status)),
            Opcode::GetAttr => Response::GetAttr(AttrResponse::failure(status)),
            Opcode::Open => Response::Open(OpenResponse { status }),
            Opcode::Read => Response::Read(ReadResponse::failure(status)),
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Response::ReadDir(_) => Opcode::ReadDir,
            Response::GetAttr(_) => Opcode::GetAttr,
            Response::Open(_) => Opcode::Open,
            Response::Read(_) => Opcode::Read,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Response::ReadDir(resp) => resp.status,
            Response::GetAttr(resp) => resp.status,
            Response::Open(resp) => resp.status,
            Response::Read(resp) => resp.status,
        }
    }

    /// Encode as a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Response::ReadDir(resp) => resp.as_ssz_bytes(),
            Response::GetAttr(resp) => resp.as_ssz_bytes(),
            Response::Open(resp) => resp.as_ssz_bytes(),
            Response::Read(resp) => resp.as_ssz_bytes(),
        };
        encode_frame(self.opcode(), &payload)
    }

    /// Decode a complete frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (header, payload) = split_frame(bytes)?;
        Self::decode_payload(header.opcode, payload)
    }

    /// Decode a payload whose header has already been consumed.
    ///
    /// Besides SSZ decoding this checks the declared lengths inside the
    /// payload: a directory `count` or a READ `bytes_returned` that disagree
    /// with the decoded data is a [`ProtocolError::LengthMismatch`].
    pub fn decode_payload(opcode: Opcode, payload: &[u8]) -> Result<Self, ProtocolError> {
        match opcode {
            Opcode::ReadDir => {
                let resp: DirResponse = decode_ssz(payload)?;
                if resp.count as usize != resp.entries.len() {
                    return Err(ProtocolError::LengthMismatch {
                        declared: u64::from(resp.count),
                        actual: resp.entries.len() as u64,
                    });
                }
                Ok(Response::ReadDir(resp))
            }
            Opcode::GetAttr => Ok(Response::GetAttr(decode_ssz(payload)?)),
            Opcode::Open => Ok(Response::Open(decode_ssz(payload)?)),
            Opcode::Read => {
                let resp: ReadResponse = decode_ssz(payload)?;
                if resp.bytes_returned != resp.data.len() as u64 {
                    return Err(ProtocolError::LengthMismatch {
                        declared: resp.bytes_returned,
                        actual: resp.data.len() as u64,
                    });
                }
                Ok(Response::Read(resp))
            }
        }
    }
}

fn decode_ssz<T: Decode>(payload: &[u8]) -> Result<T, ProtocolError> {
    T::from_ssz_bytes(payload).map_err(ProtocolError::from_ssz)
}
