// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Frame header, opcode table and blocking frame I/O

use crate::error::{FrameError, ProtocolError};
use std::fmt;
use std::io::{Read, Write};

/// Size of the fixed header: `u64` payload length followed by `u16` opcode.
pub const FRAME_HEADER_LEN: usize = 10;

/// Largest payload a peer may declare. Checked before any allocation.
pub const MAX_FRAME_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Operation carried by a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    ReadDir = 1,
    GetAttr = 2,
    Open = 3,
    Read = 4,
}

impl Opcode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::ReadDir => "read_dir",
            Opcode::GetAttr => "get_attr",
            Opcode::Open => "open",
            Opcode::Read => "read",
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Opcode::ReadDir),
            2 => Ok(Opcode::GetAttr),
            3 => Ok(Opcode::Open),
            4 => Ok(Opcode::Read),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u64,
    pub opcode: Opcode,
}

impl FrameHeader {
    pub fn new(opcode: Opcode, payload_len: u64) -> Self {
        Self {
            payload_len,
            opcode,
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[..8].copy_from_slice(&self.payload_len.to_be_bytes());
        out[8..].copy_from_slice(&self.opcode.as_u16().to_be_bytes());
        out
    }

    /// Parse the first [`FRAME_HEADER_LEN`] bytes of `bytes`.
    ///
    /// Rejects unknown opcodes and payload lengths above
    /// [`MAX_FRAME_PAYLOAD`]; does not look at the payload itself.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                expected: FRAME_HEADER_LEN as u64,
                available: bytes.len() as u64,
            });
        }

        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&bytes[..8]);
        let payload_len = u64::from_be_bytes(len_buf);
        let opcode = Opcode::try_from(u16::from_be_bytes([bytes[8], bytes[9]]))?;

        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::FrameTooLarge {
                length: payload_len,
                max: MAX_FRAME_PAYLOAD,
            });
        }

        Ok(Self {
            payload_len,
            opcode,
        })
    }
}

/// Prefix `payload` with a header for `opcode`.
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(opcode, payload.len() as u64);
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a complete in-memory frame into its header and payload.
///
/// The buffer must hold exactly one frame: fewer bytes than declared is
/// [`ProtocolError::Truncated`], more is [`ProtocolError::LengthMismatch`].
pub fn split_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), ProtocolError> {
    let header = FrameHeader::from_bytes(bytes)?;
    let body = &bytes[FRAME_HEADER_LEN..];
    let available = body.len() as u64;

    if available < header.payload_len {
        return Err(ProtocolError::Truncated {
            expected: header.payload_len,
            available,
        });
    }
    if available > header.payload_len {
        return Err(ProtocolError::LengthMismatch {
            declared: header.payload_len,
            actual: available,
        });
    }

    Ok((header, body))
}

/// Read one frame from a blocking stream.
///
/// A stream that ends before the first header byte yields
/// [`FrameError::Closed`]; one that ends anywhere later yields
/// [`ProtocolError::Truncated`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<(FrameHeader, Vec<u8>), FrameError> {
    let mut header_buf = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header_buf[filled..]) {
            Ok(0) if filled == 0 => return Err(FrameError::Closed),
            Ok(0) => {
                return Err(ProtocolError::Truncated {
                    expected: FRAME_HEADER_LEN as u64,
                    available: filled as u64,
                }
                .into());
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }

    let header = FrameHeader::from_bytes(&header_buf)?;
    let mut payload = Vec::new();
    let read = reader.take(header.payload_len).read_to_end(&mut payload)? as u64;
    if read < header.payload_len {
        return Err(ProtocolError::Truncated {
            expected: header.payload_len,
            available: read,
        }
        .into());
    }

    Ok((header, payload))
}

/// Write one frame to a blocking stream and flush it.
pub fn write_frame<W: Write>(
    writer: &mut W,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), FrameError> {
    writer.write_all(&FrameHeader::new(opcode, payload.len() as u64).to_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}
