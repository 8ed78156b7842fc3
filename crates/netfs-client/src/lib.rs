// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Blocking client for NetFS servers.
//!
//! [`NetFsClient`] turns mount-layer operations (getattr, readdir, open,
//! read) into single request/response exchanges. Every call opens its own
//! [`Session`], so calls from many threads share nothing but the immutable
//! [`ClientConfig`].

mod config;
mod error;
mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::Session;

use netfs_proto::{AttrResponse, ProtocolError, Request, Response, Status, validate_entry_name};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Type of an exported file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Directory,
}

/// Attributes of a remote file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    /// Full mode including file-type bits. Write bits are always clear.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileStat {
    /// Permission bits only.
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }

    fn from_response(attr: &AttrResponse) -> Self {
        Self {
            kind: if attr.is_directory {
                FileKind::Directory
            } else {
                FileKind::File
            },
            size: attr.size,
            mode: attr.mode,
            nlink: attr.nlink,
            uid: attr.uid,
            gid: attr.gid,
            atime: timestamp(attr.atime_secs, attr.atime_nsec),
            mtime: timestamp(attr.mtime_secs, attr.mtime_nsec),
            ctime: timestamp(attr.ctime_secs, attr.ctime_nsec),
        }
    }
}

fn timestamp(secs: u64, nsec: u32) -> SystemTime {
    UNIX_EPOCH
        .checked_add(Duration::new(secs, nsec.min(999_999_999)))
        .unwrap_or(UNIX_EPOCH)
}

/// One name in a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

impl DirEntry {
    fn directory(name: &str) -> Self {
        Self {
            name: OsString::from(name),
            kind: FileKind::Directory,
        }
    }
}

/// Client for one NetFS server.
#[derive(Clone, Debug)]
pub struct NetFsClient {
    config: ClientConfig,
}

impl NetFsClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Attributes of `path`. A path the server does not have is
    /// `ClientError::Status(Status::NotFound)`.
    pub fn get_attr(&self, path: impl AsRef<[u8]>) -> Result<FileStat, ClientError> {
        match self.call(Request::get_attr(path.as_ref()))? {
            Response::GetAttr(attr) => {
                check(attr.status)?;
                if !attr.exists {
                    return Err(ClientError::Status(Status::NotFound));
                }
                Ok(FileStat::from_response(&attr))
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Full listing of `path`, starting with `.` and `..`.
    ///
    /// Entry names are validated before anything is returned, so a bad
    /// listing yields an error rather than a partial result.
    pub fn list_dir(&self, path: impl AsRef<[u8]>) -> Result<Vec<DirEntry>, ClientError> {
        let listing = match self.call(Request::read_dir(path.as_ref()))? {
            Response::ReadDir(listing) => listing,
            other => return Err(unexpected(&other)),
        };
        check(listing.status)?;

        let mut entries = Vec::with_capacity(listing.entries.len() + 2);
        entries.push(DirEntry::directory("."));
        entries.push(DirEntry::directory(".."));
        for entry in listing.entries {
            validate_entry_name(&entry.name)
                .map_err(|err| ProtocolError::Malformed(err.to_string()))?;
            entries.push(DirEntry {
                name: OsString::from_vec(entry.name),
                kind: if entry.is_directory {
                    FileKind::Directory
                } else {
                    FileKind::File
                },
            });
        }
        Ok(entries)
    }

    /// Feed the listing of `path` to `filler`, `.` and `..` first.
    ///
    /// `filler` returns `true` once its buffer is full, which stops delivery
    /// without error.
    pub fn read_dir<F>(&self, path: impl AsRef<[u8]>, mut filler: F) -> Result<(), ClientError>
    where
        F: FnMut(&OsStr, FileKind) -> bool,
    {
        for entry in self.list_dir(path)? {
            if filler(&entry.name, entry.kind) {
                break;
            }
        }
        Ok(())
    }

    /// Check that `path` is a regular file the server can open.
    pub fn open(&self, path: impl AsRef<[u8]>) -> Result<(), ClientError> {
        match self.call(Request::open(path.as_ref()))? {
            Response::Open(open) => check(open.status),
            other => Err(unexpected(&other)),
        }
    }

    /// Read up to `buf.len()` bytes of `path` starting at `offset`.
    ///
    /// Returns the number of bytes copied into `buf`; `0` means end of file.
    pub fn read(
        &self,
        path: impl AsRef<[u8]>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, ClientError> {
        let request = Request::read(path.as_ref(), offset, buf.len() as u64);
        let read = match self.call(request)? {
            Response::Read(read) => read,
            other => return Err(unexpected(&other)),
        };
        check(read.status)?;

        if read.data.len() > buf.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: buf.len() as u64,
                actual: read.data.len() as u64,
            }
            .into());
        }
        buf[..read.data.len()].copy_from_slice(&read.data);
        Ok(read.data.len())
    }

    fn call(&self, request: Request) -> Result<Response, ClientError> {
        let session = Session::connect(&self.config)?;
        let peer = session.peer();
        let response = session.exchange(&request)?;
        debug!(
            %peer,
            opcode = %request.opcode(),
            path = %OsStr::from_bytes(request.path()).to_string_lossy(),
            status = %response.status(),
            "netfs call"
        );
        Ok(response)
    }
}

fn check(status: Status) -> Result<(), ClientError> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(ClientError::Status(status))
    }
}

// Session::exchange already rejects mismatched opcodes.
fn unexpected(response: &Response) -> ClientError {
    ClientError::Protocol(ProtocolError::Malformed(format!(
        "unexpected {} response",
        response.opcode()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stat_from_attr_response() {
        let attr = AttrResponse {
            status: Status::Ok,
            exists: true,
            is_directory: false,
            size: 13,
            mode: 0o100444,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            atime_secs: 10,
            atime_nsec: 5,
            mtime_secs: 20,
            mtime_nsec: 0,
            ctime_secs: 30,
            ctime_nsec: 0,
        };
        let stat = FileStat::from_response(&attr);
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.size, 13);
        assert_eq!(stat.perm(), 0o444);
        assert_eq!(stat.atime, UNIX_EPOCH + Duration::new(10, 5));
        assert_eq!(stat.mtime, UNIX_EPOCH + Duration::from_secs(20));
    }

    #[test]
    fn out_of_range_nanoseconds_are_clamped() {
        assert_eq!(
            timestamp(1, u32::MAX),
            UNIX_EPOCH + Duration::new(1, 999_999_999)
        );
    }
}
