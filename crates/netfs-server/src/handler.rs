// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request handling against the served root
//!
//! The handler is synchronous and stateless: every request resolves its path
//! from scratch and nothing is kept between requests. The accept loop runs it
//! on tokio's blocking pool.

use crate::root::{PathError, ServedRoot, status_for_io};
use netfs_proto::{
    AttrResponse, DirEntry, DirResponse, OpenResponse, Opcode, ReadResponse, Request, Response,
    Status, validate_path,
};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Largest READ served in one response unless configured otherwise.
pub const DEFAULT_MAX_READ_LEN: u64 = 16 * 1024 * 1024;

const WRITE_BITS: u32 = 0o222;

/// Number of bytes a READ of `length` at `offset` returns from a file of
/// `size` bytes.
pub fn clamp_read(size: u64, offset: u64, length: u64) -> u64 {
    if offset >= size {
        0
    } else {
        length.min(size - offset)
    }
}

/// An open file and the byte range of it that answers a READ.
#[derive(Debug)]
pub struct FileRange {
    pub file: File,
    pub offset: u64,
    pub len: u64,
}

impl FileRange {
    /// Read the whole range into memory.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let len = usize::try_from(self.len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read range too large"))?;
        let mut data = vec![0u8; len];
        self.file.read_exact_at(&mut data, self.offset)?;
        Ok(data)
    }
}

/// What the server sends back for one request.
#[derive(Debug)]
pub enum Reply {
    /// A response encoded in memory.
    Message(Response),
    /// A successful READ whose data is streamed from the file.
    FileRange(FileRange),
}

impl Reply {
    pub fn opcode(&self) -> Opcode {
        match self {
            Reply::Message(response) => response.opcode(),
            Reply::FileRange(_) => Opcode::Read,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Reply::Message(response) => response.status(),
            Reply::FileRange(_) => Status::Ok,
        }
    }

    /// Materialise the reply as an in-memory response, reading any file
    /// range it refers to.
    pub fn into_response(self) -> io::Result<Response> {
        match self {
            Reply::Message(response) => Ok(response),
            Reply::FileRange(range) => Ok(Response::Read(ReadResponse::new(range.read_to_vec()?))),
        }
    }
}

/// Serves requests from one [`ServedRoot`].
#[derive(Clone, Debug)]
pub struct RequestHandler {
    root: ServedRoot,
    max_read_len: u64,
}

impl RequestHandler {
    pub fn new(root: ServedRoot) -> Self {
        Self {
            root,
            max_read_len: DEFAULT_MAX_READ_LEN,
        }
    }

    /// Cap the bytes returned by a single READ.
    pub fn with_max_read_len(mut self, max_read_len: u64) -> Self {
        self.max_read_len = max_read_len;
        self
    }

    pub fn root(&self) -> &ServedRoot {
        &self.root
    }

    pub fn max_read_len(&self) -> u64 {
        self.max_read_len
    }

    /// Answer one request. Every failure is expressed as a status in the
    /// reply; the version is checked by the caller before this point.
    pub fn handle(&self, request: &Request) -> Reply {
        if let Err(err) = validate_path(request.path()) {
            warn!(
                opcode = %request.opcode(),
                path = %String::from_utf8_lossy(request.path()),
                error = %err,
                "rejecting malformed request path"
            );
            return Reply::Message(Response::failure(request.opcode(), Status::Denied));
        }

        match request {
            Request::GetAttr(req) => Reply::Message(Response::GetAttr(self.get_attr(&req.path))),
            Request::ReadDir(req) => Reply::Message(Response::ReadDir(self.read_dir(&req.path))),
            Request::Open(req) => Reply::Message(Response::Open(self.open(&req.path))),
            Request::Read(req) => self.read(&req.path, req.offset, req.length),
        }
    }

    fn resolve(&self, path: &[u8]) -> Result<PathBuf, PathError> {
        let resolved = self.root.resolve(path);
        if let Err(PathError::Escape) = resolved {
            warn!(path = %String::from_utf8_lossy(path), "path escapes the served root");
        }
        resolved
    }

    fn get_attr(&self, path: &[u8]) -> AttrResponse {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(PathError::NotFound) => return AttrResponse::missing(),
            Err(err) => return AttrResponse::failure(err.status()),
        };

        match fs::metadata(&resolved) {
            Ok(meta) if meta.is_file() || meta.is_dir() => attr_from_metadata(&meta),
            // Other file types are not exported and look absent to clients.
            Ok(_) => AttrResponse::missing(),
            Err(err) => AttrResponse::failure(status_for_io(&err)),
        }
    }

    fn read_dir(&self, path: &[u8]) -> DirResponse {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(err) => return DirResponse::failure(err.status()),
        };

        match fs::metadata(&resolved) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return DirResponse::failure(Status::NotADirectory),
            Err(err) => return DirResponse::failure(status_for_io(&err)),
        }

        let reader = match fs::read_dir(&resolved) {
            Ok(reader) => reader,
            Err(err) => return DirResponse::failure(status_for_io(&err)),
        };

        let mut entries = Vec::new();
        for entry in reader {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(dir = %resolved.display(), error = %err, "directory enumeration failed");
                    return DirResponse::failure(status_for_io(&err));
                }
            };
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!(entry = ?entry.file_name(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !file_type.is_file() && !file_type.is_dir() {
                continue;
            }
            entries.push(DirEntry {
                name: entry.file_name().into_vec(),
                is_directory: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let response = DirResponse::new(entries);
        if !response.fits_in_frame() {
            warn!(dir = %resolved.display(), count = response.count, "listing exceeds frame limit");
            return DirResponse::failure(Status::IoFailure);
        }
        response
    }

    fn open(&self, path: &[u8]) -> OpenResponse {
        let status = match self.open_regular(path) {
            Ok(_) => Status::Ok,
            Err(status) => status,
        };
        OpenResponse { status }
    }

    fn read(&self, path: &[u8], offset: u64, length: u64) -> Reply {
        let (file, meta) = match self.open_regular(path) {
            Ok(opened) => opened,
            Err(status) => return Reply::Message(Response::Read(ReadResponse::failure(status))),
        };

        let len = clamp_read(meta.len(), offset, length.min(self.max_read_len));
        if len == 0 {
            return Reply::Message(Response::Read(ReadResponse::new(Vec::new())));
        }
        Reply::FileRange(FileRange { file, offset, len })
    }

    /// Resolve and open a regular file read-only.
    ///
    /// The type is checked before opening so that a FIFO never blocks the
    /// worker; `O_NOFOLLOW` refuses a final component swapped for a symlink
    /// after resolution.
    fn open_regular(&self, path: &[u8]) -> Result<(File, Metadata), Status> {
        let resolved = self.resolve(path).map_err(|err| err.status())?;

        let meta = fs::metadata(&resolved).map_err(|err| status_for_io(&err))?;
        if meta.is_dir() {
            return Err(Status::IsADirectory);
        }
        if !meta.is_file() {
            return Err(Status::Denied);
        }

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOFOLLOW)
            .open(&resolved)
            .map_err(|err| status_for_io(&err))?;
        let meta = file.metadata().map_err(|err| status_for_io(&err))?;
        if !meta.is_file() {
            return Err(Status::Denied);
        }
        Ok((file, meta))
    }
}

fn attr_from_metadata(meta: &Metadata) -> AttrResponse {
    AttrResponse {
        status: Status::Ok,
        exists: true,
        is_directory: meta.is_dir(),
        size: meta.len(),
        mode: meta.mode() & !WRITE_BITS,
        nlink: u32::try_from(meta.nlink()).unwrap_or(u32::MAX),
        uid: meta.uid(),
        gid: meta.gid(),
        atime_secs: clamp_secs(meta.atime()),
        atime_nsec: clamp_nsec(meta.atime_nsec()),
        mtime_secs: clamp_secs(meta.mtime()),
        mtime_nsec: clamp_nsec(meta.mtime_nsec()),
        ctime_secs: clamp_secs(meta.ctime()),
        ctime_nsec: clamp_nsec(meta.ctime_nsec()),
    }
}

// Pre-epoch timestamps are reported as the epoch.
fn clamp_secs(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

fn clamp_nsec(nsec: i64) -> u32 {
    u32::try_from(nsec).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, RequestHandler) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello world!\n").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/b.txt"), b"bee").unwrap();
        fs::write(dir.path().join("docs/a.txt"), b"ay").unwrap();
        let handler = RequestHandler::new(ServedRoot::new(dir.path()).unwrap());
        (dir, handler)
    }

    fn respond(handler: &RequestHandler, request: Request) -> Response {
        handler.handle(&request).into_response().unwrap()
    }

    #[test]
    fn clamp_read_bounds() {
        assert_eq!(clamp_read(13, 0, 32), 13);
        assert_eq!(clamp_read(13, 13, 10), 0);
        assert_eq!(clamp_read(13, 100, 10), 0);
        assert_eq!(clamp_read(13, 4, 3), 3);
        assert_eq!(clamp_read(13, 10, u64::MAX), 3);
    }

    #[test]
    fn get_attr_reports_file_metadata_without_write_bits() {
        let (_dir, handler) = fixture();
        match respond(&handler, Request::get_attr("/notes.txt")) {
            Response::GetAttr(attr) => {
                assert_eq!(attr.status, Status::Ok);
                assert!(attr.exists);
                assert!(!attr.is_directory);
                assert_eq!(attr.size, 13);
                assert_eq!(attr.mode & WRITE_BITS, 0);
                assert_eq!(attr.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn get_attr_on_root_is_a_directory() {
        let (_dir, handler) = fixture();
        match respond(&handler, Request::get_attr("/")) {
            Response::GetAttr(attr) => {
                assert!(attr.exists);
                assert!(attr.is_directory);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn get_attr_on_missing_path() {
        let (_dir, handler) = fixture();
        match respond(&handler, Request::get_attr("/missing")) {
            Response::GetAttr(attr) => {
                assert_eq!(attr.status, Status::NotFound);
                assert!(!attr.exists);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn read_dir_lists_sorted_entries_without_dot_entries() {
        let (_dir, handler) = fixture();
        match respond(&handler, Request::read_dir("/docs")) {
            Response::ReadDir(dir) => {
                assert_eq!(dir.status, Status::Ok);
                assert_eq!(dir.count, 2);
                let names: Vec<&[u8]> = dir.entries.iter().map(|e| e.name.as_slice()).collect();
                assert_eq!(names, vec![&b"a.txt"[..], &b"b.txt"[..]]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn read_dir_marks_directories_and_skips_symlinks() {
        let (dir, handler) = fixture();
        symlink(dir.path().join("notes.txt"), dir.path().join("link")).unwrap();
        match respond(&handler, Request::read_dir("/")) {
            Response::ReadDir(listing) => {
                let entries: Vec<(String, bool)> = listing
                    .entries
                    .iter()
                    .map(|e| (String::from_utf8_lossy(&e.name).into_owned(), e.is_directory))
                    .collect();
                assert_eq!(
                    entries,
                    vec![("docs".to_string(), true), ("notes.txt".to_string(), false)]
                );
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn read_dir_on_file_is_not_a_directory() {
        let (_dir, handler) = fixture();
        let response = respond(&handler, Request::read_dir("/notes.txt"));
        assert_eq!(response.status(), Status::NotADirectory);
        match response {
            Response::ReadDir(dir) => assert!(dir.entries.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn open_checks_existence_and_type() {
        let (_dir, handler) = fixture();
        assert_eq!(respond(&handler, Request::open("/notes.txt")).status(), Status::Ok);
        assert_eq!(respond(&handler, Request::open("/missing")).status(), Status::NotFound);
        assert_eq!(respond(&handler, Request::open("/docs")).status(), Status::IsADirectory);
    }

    #[test]
    fn read_returns_clamped_file_range() {
        let (_dir, handler) = fixture();
        match handler.handle(&Request::read("/notes.txt", 0, 32)) {
            Reply::FileRange(range) => {
                assert_eq!(range.offset, 0);
                assert_eq!(range.len, 13);
                assert_eq!(range.read_to_vec().unwrap(), b"hello world!\n");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn read_at_end_of_file_returns_no_bytes() {
        let (_dir, handler) = fixture();
        match respond(&handler, Request::read("/notes.txt", 13, 10)) {
            Response::Read(read) => {
                assert_eq!(read.status, Status::Ok);
                assert_eq!(read.bytes_returned, 0);
                assert!(read.data.is_empty());
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn read_respects_max_read_len() {
        let (_dir, handler) = fixture();
        let handler = handler.with_max_read_len(5);
        match respond(&handler, Request::read("/notes.txt", 6, 100)) {
            Response::Read(read) => assert_eq!(read.data, b"world"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn read_of_directory_is_rejected() {
        let (_dir, handler) = fixture();
        assert_eq!(
            respond(&handler, Request::read("/docs", 0, 10)).status(),
            Status::IsADirectory
        );
    }

    #[test]
    fn traversal_is_denied_for_every_operation() {
        let (_dir, handler) = fixture();
        let requests = [
            Request::get_attr("/../etc/passwd"),
            Request::read_dir("/../"),
            Request::open("/docs/../../etc/passwd"),
            Request::read("/../etc/passwd", 0, 4096),
        ];
        for request in requests {
            let response = respond(&handler, request.clone());
            assert_eq!(response.status(), Status::Denied, "request {:?}", request);
            assert_eq!(response.opcode(), request.opcode());
        }
    }

    #[test]
    fn symlink_escape_is_denied() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"secret").unwrap();
        let (dir, handler) = fixture();
        symlink(outside.path().join("secret"), dir.path().join("secret")).unwrap();

        assert_eq!(
            respond(&handler, Request::read("/secret", 0, 64)).status(),
            Status::Denied
        );
        assert_eq!(respond(&handler, Request::get_attr("/secret")).status(), Status::Denied);
    }

    #[test]
    fn nul_byte_in_path_is_denied() {
        let (_dir, handler) = fixture();
        let response = respond(&handler, Request::get_attr(b"/notes\0.txt".to_vec()));
        assert_eq!(response.status(), Status::Denied);
    }
}
