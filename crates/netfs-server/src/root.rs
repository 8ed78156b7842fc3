// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Resolution of request paths against the served root
//!
//! Resolution happens in two steps. The request path is first normalised
//! lexically: empty and `.` components are dropped and `..` pops the previous
//! component, so `..` can never climb above the root. The result is then
//! joined onto the canonical root and canonicalised, and the canonical target
//! must still lie under the root. The second check catches symlinks whose
//! targets leave the served tree.

use netfs_proto::Status;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a request path could not be resolved.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("path escapes the served root")]
    Escape,

    #[error("path does not exist")]
    NotFound,

    #[error("I/O error resolving path: {0}")]
    Io(#[source] io::Error),
}

impl PathError {
    /// Status reported to the client.
    pub fn status(&self) -> Status {
        match self {
            PathError::Escape => Status::Denied,
            PathError::NotFound => Status::NotFound,
            PathError::Io(err) => status_for_io(err),
        }
    }
}

/// Map a local I/O error onto a wire status.
pub fn status_for_io(err: &io::Error) -> Status {
    match err.kind() {
        io::ErrorKind::NotFound => return Status::NotFound,
        io::ErrorKind::PermissionDenied => return Status::Denied,
        _ => {}
    }
    match err.raw_os_error() {
        Some(libc::ENOTDIR) => Status::NotADirectory,
        Some(libc::EISDIR) => Status::IsADirectory,
        Some(libc::ELOOP) | Some(libc::EPERM) => Status::Denied,
        _ => Status::IoFailure,
    }
}

/// The directory a server exports.
#[derive(Clone, Debug)]
pub struct ServedRoot {
    root: PathBuf,
}

impl ServedRoot {
    /// Canonicalise `path` once; every later resolution is checked against it.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let root = fs::canonicalize(path.as_ref())?;
        if !fs::metadata(&root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Normalise a request path into a root-relative path.
    ///
    /// A leading `/` means the served root. Fails with [`PathError::Escape`]
    /// as soon as a `..` would leave the root.
    pub fn normalize(request_path: &[u8]) -> Result<PathBuf, PathError> {
        let mut parts: Vec<&OsStr> = Vec::new();
        for component in request_path.split(|b| *b == b'/') {
            match component {
                b"" | b"." => {}
                b".." => {
                    if parts.pop().is_none() {
                        return Err(PathError::Escape);
                    }
                }
                name => parts.push(OsStr::from_bytes(name)),
            }
        }
        Ok(parts.into_iter().collect())
    }

    /// Resolve a request path to a canonical local path inside the root.
    pub fn resolve(&self, request_path: &[u8]) -> Result<PathBuf, PathError> {
        let relative = Self::normalize(request_path)?;
        if relative.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let canonical = match fs::canonicalize(self.root.join(&relative)) {
            Ok(path) => path,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(PathError::NotFound),
            Err(err) => return Err(PathError::Io(err)),
        };

        if !canonical.starts_with(&self.root) {
            return Err(PathError::Escape);
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn served() -> (TempDir, ServedRoot) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.txt"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello world!\n").unwrap();
        let root = ServedRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn normalize_drops_empty_and_dot_components() {
        assert_eq!(
            ServedRoot::normalize(b"//docs/./a.txt/").unwrap(),
            PathBuf::from("docs/a.txt")
        );
        assert_eq!(ServedRoot::normalize(b"/").unwrap(), PathBuf::new());
        assert_eq!(ServedRoot::normalize(b"").unwrap(), PathBuf::new());
    }

    #[test]
    fn normalize_pops_parent_components_inside_the_root() {
        assert_eq!(
            ServedRoot::normalize(b"/docs/../notes.txt").unwrap(),
            PathBuf::from("notes.txt")
        );
    }

    #[test]
    fn normalize_rejects_climbing_above_the_root() {
        assert!(matches!(ServedRoot::normalize(b"/.."), Err(PathError::Escape)));
        assert!(matches!(
            ServedRoot::normalize(b"/../etc/passwd"),
            Err(PathError::Escape)
        ));
        assert!(matches!(
            ServedRoot::normalize(b"docs/../../x"),
            Err(PathError::Escape)
        ));
    }

    #[test]
    fn resolve_root_and_children() {
        let (_dir, root) = served();
        assert_eq!(root.resolve(b"/").unwrap(), root.path());
        assert_eq!(root.resolve(b"/notes.txt").unwrap(), root.path().join("notes.txt"));
        assert_eq!(root.resolve(b"docs/a.txt").unwrap(), root.path().join("docs/a.txt"));
    }

    #[test]
    fn resolve_missing_path_is_not_found() {
        let (_dir, root) = served();
        let err = root.resolve(b"/missing").unwrap_err();
        assert!(matches!(err, PathError::NotFound));
        assert_eq!(err.status(), Status::NotFound);
    }

    #[test]
    fn resolve_rejects_symlink_leaving_the_root() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"secret").unwrap();

        let (dir, root) = served();
        symlink(outside.path(), dir.path().join("escape")).unwrap();

        let err = root.resolve(b"/escape/secret").unwrap_err();
        assert!(matches!(err, PathError::Escape));
        assert_eq!(err.status(), Status::Denied);
    }

    #[test]
    fn resolve_follows_symlink_inside_the_root() {
        let (dir, root) = served();
        symlink(dir.path().join("docs"), dir.path().join("alias")).unwrap();
        assert_eq!(root.resolve(b"/alias/a.txt").unwrap(), root.path().join("docs/a.txt"));
    }

    #[test]
    fn new_rejects_regular_file() {
        let (dir, _root) = served();
        assert!(ServedRoot::new(dir.path().join("notes.txt")).is_err());
    }

    #[test]
    fn io_errors_map_to_statuses() {
        assert_eq!(
            status_for_io(&io::Error::from(io::ErrorKind::NotFound)),
            Status::NotFound
        );
        assert_eq!(
            status_for_io(&io::Error::from(io::ErrorKind::PermissionDenied)),
            Status::Denied
        );
        assert_eq!(
            status_for_io(&io::Error::from_raw_os_error(libc::ENOTDIR)),
            Status::NotADirectory
        );
        assert_eq!(
            status_for_io(&io::Error::from_raw_os_error(libc::EISDIR)),
            Status::IsADirectory
        );
        assert_eq!(
            status_for_io(&io::Error::from_raw_os_error(libc::EIO)),
            Status::IoFailure
        );
    }
}
