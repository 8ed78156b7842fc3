// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! NetFS FUSE adapter implementation
//!
//! Maps FUSE operations to NetFS client calls. Attributes and entries are
//! returned with a zero TTL so that every kernel access reaches the server.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use crate::inodes::{InodeTable, ROOT_INO};
use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, Request,
};
use libc::{EIO, ENAMETOOLONG, ENOENT, EROFS, c_int};
use netfs_client::{FileKind, FileStat, NetFsClient};
use netfs_proto::MAX_NAME_LEN;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// No attribute or entry caching in the kernel.
const TTL: Duration = Duration::ZERO;

const BLOCK_SIZE: u32 = 512;

/// NetFS FUSE filesystem adapter
pub struct NetFsFuse {
    client: NetFsClient,
    inodes: InodeTable,
}

impl NetFsFuse {
    pub fn new(client: NetFsClient) -> Self {
        Self {
            client,
            inodes: InodeTable::new(),
        }
    }

    fn path_of(&self, ino: u64) -> Result<Vec<u8>, c_int> {
        self.inodes.path_of(ino).map(<[u8]>::to_vec).ok_or(ENOENT)
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::File => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
    }
}

fn file_attr(ino: u64, stat: &FileStat) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.ctime,
        kind: file_type(stat.kind),
        perm: stat.perm(),
        nlink: stat.nlink.max(1),
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn wants_write(flags: i32) -> bool {
    let access = flags & libc::O_ACCMODE;
    access == libc::O_WRONLY
        || access == libc::O_RDWR
        || flags & (libc::O_TRUNC | libc::O_APPEND | libc::O_CREAT) != 0
}

impl fuser::Filesystem for NetFsFuse {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        let config = self.client.config();
        info!(server = %config.server, port = config.port, "NetFS FUSE adapter initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("NetFS FUSE adapter destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if name.as_bytes().len() > MAX_NAME_LEN {
            reply.error(ENAMETOOLONG);
            return;
        }
        let path = match self.inodes.child_path(parent, name.as_bytes()) {
            Some(path) => path,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.client.get_attr(&path) {
            Ok(stat) => {
                let ino = self.inodes.lookup(&path);
                reply.entry(&TTL, &file_attr(ino, &stat), 0);
            }
            Err(err) => {
                debug!(path = %String::from_utf8_lossy(&path), error = %err, "lookup failed");
                reply.error(err.errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        match self.client.get_attr(&path) {
            Ok(stat) => reply.attr(&TTL, &file_attr(ino, &stat)),
            Err(err) => {
                debug!(path = %String::from_utf8_lossy(&path), error = %err, "getattr failed");
                reply.error(err.errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        let entries = match self.client.list_dir(&path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %String::from_utf8_lossy(&path), error = %err, "readdir failed");
                reply.error(err.errno());
                return;
            }
        };

        let parent = self.inodes.parent_of(ino).unwrap_or(ROOT_INO);
        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            let entry_ino = match entry.name.as_bytes() {
                b".." => parent,
                name => match self.inodes.listed_inode(ino, name) {
                    Some(entry_ino) => entry_ino,
                    None => {
                        reply.error(EIO);
                        return;
                    }
                },
            };
            // The offset handed back is where the next call resumes.
            if reply.add(entry_ino, (index + 1) as i64, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        if wants_write(flags) {
            reply.error(EROFS);
            return;
        }
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        match self.client.open(&path) {
            // Stateless: READ re-resolves the path, so no handle is kept.
            Ok(()) => reply.opened(0, 0),
            Err(err) => {
                debug!(path = %String::from_utf8_lossy(&path), error = %err, "open failed");
                reply.error(err.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let offset = match u64::try_from(offset) {
            Ok(offset) => offset,
            Err(_) => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        let mut buf = vec![0u8; size as usize];
        match self.client.read(&path, offset, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(err) => {
                warn!(path = %String::from_utf8_lossy(&path), offset, error = %err, "read failed");
                reply.error(err.errno());
            }
        }
    }
}
