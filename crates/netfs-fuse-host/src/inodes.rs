// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode numbers for mount-relative paths
//!
//! The protocol addresses files by path while the kernel addresses them by
//! inode number. Numbers are handed out by `lookup` and live until the
//! kernel forgets every lookup of them. Paths are stored as bytes with a
//! leading `/`; the root is `/`.

use std::collections::HashMap;

/// Inode number of the mount root, fixed by FUSE.
pub const ROOT_INO: u64 = 1;

/// Reported for listed entries that have not been looked up yet. The
/// kernel only uses directory entry inodes for `d_ino`; it resolves the
/// entry through `lookup` before touching it.
pub const UNKNOWN_INO: u64 = 0xffff_ffff;

#[derive(Debug)]
pub struct InodeTable {
    paths: HashMap<u64, Vec<u8>>,
    inodes: HashMap<Vec<u8>, u64>,
    /// Outstanding kernel lookups per inode.
    lookups: HashMap<u64, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            lookups: HashMap::new(),
            next_inode: ROOT_INO + 1,
        };
        table.paths.insert(ROOT_INO, b"/".to_vec());
        table.inodes.insert(b"/".to_vec(), ROOT_INO);
        table
    }

    pub fn path_of(&self, ino: u64) -> Option<&[u8]> {
        self.paths.get(&ino).map(Vec::as_slice)
    }

    /// Path of `name` inside the directory `parent`.
    pub fn child_path(&self, parent: u64, name: &[u8]) -> Option<Vec<u8>> {
        let parent_path = self.path_of(parent)?;
        let mut path = parent_path.to_vec();
        if !path.ends_with(b"/") {
            path.push(b'/');
        }
        path.extend_from_slice(name);
        Some(path)
    }

    /// Inode of the directory containing `ino`. The root is its own parent.
    pub fn parent_of(&self, ino: u64) -> Option<u64> {
        let path = self.path_of(ino)?;
        match path.iter().rposition(|b| *b == b'/') {
            Some(0) | None => Some(ROOT_INO),
            Some(idx) => self.inodes.get(&path[..idx]).copied(),
        }
    }

    pub fn inode_of(&self, path: &[u8]) -> Option<u64> {
        self.inodes.get(path).copied()
    }

    /// Inode to report for `name` in a listing of `dir`. Never allocates;
    /// `None` when `dir` itself is unknown.
    pub fn listed_inode(&self, dir: u64, name: &[u8]) -> Option<u64> {
        match name {
            b"." => self.path_of(dir).map(|_| dir),
            b".." => self.parent_of(dir),
            _ => {
                let path = self.child_path(dir, name)?;
                Some(self.inode_of(&path).unwrap_or(UNKNOWN_INO))
            }
        }
    }

    fn get_or_alloc(&mut self, path: &[u8]) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.paths.insert(ino, path.to_vec());
        self.inodes.insert(path.to_vec(), ino);
        ino
    }

    /// Inode for a successful kernel lookup; counted until forgotten.
    pub fn lookup(&mut self, path: &[u8]) -> u64 {
        let ino = self.get_or_alloc(path);
        *self.lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Drop `nlookup` kernel references. The inode is released when none
    /// remain; the root is never released.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let remaining = match self.lookups.get_mut(&ino) {
            Some(count) => {
                *count = count.saturating_sub(nlookup);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.lookups.remove(&ino);
            if let Some(path) = self.paths.remove(&ino) {
                self.inodes.remove(&path);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.paths.len()
    }
}
