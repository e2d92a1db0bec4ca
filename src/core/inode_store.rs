// FILE: src/core/inode_store.rs
//! Inode <-> virtual path table for the inode-based FUSE binding.
//!
//! The namespace itself is path-addressed. Inode numbers are handed out on
//! first sight of a path and stay stable for the life of the mount.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const INODE_ROOT: u64 = 1;
const FIRST_DYNAMIC_INODE: u64 = 2;

pub struct InodeStore {
    paths: DashMap<u64, String>,
    inodes: DashMap<String, u64>,
    next_inode: AtomicU64,
}

impl Default for InodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeStore {
    pub fn new() -> Self {
        let store = Self {
            paths: DashMap::new(),
            inodes: DashMap::new(),
            next_inode: AtomicU64::new(FIRST_DYNAMIC_INODE),
        };
        store.paths.insert(INODE_ROOT, "/".to_string());
        store.inodes.insert("/".to_string(), INODE_ROOT);
        store
    }

    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.paths.get(&inode).map(|p| p.value().clone())
    }

    /// Inode for `path`, allocating one if the path is new.
    pub fn inode_for(&self, path: &str) -> u64 {
        if let Some(ino) = self.inodes.get(path) {
            return *ino;
        }

        // The entry guard serializes concurrent allocations for the same path.
        let entry = self.inodes.entry(path.to_string()).or_insert_with(|| {
            let ino = self.next_inode.fetch_add(1, Ordering::Relaxed);
            self.paths.insert(ino, path.to_string());
            ino
        });
        *entry
    }

    /// Path of `name` inside the directory at inode `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let parent_path = self.path_of(parent)?;
        Some(join(&parent_path, name))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_root_is_preallocated() {
        let store = InodeStore::new();
        assert_eq!(store.inode_for("/"), INODE_ROOT);
        assert_eq!(store.path_of(INODE_ROOT).as_deref(), Some("/"));
    }

    #[test]
    fn test_inodes_are_stable() {
        let store = InodeStore::new();
        let a = store.inode_for("/Artist/A");
        let b = store.inode_for("/Artist/B");
        assert_ne!(a, b);
        assert_eq!(store.inode_for("/Artist/A"), a);
        assert_eq!(store.path_of(b).as_deref(), Some("/Artist/B"));
        assert_eq!(store.path_of(9999), None);
    }

    #[test]
    fn test_child_path() {
        let store = InodeStore::new();
        assert_eq!(store.child_path(INODE_ROOT, "Artist").as_deref(), Some("/Artist"));
        let artist = store.inode_for("/Artist");
        assert_eq!(store.child_path(artist, "A").as_deref(), Some("/Artist/A"));
        assert_eq!(store.child_path(424242, "x"), None);
    }

    #[test]
    fn test_concurrent_allocation_agrees() {
        let store = Arc::new(InodeStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || (0..100).map(|i| store.inode_for(&format!("/p{}", i))).collect::<Vec<_>>())
            })
            .collect();
        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(store.len(), 101);
    }
}
