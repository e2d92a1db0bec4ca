// FILE: src/virtual_fs.rs
//! VirtualFs: every filesystem operation, answered by path.
//!
//! Reads go straight to the real file on each call; nothing is cached.
//! Mutations all end in `reject`, the remaining housekeeping callbacks in
//! `acknowledge`.

use crate::config::{Config, RootListing};
use crate::core::taxonomy::Taxonomy;
use crate::core::vpath::{PathResolver, Resolved};
use crate::error::FsError;
use crate::state::Catalog;
use std::ffi::CString;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

const DIR_PERMS: u16 = 0o555;
const DIR_NLINK: u32 = 2;
const FILE_PERMS: u16 = 0o444;
const FILE_NLINK: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: NodeKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

impl DirEntry {
    fn dir(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: NodeKind::Directory }
    }

    fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: NodeKind::File }
    }
}

/// Operations that would change the namespace or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Mknod,
    Mkdir,
    Unlink,
    Rmdir,
    Symlink,
    Rename,
    Link,
    SetAttr,
    Write,
    Fallocate,
    CopyFileRange,
    SetXattr,
    RemoveXattr,
}

/// Callbacks with no state to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledge {
    Flush,
    Release,
    ReleaseDir,
    Fsync,
    FsyncDir,
    Access,
    Lock,
    Ioctl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

pub struct VirtualFs {
    catalog: Arc<Catalog>,
    root_listing: RootListing,
    passthrough: bool,
    /// Timestamp reported for every virtual directory.
    mounted_at: SystemTime,
}

impl VirtualFs {
    pub fn new(catalog: Arc<Catalog>, config: &Config) -> Self {
        Self {
            catalog,
            root_listing: config.root_listing,
            passthrough: config.passthrough,
            mounted_at: SystemTime::now(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn resolve(&self, path: &str) -> Result<Resolved<'_>, FsError> {
        PathResolver::new(&self.catalog, self.passthrough)
            .resolve(path)
            .ok_or(FsError::NotFound)
    }

    pub fn getattr(&self, path: &str) -> Result<Attr, FsError> {
        match self.resolve(path)? {
            Resolved::File { real } => {
                let meta = std::fs::metadata(&real).map_err(|e| {
                    tracing::error!("[VirtualFs] Cannot stat {} behind {}: {}", real.display(), path, e);
                    FsError::Io
                })?;
                Ok(Attr {
                    kind: NodeKind::File,
                    size: meta.len(),
                    perm: FILE_PERMS,
                    nlink: FILE_NLINK,
                    atime: meta.accessed().unwrap_or(self.mounted_at),
                    mtime: meta.modified().unwrap_or(self.mounted_at),
                })
            }
            _ => Ok(Attr {
                kind: NodeKind::Directory,
                size: 0,
                perm: DIR_PERMS,
                nlink: DIR_NLINK,
                atime: self.mounted_at,
                mtime: self.mounted_at,
            }),
        }
    }

    /// Lists a directory, "." and ".." first.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let mut entries = vec![DirEntry::dir("."), DirEntry::dir("..")];

        match self.resolve(path)? {
            Resolved::Root => match self.root_listing {
                RootListing::Flattened => {
                    for taxonomy in Taxonomy::ALL {
                        entries.extend(
                            self.catalog
                                .index(taxonomy)
                                .keys()
                                .map(|key| DirEntry::dir(format!("{}/{}", taxonomy, key))),
                        );
                    }
                }
                RootListing::Taxonomies => {
                    entries.extend(Taxonomy::ALL.iter().map(|t| DirEntry::dir(t.segment())));
                }
            },
            Resolved::Taxonomy(taxonomy) => {
                entries.extend(self.catalog.index(taxonomy).keys().map(DirEntry::dir));
            }
            Resolved::Group { group, .. } => {
                entries.extend(group.names().map(DirEntry::file));
            }
            Resolved::File { .. } => return Err(FsError::NotDirectory),
        }

        Ok(entries)
    }

    pub fn opendir(&self, path: &str) -> Result<(), FsError> {
        if self.resolve(path)?.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotDirectory)
        }
    }

    /// Opening only ever grants read access.
    pub fn open(&self, path: &str, flags: i32) -> Result<(), FsError> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & (libc::O_TRUNC | libc::O_CREAT) != 0 {
            return Err(self.reject(Mutation::Write, path));
        }
        match self.resolve(path)? {
            Resolved::File { .. } => Ok(()),
            _ => Err(FsError::IsDirectory),
        }
    }

    /// Reads up to `size` bytes at `offset`; empty at or past end of file.
    pub fn read(&self, path: &str, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        let real = match self.resolve(path)? {
            Resolved::File { real } => real,
            _ => return Err(FsError::IsDirectory),
        };
        read_range(&real, offset, size).map_err(|e| {
            tracing::error!("[VirtualFs] Read of {} (via {}) failed: {}", real.display(), path, e);
            FsError::Io
        })
    }

    /// The single answer to every mutation, whatever the path.
    pub fn reject(&self, op: Mutation, path: &str) -> FsError {
        tracing::debug!("[VirtualFs] Rejected {:?} on {}", op, path);
        FsError::ReadOnly
    }

    pub fn acknowledge(&self, op: Acknowledge, path: &str) -> Result<(), FsError> {
        tracing::trace!("[VirtualFs] {:?} on {}", op, path);
        Ok(())
    }

    pub fn getxattr(&self, path: &str, name: &str) -> Result<Vec<u8>, FsError> {
        self.resolve(path)?;
        tracing::trace!("[VirtualFs] No attribute {} on {}", name, path);
        Err(FsError::NoAttribute)
    }

    /// Attribute names, NUL-separated. Always empty.
    pub fn listxattr(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.resolve(path)?;
        Ok(Vec::new())
    }

    /// Statistics of the file system holding the source root.
    pub fn statfs(&self) -> Result<FsStats, FsError> {
        let root = self.catalog.source_root();
        let c_path = CString::new(root.as_os_str().as_bytes()).map_err(|_| FsError::Io)?;

        // SAFETY: c_path is NUL-terminated and `stat` is a plain C struct.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            tracing::error!("[VirtualFs] statvfs on {} failed: {}", root.display(), err);
            return Err(FsError::Io);
        }

        Ok(FsStats {
            blocks: stat.f_blocks as u64,
            bfree: stat.f_bfree as u64,
            bavail: stat.f_bavail as u64,
            files: stat.f_files as u64,
            ffree: stat.f_ffree as u64,
            bsize: stat.f_bsize as u32,
            namelen: stat.f_namemax as u32,
            frsize: stat.f_frsize as u32,
        })
    }
}

fn read_range(real: &Path, offset: u64, size: u32) -> std::io::Result<Vec<u8>> {
    let file = File::open(real)?;
    let len = file.metadata()?.len();
    if offset >= len {
        return Ok(Vec::new());
    }

    let wanted = (len - offset).min(u64::from(size)) as usize;
    let mut buffer = vec![0u8; wanted];
    let mut filled = 0;
    while filled < wanted {
        match file.read_at(&mut buffer[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buffer.truncate(filled);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::KeyValueExtractor;
    use crate::librarian::Librarian;
    use std::collections::BTreeSet;
    use std::fs;

    const TAGGED: &str = "artist=Artist A\ngenre=Rock\ndate=1999-05-01\n";
    const UNTAGGED: &str = "no tags in here\n";

    struct Fixture {
        dir: tempfile::TempDir,
        fs: VirtualFs,
    }

    fn mount_with(files: &[(&str, &str)], config: Config) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let catalog = Librarian::new(&config, &KeyValueExtractor).scan(dir.path()).unwrap();
        let fs = VirtualFs::new(Arc::new(catalog), &config);
        Fixture { dir, fs }
    }

    fn mount(files: &[(&str, &str)]) -> Fixture {
        mount_with(files, Config::default())
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_root_listing_is_union_of_groups() {
        let fx = mount(&[("tagged.mp3", TAGGED), ("untagged.mp3", UNTAGGED)]);
        let entries = fx.fs.readdir("/").unwrap();

        assert_eq!(&names(&entries)[..2], &[".", ".."]);
        let listed: BTreeSet<&str> = names(&entries)[2..].iter().copied().collect();
        let expected: BTreeSet<&str> = [
            "Artist/Artist A",
            "Artist/no artist",
            "Genre/Rock",
            "Genre/no genre",
            "Year/1999",
            "Year/no date",
        ]
        .into_iter()
        .collect();
        assert_eq!(listed, expected);
        assert_eq!(entries.len(), 2 + expected.len());
        assert!(entries.iter().all(|e| e.kind == NodeKind::Directory));
    }

    #[test]
    fn test_reads_resolve_to_the_right_files() {
        let fx = mount(&[("tagged.mp3", TAGGED), ("untagged.mp3", UNTAGGED)]);
        assert_eq!(fx.fs.read("/Year/1999/tagged.mp3", 0, 4096).unwrap(), TAGGED.as_bytes());
        assert_eq!(fx.fs.read("/Year/no date/untagged.mp3", 0, 4096).unwrap(), UNTAGGED.as_bytes());
        assert_eq!(fx.fs.read("/Year/1999/untagged.mp3", 0, 4096), Err(FsError::NotFound));
    }

    #[test]
    fn test_group_listing_and_byte_identical_reads() {
        let fx = mount(&[
            ("a/one.mp3", "artist=Band\nbody=1"),
            ("b/two.mp3", "artist=Band\nbody=2"),
            ("c/three.mp3", "artist=Other"),
        ]);
        let entries = fx.fs.readdir("/Artist/Band").unwrap();
        assert_eq!(names(&entries), vec![".", "..", "one.mp3", "two.mp3"]);
        assert_eq!(entries[2].kind, NodeKind::File);

        for (name, rel) in [("one.mp3", "a/one.mp3"), ("two.mp3", "b/two.mp3")] {
            let virtual_bytes = fx.fs.read(&format!("/Artist/Band/{}", name), 0, u32::MAX).unwrap();
            assert_eq!(virtual_bytes, fs::read(fx.dir.path().join(rel)).unwrap());
        }
    }

    #[test]
    fn test_duplicate_names_listed_and_readable() {
        let fx = mount(&[("x/song.mp3", "genre=Pop\nfrom=x"), ("y/song.mp3", "genre=Pop\nfrom=y")]);
        let entries = fx.fs.readdir("/Genre/Pop").unwrap();
        assert_eq!(names(&entries), vec![".", "..", "song (1).mp3", "song.mp3"]);
        assert_eq!(fx.fs.read("/Genre/Pop/song.mp3", 0, 100).unwrap(), b"genre=Pop\nfrom=x");
        assert_eq!(fx.fs.read("/Genre/Pop/song (1).mp3", 0, 100).unwrap(), b"genre=Pop\nfrom=y");
    }

    #[test]
    fn test_read_length_arithmetic() {
        let fx = mount(&[("n.mp3", "0123456789")]);
        let path = "/Artist/no artist/n.mp3";
        assert_eq!(fx.fs.read(path, 0, 4).unwrap(), b"0123");
        assert_eq!(fx.fs.read(path, 3, 4).unwrap(), b"3456");
        assert_eq!(fx.fs.read(path, 8, 10).unwrap(), b"89");
        assert_eq!(fx.fs.read(path, 0, 0).unwrap(), b"");
        assert!(fx.fs.read(path, 10, 5).unwrap().is_empty());
        assert!(fx.fs.read(path, 500, 5).unwrap().is_empty());
    }

    #[test]
    fn test_getattr() {
        let fx = mount(&[("n.mp3", "0123456789")]);

        for dir in ["/", "/Artist", "/Genre/no genre"] {
            let attr = fx.fs.getattr(dir).unwrap();
            assert_eq!(attr.kind, NodeKind::Directory, "{}", dir);
            assert_eq!(attr.perm, DIR_PERMS);
            assert_eq!(attr.nlink, DIR_NLINK);
        }

        let attr = fx.fs.getattr("/Year/no date/n.mp3").unwrap();
        assert_eq!(attr.kind, NodeKind::File);
        assert_eq!(attr.size, 10);
        assert_eq!(attr.nlink, FILE_NLINK);

        assert_eq!(fx.fs.getattr("/Genre/Rock"), Err(FsError::NotFound));
        assert_eq!(fx.fs.getattr("/nothing/here.mp3"), Err(FsError::NotFound));
    }

    #[test]
    fn test_taxonomy_directory_lists_keys() {
        let fx = mount(&[("a.mp3", "genre=Rock"), ("b.mp3", "genre=Jazz")]);
        let entries = fx.fs.readdir("/Genre").unwrap();
        assert_eq!(names(&entries), vec![".", "..", "Jazz", "Rock"]);
    }

    #[test]
    fn test_taxonomies_root_listing() {
        let config = Config { root_listing: RootListing::Taxonomies, ..Config::default() };
        let fx = mount_with(&[("a.mp3", TAGGED)], config);
        assert_eq!(names(&fx.fs.readdir("/").unwrap()), vec![".", "..", "Artist", "Genre", "Year"]);
    }

    #[test]
    fn test_readdir_on_file_and_missing() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        assert_eq!(fx.fs.readdir("/Artist/Artist A/a.mp3"), Err(FsError::NotDirectory));
        assert_eq!(fx.fs.readdir("/Artist/Nobody"), Err(FsError::NotFound));
        assert_eq!(fx.fs.opendir("/Artist/Artist A"), Ok(()));
        assert_eq!(fx.fs.opendir("/Artist/Artist A/a.mp3"), Err(FsError::NotDirectory));
    }

    #[test]
    fn test_failed_extraction_hidden_but_passthrough_readable() {
        let fx = mount(&[("good.mp3", TAGGED), ("sub/broken.mp3", "!corrupt bytes")]);

        let root = fx.fs.readdir("/").unwrap();
        for taxonomy in Taxonomy::ALL {
            for key in fx.fs.catalog().index(taxonomy).keys() {
                let listing = fx.fs.readdir(&format!("/{}/{}", taxonomy, key)).unwrap();
                assert!(!names(&listing).contains(&"broken.mp3"));
            }
        }
        assert!(!names(&root).iter().any(|n| n.ends_with("no artist")));

        assert_eq!(fx.fs.read("/sub/broken.mp3", 0, 100).unwrap(), b"!corrupt bytes");
        assert_eq!(fx.fs.getattr("/sub/broken.mp3").unwrap().kind, NodeKind::File);
    }

    #[test]
    fn test_non_utf8_file_served_under_lossy_name() {
        use std::os::unix::ffi::OsStrExt;
        let dir = tempfile::tempdir().unwrap();
        let raw = std::ffi::OsStr::from_bytes(b"caf\xe9.mp3");
        fs::write(dir.path().join(raw), "genre=Chanson").unwrap();
        let config = Config::default();
        let catalog = Librarian::new(&config, &KeyValueExtractor).scan(dir.path()).unwrap();
        let vfs = VirtualFs::new(Arc::new(catalog), &config);

        let listing = vfs.readdir("/Genre/Chanson").unwrap();
        assert_eq!(names(&listing), vec![".", "..", "caf\u{FFFD}.mp3"]);
        assert_eq!(vfs.read("/Genre/Chanson/caf\u{FFFD}.mp3", 0, 100).unwrap(), b"genre=Chanson");
    }

    #[test]
    fn test_passthrough_disabled_hides_real_paths() {
        let config = Config { passthrough: false, ..Config::default() };
        let fx = mount_with(&[("a.mp3", TAGGED)], config);
        assert_eq!(fx.fs.read("/a.mp3", 0, 10), Err(FsError::NotFound));
        assert!(fx.fs.read("/Artist/Artist A/a.mp3", 0, 10).is_ok());
    }

    #[test]
    fn test_every_mutation_is_rejected_and_nothing_changes() {
        const ALL: [Mutation; 14] = [
            Mutation::Create,
            Mutation::Mknod,
            Mutation::Mkdir,
            Mutation::Unlink,
            Mutation::Rmdir,
            Mutation::Symlink,
            Mutation::Rename,
            Mutation::Link,
            Mutation::SetAttr,
            Mutation::Write,
            Mutation::Fallocate,
            Mutation::CopyFileRange,
            Mutation::SetXattr,
            Mutation::RemoveXattr,
        ];
        let fx = mount(&[("a.mp3", TAGGED)]);
        let before = fx.fs.catalog().clone();

        for op in ALL {
            for path in ["/", "/Artist/Artist A", "/Artist/Artist A/a.mp3", "/a.mp3", "/does/not/exist"] {
                assert_eq!(fx.fs.reject(op, path), FsError::ReadOnly);
            }
        }

        assert_eq!(fx.fs.catalog(), &before);
        assert_eq!(fs::read_to_string(fx.dir.path().join("a.mp3")).unwrap(), TAGGED);
    }

    #[test]
    fn test_open_is_read_only() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        let path = "/Artist/Artist A/a.mp3";
        assert_eq!(fx.fs.open(path, libc::O_RDONLY), Ok(()));
        assert_eq!(fx.fs.open(path, libc::O_WRONLY), Err(FsError::ReadOnly));
        assert_eq!(fx.fs.open(path, libc::O_RDWR), Err(FsError::ReadOnly));
        assert_eq!(fx.fs.open(path, libc::O_RDONLY | libc::O_TRUNC), Err(FsError::ReadOnly));
        assert_eq!(fx.fs.open("/Artist/Artist A", libc::O_RDONLY), Err(FsError::IsDirectory));
        assert_eq!(fx.fs.open("/Artist/Artist A/b.mp3", libc::O_RDONLY), Err(FsError::NotFound));
    }

    #[test]
    fn test_acknowledged_callbacks_succeed() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        for op in [Acknowledge::Flush, Acknowledge::Release, Acknowledge::Fsync, Acknowledge::Lock, Acknowledge::Ioctl] {
            assert_eq!(fx.fs.acknowledge(op, "/Artist/Artist A/a.mp3"), Ok(()));
        }
    }

    #[test]
    fn test_vanished_file_is_io_error() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        fs::remove_file(fx.dir.path().join("a.mp3")).unwrap();
        assert_eq!(fx.fs.read("/Artist/Artist A/a.mp3", 0, 10), Err(FsError::Io));
        assert_eq!(fx.fs.getattr("/Artist/Artist A/a.mp3"), Err(FsError::Io));
    }

    #[test]
    fn test_xattrs() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        assert_eq!(fx.fs.getxattr("/Artist/Artist A/a.mp3", "user.x"), Err(FsError::NoAttribute));
        assert_eq!(fx.fs.getxattr("/missing", "user.x"), Err(FsError::NotFound));
        assert_eq!(fx.fs.listxattr("/Artist"), Ok(Vec::new()));
    }

    #[test]
    fn test_statfs_reports_source_filesystem() {
        let fx = mount(&[("a.mp3", TAGGED)]);
        let stats = fx.fs.statfs().unwrap();
        assert!(stats.bsize > 0);
        assert!(stats.namelen > 0);
    }
}
