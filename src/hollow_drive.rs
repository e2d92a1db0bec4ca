// FILE: src/hollow_drive.rs
//! Hollow Drive: the FUSE face of the virtual filesystem.
//!
//! fuser speaks inodes; `VirtualFs` speaks paths. `DriveCore` translates
//! between the two through the `InodeStore` and decides every reply as an
//! errno or a value; the `Filesystem` impl only delivers it. Callbacks that
//! touch the disk (lookup, getattr, open, read) run on the tokio blocking
//! pool so a slow disk never stalls the FUSE loop. readdir answers from the
//! catalog and stays on the loop.
//!
//! Names that are not valid UTF-8 are not part of the namespace: lookup
//! answers ENOENT. Catalog entries for such files are listed under their
//! lossy name, which does resolve.

use crate::core::inode_store::{join, InodeStore, INODE_ROOT};
use crate::virtual_fs::{Acknowledge, Attr, Mutation, NodeKind, VirtualFs};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyIoctl, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;

const BLOCK_SIZE: u32 = 4096;

/// A refused mutation, as the adapter saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub op: Mutation,
    pub path: String,
    pub errno: i32,
}

/// One readdir entry, ready for `ReplyDirectory::add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listed {
    pub ino: u64,
    pub offset: i64,
    pub kind: FileType,
    pub name: String,
}

/// The errno every mutation of `path` is answered with.
pub fn mutation_errno(fs: &VirtualFs, op: Mutation, path: &str) -> i32 {
    fs.reject(op, path).errno()
}

pub struct DriveCore {
    fs: VirtualFs,
    inodes: InodeStore,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl DriveCore {
    pub fn new(fs: VirtualFs, ttl: Duration) -> Self {
        // SAFETY: getuid/getgid cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            fs,
            inodes: InodeStore::new(),
            ttl,
            uid,
            gid,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    /// Path for logging, even when the inode is unknown.
    fn describe(&self, ino: u64) -> String {
        self.inodes.path_of(ino).unwrap_or_else(|| format!("<inode {}>", ino))
    }

    fn describe_child(&self, parent: u64, name: &OsStr) -> String {
        join(&self.describe(parent), &name.to_string_lossy())
    }

    fn file_attr(&self, ino: u64, attr: &Attr) -> FileAttr {
        to_file_attr(ino, attr, self.uid, self.gid)
    }

    pub fn lookup(&self, parent: u64, name: &OsStr) -> Result<FileAttr, i32> {
        let name = name.to_str().ok_or(libc::ENOENT)?;
        let path = self.inodes.child_path(parent, name).ok_or(libc::ENOENT)?;
        let attr = self.fs.getattr(&path).map_err(|e| e.errno())?;
        let ino = self.inodes.inode_for(&path);
        Ok(self.file_attr(ino, &attr))
    }

    pub fn getattr(&self, ino: u64) -> Result<FileAttr, i32> {
        let path = self.path_of(ino)?;
        let attr = self.fs.getattr(&path).map_err(|e| e.errno())?;
        Ok(self.file_attr(ino, &attr))
    }

    pub fn opendir(&self, ino: u64) -> Result<(), i32> {
        self.fs.opendir(&self.path_of(ino)?).map_err(|e| e.errno())
    }

    /// Entries from `offset` on; each entry's offset is that of the next one.
    pub fn readdir(&self, ino: u64, offset: i64) -> Result<Vec<Listed>, i32> {
        let path = self.path_of(ino)?;
        let entries = self.fs.readdir(&path).map_err(|e| e.errno())?;

        Ok(entries
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
            .map(|(i, entry)| {
                let child_ino = match entry.name.as_str() {
                    "." => ino,
                    ".." if ino == INODE_ROOT => INODE_ROOT,
                    ".." => self.inodes.inode_for(parent_of(&path)),
                    name => self.inodes.inode_for(&join(&path, name)),
                };
                Listed {
                    ino: child_ino,
                    offset: (i + 1) as i64,
                    kind: file_type(entry.kind),
                    name: entry.name,
                }
            })
            .collect())
    }

    pub fn open(&self, ino: u64, flags: i32) -> Result<(), i32> {
        self.fs.open(&self.path_of(ino)?, flags).map_err(|e| e.errno())
    }

    pub fn read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, i32> {
        let path = self.path_of(ino)?;
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        self.fs.read(&path, offset, size).map_err(|e| e.errno())
    }

    pub fn acknowledge(&self, op: Acknowledge, ino: u64) -> Result<(), i32> {
        self.fs.acknowledge(op, &self.describe(ino)).map_err(|e| e.errno())
    }

    fn refuse(&self, op: Mutation, path: String) -> Refusal {
        let errno = mutation_errno(&self.fs, op, &path);
        Refusal { op, path, errno }
    }

    // --- One refusal per mutating callback. ---

    pub fn setattr(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::SetAttr, self.describe(ino))
    }

    pub fn mknod(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Mknod, self.describe_child(parent, name))
    }

    pub fn mkdir(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Mkdir, self.describe_child(parent, name))
    }

    pub fn unlink(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Unlink, self.describe_child(parent, name))
    }

    pub fn rmdir(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Rmdir, self.describe_child(parent, name))
    }

    pub fn symlink(&self, parent: u64, link_name: &OsStr) -> Refusal {
        self.refuse(Mutation::Symlink, self.describe_child(parent, link_name))
    }

    pub fn rename(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Rename, self.describe_child(parent, name))
    }

    pub fn link(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::Link, self.describe(ino))
    }

    pub fn write(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::Write, self.describe(ino))
    }

    pub fn create(&self, parent: u64, name: &OsStr) -> Refusal {
        self.refuse(Mutation::Create, self.describe_child(parent, name))
    }

    pub fn fallocate(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::Fallocate, self.describe(ino))
    }

    pub fn copy_file_range(&self, ino_out: u64) -> Refusal {
        self.refuse(Mutation::CopyFileRange, self.describe(ino_out))
    }

    pub fn setxattr(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::SetXattr, self.describe(ino))
    }

    pub fn removexattr(&self, ino: u64) -> Refusal {
        self.refuse(Mutation::RemoveXattr, self.describe(ino))
    }
}

pub struct HollowDrive {
    core: Arc<DriveCore>,
    runtime: Handle,
}

impl HollowDrive {
    pub fn new(fs: VirtualFs, runtime: Handle, ttl: Duration) -> Self {
        Self {
            core: Arc::new(DriveCore::new(fs, ttl)),
            runtime,
        }
    }

    /// Runs `job` on the blocking pool.
    fn offload<F>(&self, job: F)
    where
        F: FnOnce(&DriveCore) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        self.runtime.spawn_blocking(move || job(&core));
    }

    fn ack(&self, op: Acknowledge, ino: u64, reply: ReplyEmpty) {
        match self.core.acknowledge(op, ino) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }
}

pub fn to_file_attr(ino: u64, attr: &Attr, uid: u32, gid: u32) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.mtime,
        crtime: attr.mtime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

impl Filesystem for HollowDrive {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> std::result::Result<(), libc::c_int> {
        tracing::info!("[HollowDrive] FUSE initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("[HollowDrive] FUSE session ended ({} inodes handed out)", self.core.inodes.len());
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_os_string();
        self.offload(move |core| match core.lookup(parent, &name) {
            Ok(attr) => reply.entry(&core.ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        });
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        self.offload(move |core| match core.getattr(ino) {
            Ok(attr) => reply.attr(&core.ttl, &attr),
            Err(errno) => reply.error(errno),
        });
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        tracing::debug!("[HollowDrive] readlink on {}: no symlinks here", self.core.describe(ino));
        reply.error(libc::ENOENT);
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.core.opendir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let listed = match self.core.readdir(ino, offset) {
            Ok(listed) => listed,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        for entry in &listed {
            if reply.add(entry.ino, entry.offset, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.ack(Acknowledge::ReleaseDir, ino, reply);
    }

    fn fsyncdir(&mut self, _req: &Request, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.ack(Acknowledge::FsyncDir, ino, reply);
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        self.offload(move |core| match core.open(ino, flags) {
            Ok(()) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        });
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
        self.offload(move |core| match core.read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        });
    }

    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        self.ack(Acknowledge::Flush, ino, reply);
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.ack(Acknowledge::Release, ino, reply);
    }

    fn fsync(&mut self, _req: &Request, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.ack(Acknowledge::Fsync, ino, reply);
    }

    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        self.ack(Acknowledge::Access, ino, reply);
    }

    fn setlk(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        _start: u64,
        _end: u64,
        _typ: i32,
        _pid: u32,
        _sleep: bool,
        reply: ReplyEmpty,
    ) {
        self.ack(Acknowledge::Lock, ino, reply);
    }

    fn ioctl(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: u32,
        _cmd: u32,
        _in_data: &[u8],
        _out_size: u32,
        reply: ReplyIoctl,
    ) {
        match self.core.acknowledge(Acknowledge::Ioctl, ino) {
            Ok(()) => reply.ioctl(0, &[]),
            Err(errno) => reply.error(errno),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.core.fs.statfs() {
            Ok(s) => reply.statfs(s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let path = match self.core.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.fs.getxattr(&path, &name.to_string_lossy()) {
            Ok(value) if size == 0 => reply.size(value.len() as u32),
            Ok(value) if value.len() > size as usize => reply.error(libc::ERANGE),
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.core.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.fs.listxattr(&path) {
            Ok(names) if size == 0 => reply.size(names.len() as u32),
            Ok(names) if names.len() > size as usize => reply.error(libc::ERANGE),
            Ok(names) => reply.data(&names),
            Err(e) => reply.error(e.errno()),
        }
    }

    // --- Everything below would modify the tree and is refused. ---

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(self.core.setattr(ino).errno);
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.core.mknod(parent, name).errno);
    }

    fn mkdir(&mut self, _req: &Request, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        reply.error(self.core.mkdir(parent, name).errno);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.core.unlink(parent, name).errno);
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.core.rmdir(parent, name).errno);
    }

    fn symlink(&mut self, _req: &Request, parent: u64, link_name: &OsStr, _target: &Path, reply: ReplyEntry) {
        reply.error(self.core.symlink(parent, link_name).errno);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.core.rename(parent, name).errno);
    }

    fn link(&mut self, _req: &Request, ino: u64, _newparent: u64, _newname: &OsStr, reply: ReplyEntry) {
        reply.error(self.core.link(ino).errno);
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(self.core.write(ino).errno);
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(self.core.create(parent, name).errno);
    }

    fn fallocate(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _length: i64,
        _mode: i32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.core.fallocate(ino).errno);
    }

    fn copy_file_range(
        &mut self,
        _req: &Request,
        _ino_in: u64,
        _fh_in: u64,
        _offset_in: i64,
        ino_out: u64,
        _fh_out: u64,
        _offset_out: i64,
        _len: u64,
        _flags: u32,
        reply: ReplyWrite,
    ) {
        reply.error(self.core.copy_file_range(ino_out).errno);
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.core.setxattr(ino).errno);
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.core.removexattr(ino).errno);
    }
}
