//! Storage backend interface consumed by the OPEN core.

use std::fmt;

use async_trait::async_trait;

use crate::{attr::SetTime, proto::AccessMask, utils::Result};

/// Opaque backend handle of a filesystem object
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Inode(pub Vec<u8>);

impl Inode {
    pub fn new(handle: impl Into<Vec<u8>>) -> Inode {
        Inode(handle.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Inode(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Type of a filesystem object
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Time struct
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub sec: i64,
    pub nsec: u32,
}

impl Time {
    /// Milliseconds since the epoch, the unit of OPEN change counters
    pub fn as_millis(&self) -> u64 {
        (self.sec.max(0) as u64)
            .saturating_mul(1000)
            .saturating_add((self.nsec / 1_000_000) as u64)
    }
}

/// File attributes returned by the backend
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stat {
    pub typ: FileType,
    /// Permission bits, without the file type
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
    pub ino: u64,
    pub size: u64,
    pub atime: Time,
    pub mtime: Time,
    pub ctime: Time,
}

/// Attribute changes requested through SETATTR
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
}

impl SetAttr {
    pub fn is_empty(&self) -> bool {
        *self == SetAttr::default()
    }
}

/// Identity of the caller
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subject {
    pub uid: u32,
    pub gid: u32,
    /// Supplementary groups
    pub gids: Vec<u32>,
}

impl Subject {
    pub fn new(uid: u32, gid: u32) -> Subject {
        Subject {
            uid,
            gid,
            gids: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.gids.contains(&gid)
    }
}

/// Storage backend used by the OPEN core.
///
/// Backends report the two faults OPEN cares about with
/// `Error::Exist` (from `create`) and `Error::NoEnt` (from `lookup`).
#[async_trait]
pub trait VirtualFileSystem: Send + Sync {
    /// Get the attributes of `inode`
    async fn getattr(&self, inode: &Inode) -> Result<Stat>;

    /// Resolve `name` in the directory `parent`
    async fn lookup(&self, parent: &Inode, name: &str) -> Result<Inode>;

    /// Create a new object of type `typ` named `name` in `parent`
    async fn create(
        &self,
        parent: &Inode,
        typ: FileType,
        name: &str,
        uid: u32,
        gid: u32,
        mode: u32,
    ) -> Result<Inode>;

    /// Return the subset of `mode` that `subject` is granted on `inode`
    async fn access(&self, subject: &Subject, inode: &Inode, mode: AccessMask)
    -> Result<AccessMask>;

    /// Apply `attr` to `inode`
    async fn setattr(&self, inode: &Inode, attr: &SetAttr) -> Result<()>;
}

/// Evaluate `requested` against POSIX permission bits of `stat`
pub fn unix_access(stat: &Stat, subject: &Subject, requested: AccessMask) -> AccessMask {
    let perm = if subject.is_root() {
        // root may read and write anything, execute needs one x bit
        let x = if stat.mode & 0o111 != 0 || stat.typ == FileType::Directory {
            0o1
        } else {
            0
        };
        0o6 | x
    } else if subject.uid == stat.uid {
        (stat.mode >> 6) & 0o7
    } else if subject.in_group(stat.gid) {
        (stat.mode >> 3) & 0o7
    } else {
        stat.mode & 0o7
    };

    let mut granted = AccessMask::empty();
    if perm & 0o4 != 0 {
        granted |= AccessMask::READ;
    }
    if perm & 0o2 != 0 {
        granted |= AccessMask::MODIFY | AccessMask::EXTEND;
        if stat.typ == FileType::Directory {
            granted |= AccessMask::DELETE;
        }
    }
    if perm & 0o1 != 0 {
        granted |= if stat.typ == FileType::Directory {
            AccessMask::LOOKUP
        } else {
            AccessMask::EXECUTE
        };
    }

    granted & requested
}
