//! In-memory filesystem backend.
//!
//! Handles are the big-endian inode number. Useful to embed the OPEN core
//! without a real export and to exercise it in tests.

use std::{
    collections::{BTreeMap, HashMap},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    attr::SetTime,
    nfs_err,
    proto::AccessMask,
    utils::Result,
    vfs::{self, FileType, Inode, SetAttr, Stat, Subject, Time, VirtualFileSystem},
};

/// Inode number of the root directory
pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct Node {
    stat: Stat,
    children: BTreeMap<String, u64>,
    target: Option<String>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<u64, Node>,
    next_ino: u64,
}

/// A `VirtualFileSystem` living in memory
#[derive(Debug)]
pub struct MemoryFs {
    tree: RwLock<Tree>,
}

fn now() -> Time {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Time {
        sec: d.as_secs() as i64,
        nsec: d.subsec_nanos(),
    }
}

fn ino_of(inode: &Inode) -> Result<u64> {
    let bytes: [u8; 8] = inode
        .as_bytes()
        .try_into()
        .map_err(|_| nfs_err!(Nfs4errBadhandle, "{:?}", inode))?;
    Ok(u64::from_be_bytes(bytes))
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a filesystem holding an empty root directory owned by root, mode 0755
    pub fn new() -> MemoryFs {
        let t = now();
        let root = Node {
            stat: Stat {
                typ: FileType::Directory,
                mode: 0o755,
                uid: 0,
                gid: 0,
                nlink: 2,
                ino: ROOT_INO,
                size: 0,
                atime: t,
                mtime: t,
                ctime: t,
            },
            children: BTreeMap::new(),
            target: None,
        };

        MemoryFs {
            tree: RwLock::new(Tree {
                nodes: HashMap::from([(ROOT_INO, root)]),
                next_ino: ROOT_INO + 1,
            }),
        }
    }

    /// Handle of the root directory
    pub fn root(&self) -> Inode {
        Inode::new(ROOT_INO.to_be_bytes())
    }

    /// Create a directory
    pub async fn mkdir(
        &self,
        parent: &Inode,
        name: &str,
        uid: u32,
        gid: u32,
        mode: u32,
    ) -> Result<Inode> {
        self.create(parent, FileType::Directory, name, uid, gid, mode)
            .await
    }

    /// Create a symbolic link pointing at `target`
    pub async fn symlink(
        &self,
        parent: &Inode,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> Result<Inode> {
        let inode = self
            .create(parent, FileType::Symlink, name, uid, gid, 0o777)
            .await?;
        let ino = ino_of(&inode)?;

        let mut tree = self.tree.write().await;
        if let Some(node) = tree.nodes.get_mut(&ino) {
            node.stat.size = target.len() as u64;
            node.target = Some(target.to_owned());
        }
        Ok(inode)
    }

    /// Target of a symbolic link
    pub async fn readlink(&self, inode: &Inode) -> Result<String> {
        let ino = ino_of(inode)?;
        let tree = self.tree.read().await;
        tree.nodes
            .get(&ino)
            .and_then(|node| node.target.clone())
            .ok_or_else(|| nfs_err!(Nfs4errInval, "not a symlink"))
    }
}

#[async_trait]
impl VirtualFileSystem for MemoryFs {
    async fn getattr(&self, inode: &Inode) -> Result<Stat> {
        let ino = ino_of(inode)?;
        let tree = self.tree.read().await;
        tree.nodes
            .get(&ino)
            .map(|node| node.stat)
            .ok_or_else(|| nfs_err!(Nfs4errStale, "{:?}", inode))
    }

    async fn lookup(&self, parent: &Inode, name: &str) -> Result<Inode> {
        let ino = ino_of(parent)?;
        let tree = self.tree.read().await;
        let dir = tree
            .nodes
            .get(&ino)
            .ok_or_else(|| nfs_err!(Nfs4errStale, "{:?}", parent))?;
        if dir.stat.typ != FileType::Directory {
            return Err(nfs_err!(Nfs4errNotdir));
        }

        dir.children
            .get(name)
            .map(|ino| Inode::new(ino.to_be_bytes()))
            .ok_or_else(|| crate::error::Error::NoEnt(name.to_owned()))
    }

    async fn create(
        &self,
        parent: &Inode,
        typ: FileType,
        name: &str,
        uid: u32,
        gid: u32,
        mode: u32,
    ) -> Result<Inode> {
        let parent_ino = ino_of(parent)?;
        let mut tree = self.tree.write().await;
        let ino = tree.next_ino;
        let t = now();

        let dir = tree
            .nodes
            .get_mut(&parent_ino)
            .ok_or_else(|| nfs_err!(Nfs4errStale, "{:?}", parent))?;
        if dir.stat.typ != FileType::Directory {
            return Err(nfs_err!(Nfs4errNotdir));
        }
        if dir.children.contains_key(name) {
            return Err(crate::error::Error::Exist(name.to_owned()));
        }

        dir.children.insert(name.to_owned(), ino);
        dir.stat.mtime = t;
        dir.stat.ctime = t;
        if typ == FileType::Directory {
            dir.stat.nlink += 1;
        }

        tree.next_ino += 1;
        tree.nodes.insert(
            ino,
            Node {
                stat: Stat {
                    typ,
                    mode: mode & 0o7777,
                    uid,
                    gid,
                    nlink: if typ == FileType::Directory { 2 } else { 1 },
                    ino,
                    size: 0,
                    atime: t,
                    mtime: t,
                    ctime: t,
                },
                children: BTreeMap::new(),
                target: None,
            },
        );

        Ok(Inode::new(ino.to_be_bytes()))
    }

    async fn access(
        &self,
        subject: &Subject,
        inode: &Inode,
        mode: AccessMask,
    ) -> Result<AccessMask> {
        let stat = self.getattr(inode).await?;
        Ok(vfs::unix_access(&stat, subject, mode))
    }

    async fn setattr(&self, inode: &Inode, attr: &SetAttr) -> Result<()> {
        let ino = ino_of(inode)?;
        let mut tree = self.tree.write().await;
        let node = tree
            .nodes
            .get_mut(&ino)
            .ok_or_else(|| nfs_err!(Nfs4errStale, "{:?}", inode))?;
        let t = now();

        if let Some(mode) = attr.mode {
            node.stat.mode = mode & 0o7777;
        }
        if let Some(uid) = attr.uid {
            node.stat.uid = uid;
        }
        if let Some(gid) = attr.gid {
            node.stat.gid = gid;
        }
        if let Some(size) = attr.size {
            if node.stat.typ != FileType::Regular {
                return Err(nfs_err!(Nfs4errInval, "size of non regular file"));
            }
            node.stat.size = size;
            node.stat.mtime = t;
        }
        let settime = |how: SetTime| match how {
            SetTime::ServerTime => t,
            SetTime::ClientTime(time) => Time {
                sec: time.seconds,
                nsec: time.nseconds,
            },
        };
        if let Some(how) = attr.atime {
            node.stat.atime = settime(how);
        }
        if let Some(how) = attr.mtime {
            node.stat.mtime = settime(how);
        }
        node.stat.ctime = t;

        Ok(())
    }
}
