use {
    crate::utils::*,
    async_trait::async_trait,
    filetime::FileTime,
    nfs4::{
        attr::SetTime,
        nfs_err,
        vfs::{self, FileType, Inode, SetAttr, Stat, Subject, VirtualFileSystem},
        *,
    },
    nix::{
        fcntl::{AT_FDCWD, AtFlags, OFlag},
        sys::stat::Mode,
        unistd::{Gid, Uid},
    },
    std::{
        ffi::OsStr,
        os::unix::{ffi::OsStrExt, fs::PermissionsExt},
        path::{Component, Path, PathBuf},
    },
    tokio::fs,
};

/// Exports a host directory.
///
/// A handle is the path of the object relative to the export root, the
/// root itself has the empty handle.
#[derive(Clone, Debug)]
pub struct LocalFs {
    realroot: PathBuf,
}

impl LocalFs {
    pub fn new(realroot: impl Into<PathBuf>) -> LocalFs {
        LocalFs {
            realroot: realroot.into(),
        }
    }

    pub fn root(&self) -> Inode {
        Inode::default()
    }

    fn relpath(inode: &Inode) -> &Path {
        Path::new(OsStr::from_bytes(inode.as_bytes()))
    }

    fn realpath(&self, inode: &Inode) -> Result<PathBuf> {
        let rel = Self::relpath(inode);
        // handles never leave the export
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(nfs_err!(Nfs4errBadhandle, "{:?}", inode));
        }
        Ok(self.realroot.join(rel))
    }

    fn child(parent: &Inode, name: &str) -> Inode {
        Inode::new(Self::relpath(parent).join(name).into_os_string().into_encoded_bytes())
    }

    async fn dir_path(&self, inode: &Inode) -> Result<PathBuf> {
        let path = self.realpath(inode)?;
        if !fs::symlink_metadata(&path).await?.is_dir() {
            return Err(nfs_err!(Nfs4errNotdir, "{:?}", inode));
        }
        Ok(path)
    }
}

fn filetime_of(how: Option<SetTime>, current: FileTime) -> FileTime {
    match how {
        None => current,
        Some(SetTime::ServerTime) => FileTime::now(),
        Some(SetTime::ClientTime(t)) => FileTime::from_unix_time(t.seconds, t.nseconds),
    }
}

#[async_trait]
impl VirtualFileSystem for LocalFs {
    async fn getattr(&self, inode: &Inode) -> Result<Stat> {
        let path = self.realpath(inode)?;
        Ok(stat_from_attr(&fs::symlink_metadata(&path).await?))
    }

    async fn lookup(&self, parent: &Inode, name: &str) -> Result<Inode> {
        let path = self.dir_path(parent).await?.join(name);
        fs::symlink_metadata(&path).await?;
        Ok(Self::child(parent, name))
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
        let path = self.dir_path(parent).await?.join(name);

        match typ {
            FileType::Regular => {
                let oflags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_WRONLY;
                let fd = nix::fcntl::open(&path, oflags, Mode::from_bits_truncate(mode))?;
                drop(fd);
            }
            FileType::Directory => fs::create_dir(&path).await?,
            typ => return Err(nfs_err!(Nfs4errBadtype, "{:?}", typ)),
        }

        // not subject to the umask
        fs::set_permissions(&path, PermissionsExt::from_mode(mode & 0o7777)).await?;
        if nix::unistd::geteuid().is_root() {
            nix::unistd::fchownat(
                AT_FDCWD,
                &path,
                Some(Uid::from_raw(uid)),
                Some(Gid::from_raw(gid)),
                AtFlags::AT_SYMLINK_NOFOLLOW,
            )?;
        }

        Ok(Self::child(parent, name))
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
        let path = self.realpath(inode)?;

        // a link may point out of the export, never act on its target
        let meta = fs::symlink_metadata(&path).await?;
        if meta.file_type().is_symlink() && (attr.mode.is_some() || attr.size.is_some()) {
            return Err(nfs_err!(Nfs4errInval, "mode or size of symlink {:?}", inode));
        }

        if let Some(mode) = attr.mode {
            fs::set_permissions(&path, PermissionsExt::from_mode(mode)).await?;
        }

        if attr.uid.is_some() || attr.gid.is_some() {
            nix::unistd::fchownat(
                AT_FDCWD,
                &path,
                attr.uid.map(Uid::from_raw),
                attr.gid.map(Gid::from_raw),
                AtFlags::AT_SYMLINK_NOFOLLOW,
            )?;
        }

        if let Some(size) = attr.size {
            fs::OpenOptions::new()
                .write(true)
                .create(false)
                .custom_flags(OFlag::O_NOFOLLOW.bits())
                .open(&path)
                .await?
                .set_len(size)
                .await?;
        }

        if attr.atime.is_some() || attr.mtime.is_some() {
            let atime = filetime_of(attr.atime, FileTime::from_last_access_time(&meta));
            let mtime = filetime_of(attr.mtime, FileTime::from_last_modification_time(&meta));

            tokio::task::spawn_blocking(move || {
                filetime::set_symlink_file_times(path, atime, mtime)
            })
            .await
            .map_err(|e| io_err!(Other, e))??;
        }

        Ok(())
    }
}
