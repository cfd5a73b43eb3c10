use {
    nfs4::vfs::{FileType, Stat, Time},
    std::{fs::Metadata, os::unix::prelude::*},
};

pub fn file_type_from(ft: std::fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_block_device() {
        FileType::BlockDevice
    } else if ft.is_char_device() {
        FileType::CharDevice
    } else if ft.is_fifo() {
        FileType::Fifo
    } else if ft.is_socket() {
        FileType::Socket
    } else {
        FileType::Regular
    }
}

pub fn stat_from_attr(attr: &Metadata) -> Stat {
    Stat {
        typ: file_type_from(attr.file_type()),
        mode: attr.mode() & 0o7777,
        uid: attr.uid(),
        gid: attr.gid(),
        nlink: attr.nlink(),
        ino: attr.ino(),
        size: attr.size(),
        atime: Time {
            sec: attr.atime(),
            nsec: attr.atime_nsec() as u32,
        },
        mtime: Time {
            sec: attr.mtime(),
            nsec: attr.mtime_nsec() as u32,
        },
        ctime: Time {
            sec: attr.ctime(),
            nsec: attr.ctime_nsec() as u32,
        },
    }
}

/// Parse an octal permission string such as `644` or `0o640`
pub fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8)
        .map(|mode| mode & 0o7777)
        .map_err(|e| format!("invalid mode {:?}: {}", s, e))
}
