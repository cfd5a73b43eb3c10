//! NFSv4 error representations.
//!
//! In the NFSv4 protocol every failed operation carries a single `nfsstat4`
//! status code. Operations in this crate return [`Error`]; the dispatch layer
//! converts it with [`Error::status`].

use std::{fmt, io};

use crate::proto::NfsStat4;

/// The error type used by this crate
#[derive(Debug)]
pub enum Error {
    /// Protocol failure with the status sent to the client and a message for the log
    Nfs(NfsStat4, String),
    /// Storage backend fault: the name already exists
    Exist(String),
    /// Storage backend fault: no such entry
    NoEnt(String),
    /// Any other I/O failure of the storage backend
    Io(io::Error),
}

impl Error {
    /// Get the status code to be sent to the client
    pub fn status(&self) -> NfsStat4 {
        match *self {
            Error::Nfs(status, _) => status,
            Error::Exist(_) => NfsStat4::Nfs4errExist,
            Error::NoEnt(_) => NfsStat4::Nfs4errNoent,
            Error::Io(ref e) => status_from_io(e),
        }
    }
}

fn status_from_io(e: &io::Error) -> NfsStat4 {
    use std::io::ErrorKind::*;

    match e.kind() {
        NotFound => NfsStat4::Nfs4errNoent,
        PermissionDenied => NfsStat4::Nfs4errAccess,
        AlreadyExists => NfsStat4::Nfs4errExist,
        InvalidInput => NfsStat4::Nfs4errInval,
        NotADirectory => NfsStat4::Nfs4errNotdir,
        IsADirectory => NfsStat4::Nfs4errIsdir,
        ReadOnlyFilesystem => NfsStat4::Nfs4errRofs,
        StorageFull => NfsStat4::Nfs4errNospc,
        FileTooLarge => NfsStat4::Nfs4errFbig,
        _ => NfsStat4::Nfs4errIo,
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Nfs(status, ref msg) if msg.is_empty() => write!(f, "{}", status),
            Error::Nfs(status, ref msg) => write!(f, "{}: {}", status, msg),
            Error::Exist(ref name) => write!(f, "file exists: {}", name),
            Error::NoEnt(ref name) => write!(f, "no such file or directory: {}", name),
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::AlreadyExists => Error::Exist(e.to_string()),
            io::ErrorKind::NotFound => Error::NoEnt(e.to_string()),
            _ => Error::Io(e),
        }
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(errno: nix::errno::Errno) -> Self {
        match errno {
            nix::errno::Errno::EEXIST => Error::Exist(errno.desc().to_owned()),
            nix::errno::Errno::ENOENT => Error::NoEnt(errno.desc().to_owned()),
            _ => Error::Io(io::Error::from(errno)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_faults_from_io() {
        let e: Error = io::Error::from(io::ErrorKind::AlreadyExists).into();
        assert!(matches!(e, Error::Exist(_)));
        assert_eq!(e.status(), NfsStat4::Nfs4errExist);

        let e: Error = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(e, Error::NoEnt(_)));

        let e: Error = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert_eq!(e.status(), NfsStat4::Nfs4errAccess);
    }

    #[test]
    fn storage_faults_from_errno() {
        let e: Error = nix::errno::Errno::EEXIST.into();
        assert_eq!(e.status(), NfsStat4::Nfs4errExist);

        let e: Error = nix::errno::Errno::ENOENT.into();
        assert_eq!(e.status(), NfsStat4::Nfs4errNoent);

        let e: Error = nix::errno::Errno::EIO.into();
        assert_eq!(e.status(), NfsStat4::Nfs4errIo);
    }

    #[test]
    fn protocol_errors_keep_status() {
        let e = crate::nfs_err!(Nfs4errGrace, "client {} must reclaim", 42);
        assert_eq!(e.status(), NfsStat4::Nfs4errGrace);
        assert_eq!(e.to_string(), "Nfs4errGrace(10013): client 42 must reclaim");
    }
}
