//! File name component filter.

use crate::{nfs_err, proto::NFS4_MAXNAMLEN, utils::Result};

/// Convert a `component4` sent by the client into a file name
pub fn convert(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(nfs_err!(Nfs4errInval, "empty name"));
    }
    if bytes.len() > NFS4_MAXNAMLEN {
        return Err(nfs_err!(Nfs4errNametoolong, "{} bytes", bytes.len()));
    }

    let name = std::str::from_utf8(bytes)
        .map_err(|e| nfs_err!(Nfs4errInval, "name is not UTF-8: {}", e))?;

    if name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(nfs_err!(Nfs4errBadname, "{:?}", name));
    }

    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::NfsStat4;

    fn status(bytes: &[u8]) -> NfsStat4 {
        convert(bytes).unwrap_err().status()
    }

    #[test]
    fn accepts_plain_names() {
        assert_eq!(convert(b"a.txt").unwrap(), "a.txt");
        assert_eq!(convert("grüße".as_bytes()).unwrap(), "grüße");
        assert_eq!(convert(&[b'x'; NFS4_MAXNAMLEN]).unwrap().len(), NFS4_MAXNAMLEN);
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(status(b""), NfsStat4::Nfs4errInval);
        assert_eq!(status(&[0xff, 0xfe]), NfsStat4::Nfs4errInval);
        assert_eq!(status(&[b'x'; NFS4_MAXNAMLEN + 1]), NfsStat4::Nfs4errNametoolong);
        assert_eq!(status(b"."), NfsStat4::Nfs4errBadname);
        assert_eq!(status(b".."), NfsStat4::Nfs4errBadname);
        assert_eq!(status(b"a/b"), NfsStat4::Nfs4errBadname);
        assert_eq!(status(b"a\0b"), NfsStat4::Nfs4errBadname);
    }
}
