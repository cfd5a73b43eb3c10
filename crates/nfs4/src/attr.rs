//! Decoding of client supplied attribute sets.
//!
//! Only the attributes a client may reasonably send along with OPEN are
//! understood: size, mode, owner, owner_group and the two settable times.

use std::io::Cursor;

use log::debug;

use crate::{
    nfs_err,
    proto::*,
    utils::Result,
    xdr::Decodable,
};

/// Default permissions of a file created without a mode attribute
pub const DEFAULT_CREATE_MODE: u32 = 0o600;

/// `settime4`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetTime {
    ServerTime,
    ClientTime(NfsTime4),
}

/// Decoded attribute values of a `fattr4`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttrMap {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub owner_group: Option<String>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
}

impl AttrMap {
    /// Decode the values of `fattr` in bitmap order
    pub fn decode(fattr: &FAttr4) -> Result<AttrMap> {
        let mut map = AttrMap::default();
        let mut vals = Cursor::new(&fattr.attr_vals[..]);

        for attr in fattr.attrmask.iter() {
            match attr {
                FATTR4_SIZE => map.size = Some(decode(&mut vals, attr)?),
                FATTR4_MODE => map.mode = Some(decode::<u32>(&mut vals, attr)? & 0o7777),
                FATTR4_OWNER => map.owner = Some(decode(&mut vals, attr)?),
                FATTR4_OWNER_GROUP => map.owner_group = Some(decode(&mut vals, attr)?),
                FATTR4_TIME_ACCESS_SET => map.atime = Some(decode_settime(&mut vals, attr)?),
                FATTR4_TIME_MODIFY_SET => map.mtime = Some(decode_settime(&mut vals, attr)?),
                _ => return Err(nfs_err!(Nfs4errAttrnotsupp, "attribute {} not settable", attr)),
            }
        }

        Ok(map)
    }
}

fn decode<T: Decodable>(vals: &mut Cursor<&[u8]>, attr: u32) -> Result<T> {
    T::decode(vals).map_err(|e| nfs_err!(Nfs4errBadxdr, "attribute {}: {}", attr, e))
}

fn decode_settime(vals: &mut Cursor<&[u8]>, attr: u32) -> Result<SetTime> {
    match decode::<u32>(vals, attr)? {
        SET_TO_SERVER_TIME4 => Ok(SetTime::ServerTime),
        SET_TO_CLIENT_TIME4 => Ok(SetTime::ClientTime(decode(vals, attr)?)),
        how => Err(nfs_err!(Nfs4errBadxdr, "attribute {}: bad time_how4 {}", attr, how)),
    }
}

/// Attributes applied while creating a new file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateAttrs {
    /// Permissions of the new file
    pub mode: u32,
    /// The client asked for a zero length file
    pub truncate: bool,
    /// Attributes taken from the request
    pub applied: Bitmap4,
}

/// Extract the mode and truncate intent of a create request.
///
/// EXCLUSIVE4 carries no attributes: any mode the client wants is set later
/// with SETATTR.
pub fn extract_create_attrs(how: &CreateHow) -> Result<CreateAttrs> {
    let map = match how {
        CreateHow::Unchecked(attrs) | CreateHow::Guarded(attrs) => AttrMap::decode(attrs)?,
        CreateHow::Exclusive(_) => AttrMap::default(),
        CreateHow::Exclusive41 { attrs, .. } => AttrMap::decode(attrs)?,
    };

    let mut applied = Bitmap4::new();

    let mode = match map.mode {
        Some(mode) => {
            applied.set(FATTR4_MODE);
            mode
        }
        None => DEFAULT_CREATE_MODE,
    };

    // a new file is empty, nothing else to do for the size
    let truncate = map.size == Some(0);
    if truncate {
        applied.set(FATTR4_SIZE);
    }

    debug!(
        "create attributes for {:?}: mode: 0{:o}, applied: {:?}",
        how.mode(),
        mode,
        applied
    );

    Ok(CreateAttrs {
        mode,
        truncate,
        applied,
    })
}
