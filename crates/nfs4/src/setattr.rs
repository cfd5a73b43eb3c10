//! Applying a client supplied attribute set to an existing file.

use log::debug;

use crate::{
    attr::AttrMap,
    context::CompoundContext,
    nfs_err,
    proto::*,
    utils::Result,
    vfs::{Inode, SetAttr},
};

/// Resolve a numeric principal, `"1000"` or `"1000@domain"`
pub fn principal_to_id(principal: &str) -> Result<u32> {
    let id = principal
        .split_once('@')
        .map_or(principal, |(id, _domain)| id);
    id.parse()
        .map_err(|_| nfs_err!(Nfs4errBadowner, "unknown principal {:?}", principal))
}

/// Apply `attrs` to `inode` and return the attributes that were set
pub async fn set_attributes(
    attrs: &FAttr4,
    inode: &Inode,
    ctx: &CompoundContext,
) -> Result<Bitmap4> {
    let map = AttrMap::decode(attrs)?;
    let mut applied = Bitmap4::new();
    let mut setattr = SetAttr::default();

    if let Some(size) = map.size {
        setattr.size = Some(size);
        applied.set(FATTR4_SIZE);
    }
    if let Some(mode) = map.mode {
        setattr.mode = Some(mode);
        applied.set(FATTR4_MODE);
    }
    if let Some(ref owner) = map.owner {
        setattr.uid = Some(principal_to_id(owner)?);
        applied.set(FATTR4_OWNER);
    }
    if let Some(ref group) = map.owner_group {
        setattr.gid = Some(principal_to_id(group)?);
        applied.set(FATTR4_OWNER_GROUP);
    }
    if let Some(atime) = map.atime {
        setattr.atime = Some(atime);
        applied.set(FATTR4_TIME_ACCESS_SET);
    }
    if let Some(mtime) = map.mtime {
        setattr.mtime = Some(mtime);
        applied.set(FATTR4_TIME_MODIFY_SET);
    }

    if !setattr.is_empty() {
        debug!("setattr on {:?}: {:?}", inode, setattr);
        ctx.fs().setattr(inode, &setattr).await?;
    }

    Ok(applied)
}
