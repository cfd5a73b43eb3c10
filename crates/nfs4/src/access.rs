//! Share access enforcement.

use crate::{
    context::CompoundContext,
    nfs_err,
    proto::{AccessMask, ShareAccess},
    utils::Result,
    vfs::Inode,
};

/// Whether the caller is granted every bit of `mask` on `inode`
pub async fn check(ctx: &CompoundContext, inode: &Inode, mask: AccessMask) -> Result<bool> {
    let granted = ctx.fs().access(ctx.subject(), inode, mask).await?;
    Ok(granted.contains(mask))
}

async fn require(ctx: &CompoundContext, inode: &Inode, mask: AccessMask) -> Result<()> {
    if check(ctx, inode, mask).await? {
        Ok(())
    } else {
        Err(nfs_err!(Nfs4errAccess, "{:?} denied on {:?}", mask, inode))
    }
}

/// Enforce the share access of an open by name.
///
/// Each of the READ and WRITE bits is tested on its own, read first.
pub async fn enforce_share_access(
    ctx: &CompoundContext,
    inode: &Inode,
    access: ShareAccess,
) -> Result<()> {
    if access.contains(ShareAccess::READ) {
        require(ctx, inode, AccessMask::READ).await?;
    }
    if access.contains(ShareAccess::WRITE) {
        require(ctx, inode, AccessMask::MODIFY).await?;
    }
    Ok(())
}

/// Enforce the share access of an open by filehandle.
///
/// The value must be exactly READ, WRITE or BOTH for a check to apply.
pub async fn enforce_exact_share_access(
    ctx: &CompoundContext,
    inode: &Inode,
    access: ShareAccess,
) -> Result<()> {
    if access == ShareAccess::READ {
        require(ctx, inode, AccessMask::READ).await?;
    }
    if access == ShareAccess::WRITE || access == ShareAccess::BOTH {
        require(ctx, inode, AccessMask::MODIFY).await?;
    }
    Ok(())
}
