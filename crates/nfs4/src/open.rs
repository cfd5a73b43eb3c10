//! The OPEN operation.
//!
//! [`handle_open`] resolves the client, dispatches on the claim, and on
//! success allocates a fresh open state. Nothing is allocated for a failed
//! OPEN.

use std::sync::Arc;

use log::{Level, debug, log_enabled, warn};

use crate::{
    access, attr,
    context::CompoundContext,
    error::Error,
    name, nfs_err,
    proto::*,
    setattr,
    state::Client,
    utils::{Result, now_millis},
    vfs::{FileType, Inode, Stat},
};

/// Process an OPEN request.
///
/// The two storage faults, an existing or a missing entry, end up as an
/// error result. Every other failure is returned as an [`Error`].
pub async fn handle_open(args: &OpenArgs, ctx: &mut CompoundContext) -> Result<OpenRes> {
    match open(args, ctx).await {
        Ok(resok) => Ok(OpenRes::Ok(resok)),
        Err(Error::Exist(msg)) => {
            debug!("OPEN: {}", msg);
            Ok(OpenRes::Error(NfsStat4::Nfs4errExist))
        }
        Err(Error::NoEnt(msg)) => {
            debug!("OPEN: {}", msg);
            Ok(OpenRes::Error(NfsStat4::Nfs4errNoent))
        }
        Err(e) => Err(e),
    }
}

async fn open(args: &OpenArgs, ctx: &mut CompoundContext) -> Result<OpenResOk> {
    let client = resolve_client(args, ctx).await?;

    let cinfo = match args.claim {
        OpenClaim::Null(ref file) => open_by_name(args, file, &client, ctx).await?,
        OpenClaim::Previous(_) => reclaim(args, &client, ctx).await?,
        OpenClaim::Fh => open_by_fh(args, ctx).await?,
        OpenClaim::DelegateCur { .. }
        | OpenClaim::DelegatePrev(_)
        | OpenClaim::DelegCurFh(_)
        | OpenClaim::DelegPrevFh => {
            warn!("unimplemented open claim: {:?}", args.claim.claim_type());
            return Err(nfs_err!(
                Nfs4errInval,
                "unimplemented open claim: {}",
                args.claim.raw_type()
            ));
        }
        OpenClaim::Unknown(typ) => {
            warn!("bad open claim: {}", typ);
            return Err(nfs_err!(Nfs4errInval, "bad open claim: {}", typ));
        }
    };

    // NFSv4.0 clients have to confirm the open
    let rflags = if ctx.minor_version() > 0 {
        OpenResultFlags::LOCKTYPE_POSIX
    } else {
        OpenResultFlags::LOCKTYPE_POSIX | OpenResultFlags::CONFIRM
    };

    let state = client.create_state(args.seqid).await?;
    debug!("new stateid: {}", state.stateid());

    Ok(OpenResOk {
        stateid: state.stateid(),
        cinfo,
        rflags,
        attrset: Bitmap4(vec![0, 0]),
        delegation: DelegationType::None,
    })
}

async fn resolve_client(args: &OpenArgs, ctx: &CompoundContext) -> Result<Arc<Client>> {
    if ctx.minor_version() > 0 {
        return ctx.session_client();
    }

    let clientid = args.owner.clientid;
    let client = ctx
        .state_handler()
        .client_by_id(clientid)
        .await
        .filter(|client| client.is_confirmed())
        .ok_or_else(|| nfs_err!(Nfs4errStaleClientid, "bad client id: {:016x}", clientid))?;

    client.update_lease_time().await;
    debug!(
        "open request from clientid: {}, owner: {}",
        client,
        String::from_utf8_lossy(&args.owner.owner)
    );
    Ok(client)
}

/// Only regular files can be opened
fn check_file_type(stat: &Stat, minor_version: u32) -> Result<()> {
    match stat.typ {
        FileType::Regular => Ok(()),
        FileType::Directory => Err(nfs_err!(Nfs4errIsdir)),
        typ if minor_version == 0 => Err(nfs_err!(Nfs4errSymlink, "{:?}", typ)),
        typ => Err(nfs_err!(Nfs4errWrongType, "{:?}", typ)),
    }
}

/// CLAIM_NULL: open or create `file` in the directory of the current filehandle
async fn open_by_name(
    args: &OpenArgs,
    file: &[u8],
    client: &Client,
    ctx: &mut CompoundContext,
) -> Result<ChangeInfo> {
    if client.needs_reclaim() && !ctx.state_handler().has_grace_period_expired() {
        return Err(nfs_err!(Nfs4errGrace, "client {} must reclaim first", client));
    }

    let dir = ctx.current_inode()?.clone();
    let dir_stat = ctx.fs().getattr(&dir).await?;
    if dir_stat.typ != FileType::Directory {
        return Err(nfs_err!(Nfs4errNotdir));
    }
    let before = dir_stat.ctime.as_millis();

    let name = name::convert(file)?;
    debug!("regular open for: {}", name);

    let (inode, after) = match args.openhow {
        OpenHow::Create(ref how) => create(how, &dir, &name, before, ctx).await?,
        OpenHow::NoCreate => {
            let inode = ctx.fs().lookup(&dir, &name).await?;
            let stat = ctx.fs().getattr(&inode).await?;

            access::enforce_share_access(ctx, &inode, args.share_access).await?;
            check_file_type(&stat, ctx.minor_version())?;

            // nothing changed, the directory stat is still good
            (inode, before)
        }
    };

    ctx.set_current_inode(inode);

    Ok(ChangeInfo {
        atomic: true,
        before,
        after,
    })
}

/// Create `name`, or open it if it exists and the create mode allows
async fn create(
    how: &CreateHow,
    dir: &Inode,
    name: &str,
    before: u64,
    ctx: &CompoundContext,
) -> Result<(Inode, u64)> {
    let attrs = attr::extract_create_attrs(how)?;
    let subject = ctx.subject();

    debug!("creating a new file: {}, truncate: {}", name, attrs.truncate);
    let err = match ctx
        .fs()
        .create(dir, FileType::Regular, name, subject.uid, subject.gid, attrs.mode)
        .await
    {
        Ok(inode) => return Ok((inode, now_millis().max(before + 1))),
        Err(e) => e,
    };

    match err {
        Error::Exist(_) if how.mode() == CreateMode::Unchecked => {}
        Error::Exist(_) => return Err(nfs_err!(Nfs4errExist, "{}, {:?}", name, how.mode())),
        e => return Err(e),
    }

    let inode = ctx.fs().lookup(dir, name).await?;
    if log_enabled!(Level::Debug) {
        let stat = ctx.fs().getattr(&inode).await?;
        debug!(
            "opening existing file: {}, uid: {}, gid: {}, mode: 0{:o}",
            name,
            stat.uid,
            stat.gid,
            stat.mode & 0o777
        );
    }

    if !access::check(ctx, &inode, AccessMask::MODIFY).await? {
        return Err(nfs_err!(Nfs4errAccess, "{} is not writable", name));
    }

    if let Some(attrs) = how.attrs() {
        let applied = setattr::set_attributes(attrs, &inode, ctx).await?;
        debug!("applied to existing {}: {:?}", name, applied);
    }

    Ok((inode, before))
}

/// CLAIM_FH: open the current filehandle
async fn open_by_fh(args: &OpenArgs, ctx: &CompoundContext) -> Result<ChangeInfo> {
    let inode = ctx.current_inode()?;
    debug!("open by inode for: {:?}", inode);

    let stat = ctx.fs().getattr(inode).await?;
    access::enforce_exact_share_access(ctx, inode, args.share_access).await?;
    check_file_type(&stat, ctx.minor_version())?;

    // no parent directory is involved
    Ok(ChangeInfo {
        atomic: true,
        before: 0,
        after: 0,
    })
}

/// CLAIM_PREVIOUS: reclaim an open held before the server restarted.
///
/// No state survives a restart, so a valid reclaim is an open by filehandle.
async fn reclaim(args: &OpenArgs, client: &Client, ctx: &CompoundContext) -> Result<ChangeInfo> {
    if ctx.state_handler().has_grace_period_expired() {
        return Err(nfs_err!(Nfs4errNoGrace, "server not in grace period"));
    }
    if !client.needs_reclaim() {
        return Err(nfs_err!(Nfs4errNoGrace, "reclaim after reclaim complete"));
    }
    open_by_fh(args, ctx).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::{
        attr::tests::fattr,
        config::ServerConfig,
        memfs::MemoryFs,
        state::StateHandler,
        vfs::{Subject, VirtualFileSystem},
    };

    const CLIENT_ID: u64 = 42;
    const UID: u32 = 1000;

    struct Fixture {
        fs: Arc<MemoryFs>,
        state: Arc<StateHandler>,
        client: Arc<Client>,
        docs: Inode,
    }

    impl Fixture {
        async fn new(grace: Duration, needs_reclaim: bool) -> Fixture {
            let fs = Arc::new(MemoryFs::new());
            let docs = fs.mkdir(&fs.root(), "docs", UID, UID, 0o755).await.unwrap();
            let config = ServerConfig::default().with_grace_period(grace);
            let state = Arc::new(StateHandler::new(&config));
            let client = state
                .add_client(Client::new(CLIENT_ID, "client", Verifier([9; 8]), needs_reclaim))
                .await;
            client.confirm();

            Fixture {
                fs,
                state,
                client,
                docs,
            }
        }

        async fn plain() -> Fixture {
            Fixture::new(Duration::ZERO, false).await
        }

        fn context(&self, minor_version: u32, inode: &Inode) -> CompoundContext {
            let mut ctx = CompoundContext::new(
                minor_version,
                self.fs.clone(),
                self.state.clone(),
                Subject::new(UID, UID),
            );
            if minor_version > 0 {
                ctx = ctx.with_session(self.client.clone());
            }
            ctx.set_current_inode(inode.clone());
            ctx
        }

        async fn file(&self, name: &str, uid: u32, mode: u32) -> Inode {
            self.fs
                .create(&self.docs, FileType::Regular, name, uid, uid, mode)
                .await
                .unwrap()
        }
    }

    fn args(openhow: OpenHow, claim: OpenClaim) -> OpenArgs {
        OpenArgs {
            seqid: 1,
            share_access: ShareAccess::BOTH,
            share_deny: ShareDeny::NONE,
            owner: OpenOwner {
                clientid: CLIENT_ID,
                owner: b"open-owner".to_vec(),
            },
            openhow,
            claim,
        }
    }

    fn by_name(openhow: OpenHow, name: &str) -> OpenArgs {
        args(openhow, OpenClaim::Null(name.as_bytes().to_vec()))
    }

    fn status(res: Result<OpenRes>) -> NfsStat4 {
        match res {
            Ok(res) => res.status(),
            Err(e) => e.status(),
        }
    }

    fn resok(res: Result<OpenRes>) -> OpenResOk {
        match res.unwrap() {
            OpenRes::Ok(resok) => resok,
            OpenRes::Error(status) => panic!("OPEN failed: {}", status),
        }
    }

    #[tokio::test]
    async fn no_create_of_missing_file() {
        let fx = Fixture::plain().await;
        let mut ctx = fx.context(0, &fx.docs);

        let res = handle_open(&by_name(OpenHow::NoCreate, "a.txt"), &mut ctx).await;
        assert_eq!(res.unwrap(), OpenRes::Error(NfsStat4::Nfs4errNoent));
        assert!(fx.client.states().await.is_empty());
    }

    #[tokio::test]
    async fn unchecked_create() {
        let fx = Fixture::plain().await;
        let mut ctx = fx.context(0, &fx.docs);

        let how = OpenHow::Create(CreateHow::Unchecked(fattr(Some(0o640), None)));
        let resok = resok(handle_open(&by_name(how, "a.txt"), &mut ctx).await);

        assert!(resok.cinfo.atomic);
        assert_ne!(resok.cinfo.before, resok.cinfo.after);
        assert!(resok.cinfo.after > resok.cinfo.before);
        assert_eq!(
            resok.rflags,
            OpenResultFlags::LOCKTYPE_POSIX | OpenResultFlags::CONFIRM
        );
        assert_eq!(resok.delegation, DelegationType::None);
        assert!(resok.attrset.is_empty());

        let created = fx.fs.lookup(&fx.docs, "a.txt").await.unwrap();
        assert_eq!(ctx.current_inode().unwrap(), &created);

        let stat = fx.fs.getattr(&created).await.unwrap();
        assert_eq!(stat.typ, FileType::Regular);
        assert_eq!((stat.mode, stat.uid, stat.gid), (0o640, UID, UID));

        let states = fx.client.states().await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].stateid(), resok.stateid);
        assert_eq!(states[0].owner_seqid(), 1);
    }

    #[tokio::test]
    async fn create_without_size_keeps_mode() {
        let fx = Fixture::plain().await;
        let mut ctx = fx.context(1, &fx.docs);

        let how = OpenHow::Create(CreateHow::Guarded(fattr(Some(0o644), None)));
        resok(handle_open(&by_name(how, "b.txt"), &mut ctx).await);

        let stat = fx.fs.getattr(ctx.current_inode().unwrap()).await.unwrap();
        assert_eq!(stat.mode, 0o644);
    }

    #[tokio::test]
    async fn create_without_mode_uses_default() {
        let fx = Fixture::plain().await;
        let mut ctx = fx.context(1, &fx.docs);

        let how = OpenHow::Create(CreateHow::Exclusive(Verifier([1; 8])));
        resok(handle_open(&by_name(how, "c.txt"), &mut ctx).await);

        let stat = fx.fs.getattr(ctx.current_inode().unwrap()).await.unwrap();
        assert_eq!(stat.mode, attr::DEFAULT_CREATE_MODE);
    }

    #[tokio::test]
    async fn exclusive_create_of_existing_file() {
        let fx = Fixture::plain().await;
        fx.file("a.txt", UID, 0o644).await;

        for how in [
            CreateHow::Exclusive(Verifier([1; 8])),
            CreateHow::Exclusive41 {
                verifier: Verifier([1; 8]),
                attrs: fattr(Some(0o600), None),
            },
            CreateHow::Guarded(fattr(Some(0o600), None)),
        ] {
            let mut ctx = fx.context(1, &fx.docs);
            let res = handle_open(&by_name(OpenHow::Create(how), "a.txt"), &mut ctx).await;
            assert_eq!(status(res), NfsStat4::Nfs4errExist);
        }
        assert!(fx.client.states().await.is_empty());
    }

    #[tokio::test]
    async fn unchecked_create_of_existing_file() {
        let fx = Fixture::plain().await;
        let existing = fx.file("a.txt", UID, 0o600).await;
        let before = fx.fs.getattr(&fx.docs).await.unwrap().ctime.as_millis();
        let mut ctx = fx.context(0, &fx.docs);

        let how = OpenHow::Create(CreateHow::Unchecked(fattr(Some(0o640), Some(0))));
        let resok = resok(handle_open(&by_name(how, "a.txt"), &mut ctx).await);

        assert_eq!(resok.cinfo.before, before);
        assert_eq!(resok.cinfo.after, before);
        assert_eq!(ctx.current_inode().unwrap(), &existing);
        assert_eq!(fx.fs.getattr(&existing).await.unwrap().mode, 0o640);
    }

    #[tokio::test]
    async fn unchecked_create_of_read_only_file() {
        let fx = Fixture::plain().await;
        fx.file("ro.txt", 0, 0o644).await;
        let mut ctx = fx.context(0, &fx.docs);

        let how = OpenHow::Create(CreateHow::Unchecked(fattr(Some(0o666), None)));
        let res = handle_open(&by_name(how, "ro.txt"), &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4errAccess);
    }

    #[tokio::test]
    async fn no_create_of_existing_file() {
        let fx = Fixture::plain().await;
        let file = fx.file("a.txt", UID, 0o644).await;
        let mut ctx = fx.context(1, &fx.docs);

        let resok = resok(handle_open(&by_name(OpenHow::NoCreate, "a.txt"), &mut ctx).await);
        assert_eq!(resok.cinfo.before, resok.cinfo.after);
        assert_eq!(resok.rflags, OpenResultFlags::LOCKTYPE_POSIX);
        assert_eq!(ctx.current_inode().unwrap(), &file);
    }

    #[tokio::test]
    async fn no_create_without_permission() {
        let fx = Fixture::plain().await;
        fx.file("secret", 0, 0o600).await;

        let mut open = by_name(OpenHow::NoCreate, "secret");
        open.share_access = ShareAccess::READ;
        let mut ctx = fx.context(0, &fx.docs);
        assert_eq!(status(handle_open(&open, &mut ctx).await), NfsStat4::Nfs4errAccess);
    }

    #[tokio::test]
    async fn grace_blocks_fresh_opens() {
        let fx = Fixture::new(Duration::from_secs(3600), true).await;
        fx.file("a.txt", UID, 0o644).await;
        let mut ctx = fx.context(0, &fx.docs);

        let res = handle_open(&by_name(OpenHow::NoCreate, "a.txt"), &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4errGrace);

        fx.state.end_grace_period();
        let res = handle_open(&by_name(OpenHow::NoCreate, "a.txt"), &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4Ok);
    }

    #[tokio::test]
    async fn grace_blocks_fresh_creates() {
        let fx = Fixture::new(Duration::from_secs(3600), true).await;

        for how in [
            CreateHow::Unchecked(fattr(Some(0o644), None)),
            CreateHow::Exclusive(Verifier([1; 8])),
        ] {
            let mut ctx = fx.context(0, &fx.docs);
            let res = handle_open(&by_name(OpenHow::Create(how), "new.txt"), &mut ctx).await;
            assert_eq!(status(res), NfsStat4::Nfs4errGrace);

            let err = fx.fs.lookup(&fx.docs, "new.txt").await.unwrap_err();
            assert!(matches!(err, Error::NoEnt(_)));
            assert!(fx.client.states().await.is_empty());
        }
    }

    #[tokio::test]
    async fn reclaim() {
        let fx = Fixture::new(Duration::from_secs(3600), true).await;
        let file = fx.file("a.txt", UID, 0o644).await;
        let mut ctx = fx.context(0, &file);

        let reclaim = args(OpenHow::NoCreate, OpenClaim::Previous(DelegationType::None));
        let resok = resok(handle_open(&reclaim, &mut ctx).await);
        assert_eq!(resok.cinfo, ChangeInfo { atomic: true, before: 0, after: 0 });

        fx.client.reclaim_complete();
        let res = handle_open(&reclaim, &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4errNoGrace);
    }

    #[tokio::test]
    async fn reclaim_after_grace() {
        let fx = Fixture::new(Duration::ZERO, true).await;
        let file = fx.file("a.txt", UID, 0o644).await;
        let mut ctx = fx.context(0, &file);

        let reclaim = args(OpenHow::NoCreate, OpenClaim::Previous(DelegationType::None));
        assert_eq!(status(handle_open(&reclaim, &mut ctx).await), NfsStat4::Nfs4errNoGrace);
        assert!(fx.client.states().await.is_empty());
    }

    #[tokio::test]
    async fn only_regular_files_open() {
        let fx = Fixture::plain().await;
        let sub = fx.fs.mkdir(&fx.docs, "sub", UID, UID, 0o755).await.unwrap();
        let link = fx.fs.symlink(&fx.docs, "link", "a.txt", UID, UID).await.unwrap();

        let cases = [
            (0, "sub", NfsStat4::Nfs4errIsdir),
            (1, "sub", NfsStat4::Nfs4errIsdir),
            (0, "link", NfsStat4::Nfs4errSymlink),
            (1, "link", NfsStat4::Nfs4errWrongType),
        ];
        for (minor_version, name, expected) in cases {
            let mut ctx = fx.context(minor_version, &fx.docs);
            let res = handle_open(&by_name(OpenHow::NoCreate, name), &mut ctx).await;
            assert_eq!(status(res), expected, "{} on minor {}", name, minor_version);
        }

        let by_fh = args(OpenHow::NoCreate, OpenClaim::Fh);
        let mut ctx = fx.context(1, &sub);
        assert_eq!(status(handle_open(&by_fh, &mut ctx).await), NfsStat4::Nfs4errIsdir);
        let mut ctx = fx.context(1, &link);
        assert_eq!(status(handle_open(&by_fh, &mut ctx).await), NfsStat4::Nfs4errWrongType);
    }

    #[tokio::test]
    async fn open_by_filehandle() {
        let fx = Fixture::plain().await;
        let file = fx.file("a.txt", 0, 0o644).await;
        let mut ctx = fx.context(1, &file);

        let mut by_fh = args(OpenHow::NoCreate, OpenClaim::Fh);
        by_fh.share_access = ShareAccess::READ;
        let resok = resok(handle_open(&by_fh, &mut ctx).await);
        assert_eq!((resok.cinfo.before, resok.cinfo.after), (0, 0));

        by_fh.share_access = ShareAccess::WRITE;
        assert_eq!(status(handle_open(&by_fh, &mut ctx).await), NfsStat4::Nfs4errAccess);
    }

    #[tokio::test]
    async fn client_resolution() {
        let fx = Fixture::plain().await;
        let mut open = by_name(OpenHow::NoCreate, "a.txt");

        open.owner.clientid = 7;
        let mut ctx = fx.context(0, &fx.docs);
        assert_eq!(status(handle_open(&open, &mut ctx).await), NfsStat4::Nfs4errStaleClientid);

        let unconfirmed = fx
            .state
            .create_client("other", Verifier::default(), false)
            .await;
        open.owner.clientid = unconfirmed.id();
        assert_eq!(status(handle_open(&open, &mut ctx).await), NfsStat4::Nfs4errStaleClientid);

        let mut ctx = CompoundContext::new(1, fx.fs.clone(), fx.state.clone(), Subject::new(UID, UID));
        ctx.set_current_inode(fx.docs.clone());
        assert_eq!(status(handle_open(&open, &mut ctx).await), NfsStat4::Nfs4errOpNotInSession);

        let mut ctx = CompoundContext::new(0, fx.fs.clone(), fx.state.clone(), Subject::new(UID, UID));
        let open = by_name(OpenHow::NoCreate, "a.txt");
        assert_eq!(status(handle_open(&open, &mut ctx).await), NfsStat4::Nfs4errNofilehandle);
    }

    #[tokio::test]
    async fn bad_requests() {
        let fx = Fixture::plain().await;
        let file = fx.file("a.txt", UID, 0o644).await;

        let claims = [
            OpenClaim::DelegateCur {
                delegate_stateid: StateId::default(),
                file: b"a.txt".to_vec(),
            },
            OpenClaim::DelegatePrev(b"a.txt".to_vec()),
            OpenClaim::DelegCurFh(StateId::default()),
            OpenClaim::DelegPrevFh,
            OpenClaim::Unknown(42),
        ];
        for claim in claims {
            let mut ctx = fx.context(1, &fx.docs);
            let res = handle_open(&args(OpenHow::NoCreate, claim), &mut ctx).await;
            assert_eq!(status(res), NfsStat4::Nfs4errInval);
        }

        let mut ctx = fx.context(1, &fx.docs);
        let res = handle_open(&by_name(OpenHow::NoCreate, ".."), &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4errBadname);

        let mut ctx = fx.context(1, &file);
        let res = handle_open(&by_name(OpenHow::NoCreate, "a.txt"), &mut ctx).await;
        assert_eq!(status(res), NfsStat4::Nfs4errNotdir);

        assert!(fx.client.states().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_opens_get_distinct_states() {
        let fx = Fixture::plain().await;
        fx.file("a.txt", UID, 0o644).await;

        let results = join_all((0..32).map(|seqid| {
            let mut ctx = fx.context(1, &fx.docs);
            let mut open = by_name(OpenHow::NoCreate, "a.txt");
            open.seqid = seqid;
            async move { handle_open(&open, &mut ctx).await }
        }))
        .await;

        let mut stateids: Vec<_> = results.into_iter().map(|res| resok(res).stateid).collect();
        stateids.sort();
        stateids.dedup();
        assert_eq!(stateids.len(), 32);

        let sequences: Vec<_> = fx.client.states().await.iter().map(|s| s.sequence()).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }
}
