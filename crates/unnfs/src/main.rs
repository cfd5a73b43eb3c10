use {
    clap::{Parser, ValueEnum},
    log::info,
    nfs4::{
        config::ServerConfig,
        context::CompoundContext,
        open::handle_open,
        state::StateHandler,
        vfs::{Inode, Subject, VirtualFileSystem},
        xdr::open_res_to_bytes,
        *,
    },
    std::{
        path::{Component, Path, PathBuf},
        sync::Arc,
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
    tokio::fs,
};

mod localfs;
mod utils;
use crate::{localfs::LocalFs, utils::*};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CreateArg {
    Unchecked,
    Guarded,
    Exclusive,
    Exclusive41,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum AccessArg {
    Read,
    Write,
    Both,
}

impl From<AccessArg> for ShareAccess {
    fn from(access: AccessArg) -> Self {
        match access {
            AccessArg::Read => ShareAccess::READ,
            AccessArg::Write => ShareAccess::WRITE,
            AccessArg::Both => ShareAccess::BOTH,
        }
    }
}

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Directory to export
    exportdir: PathBuf,

    /// File to open, relative to the export
    path: PathBuf,

    /// NFSv4 minor version of the request
    #[arg(long, default_value_t = 0)]
    minor_version: u32,

    /// Create the file with the given create mode
    #[arg(long, value_enum)]
    create: Option<CreateArg>,

    /// Permissions of a created file, in octal
    #[arg(long, value_parser = parse_octal)]
    mode: Option<u32>,

    /// Share access of the open
    #[arg(long, value_enum, default_value_t = AccessArg::Both)]
    access: AccessArg,

    /// Open by filehandle instead of by name
    #[arg(long)]
    by_fh: bool,

    /// Reclaim an open held before a server restart
    #[arg(long, conflicts_with_all = ["create", "by_fh"])]
    reclaim: bool,

    /// Grace period after start, in seconds
    #[arg(long, default_value_t = 0)]
    grace_secs: u64,

    /// Client lease time, in seconds
    #[arg(long, default_value_t = 90)]
    lease_secs: u64,
}

impl Cli {
    fn openhow(&self) -> OpenHow {
        let mut attrs = FAttr4::default();
        if let Some(mode) = self.mode {
            attrs.attrmask.set(FATTR4_MODE);
            attrs.attr_vals = mode.to_be_bytes().to_vec();
        }
        let verifier = || {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            Verifier(nanos.to_be_bytes())
        };

        match self.create {
            None => OpenHow::NoCreate,
            Some(CreateArg::Unchecked) => OpenHow::Create(CreateHow::Unchecked(attrs)),
            Some(CreateArg::Guarded) => OpenHow::Create(CreateHow::Guarded(attrs)),
            Some(CreateArg::Exclusive) => OpenHow::Create(CreateHow::Exclusive(verifier())),
            Some(CreateArg::Exclusive41) => OpenHow::Create(CreateHow::Exclusive41 {
                verifier: verifier(),
                attrs,
            }),
        }
    }
}

/// Split `path` into its components
fn components(path: &Path) -> Result<Vec<String>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir | Component::RootDir))
        .map(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .map(str::to_owned)
                .ok_or_else(|| nfs_err!(Nfs4errInval, "{:?} is not UTF-8", name)),
            c => Err(nfs_err!(Nfs4errBadname, "{:?}", c)),
        })
        .collect()
}

async fn walk(fs: &LocalFs, names: &[String]) -> Result<Inode> {
    let mut inode = fs.root();
    for name in names {
        inode = fs.lookup(&inode, name).await?;
    }
    Ok(inode)
}

async fn unnfs_main(cli: Cli) -> Result<i32> {
    if !fs::metadata(&cli.exportdir).await?.is_dir() {
        return res!(io_err!(Other, "export must be a directory"));
    }

    let mut names = components(&cli.path)?;
    let file = names
        .pop()
        .ok_or_else(|| nfs_err!(Nfs4errInval, "empty path"))?;

    let fs = Arc::new(LocalFs::new(&cli.exportdir));
    let config = ServerConfig::default()
        .with_lease_time(Duration::from_secs(cli.lease_secs))
        .with_grace_period(Duration::from_secs(cli.grace_secs));
    let state = Arc::new(StateHandler::new(&config));

    let client = state
        .create_client(
            format!("unnfs-{}", std::process::id()),
            Verifier::default(),
            cli.reclaim,
        )
        .await;
    client.confirm();

    let subject = Subject::new(
        nix::unistd::geteuid().as_raw(),
        nix::unistd::getegid().as_raw(),
    );
    let mut ctx = CompoundContext::new(cli.minor_version, fs.clone(), state, subject);
    if cli.minor_version > 0 {
        ctx = ctx.with_session(client.clone());
    }

    let dir = walk(&fs, &names).await?;
    let claim = if cli.by_fh || cli.reclaim {
        ctx.set_current_inode(fs.lookup(&dir, &file).await?);
        if cli.reclaim {
            OpenClaim::Previous(DelegationType::None)
        } else {
            OpenClaim::Fh
        }
    } else {
        ctx.set_current_inode(dir);
        OpenClaim::Null(file.into_bytes())
    };

    let args = OpenArgs {
        seqid: 0,
        share_access: cli.access.into(),
        share_deny: ShareDeny::NONE,
        owner: OpenOwner {
            clientid: client.id(),
            owner: b"unnfs".to_vec(),
        },
        openhow: cli.openhow(),
        claim,
    };

    info!("OPEN {:?}", args);
    let res = handle_open(&args, &mut ctx).await?;
    let encoded = open_res_to_bytes(&res)?;

    println!("[*] {:#?}", res);
    println!("[*] Encoded result: {} bytes", encoded.len());

    Ok(match res {
        OpenRes::Ok(_) => 0,
        OpenRes::Error(_) => 1,
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = unnfs_main(Cli::parse()).await.unwrap_or_else(|e| {
        eprintln!("Error: {} ({})", e, e.status());
        -1
    });

    std::process::exit(exit_code);
}
