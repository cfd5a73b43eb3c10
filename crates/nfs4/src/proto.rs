//! NFSv4 protocol data types and constants used by OPEN.
//!
//! # Protocol
//! NFSv4.0 (RFC 7530) / NFSv4.1 (RFC 8881)

use std::fmt;

use bitflags::bitflags;
use enum_primitive::*;

/// Size of the opaque part of a state-id
pub const NFS4_OTHER_SIZE: usize = 12;

/// Size of a verifier
pub const NFS4_VERIFIER_SIZE: usize = 8;

/// Longest file name component accepted by the server
pub const NFS4_MAXNAMLEN: usize = 255;

/*
 * Attribute numbers consulted by OPEN and SETATTR-on-open
 */
pub const FATTR4_SIZE: u32 = 4;
pub const FATTR4_MODE: u32 = 33;
pub const FATTR4_OWNER: u32 = 36;
pub const FATTR4_OWNER_GROUP: u32 = 37;
pub const FATTR4_TIME_ACCESS_SET: u32 = 48;
pub const FATTR4_TIME_MODIFY_SET: u32 = 54;

/// `time_how4` discriminants of `settime4`
pub const SET_TO_SERVER_TIME4: u32 = 0;
pub const SET_TO_CLIENT_TIME4: u32 = 1;

enum_from_primitive! {
    #[doc = "Status codes returned to the client"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum NfsStat4 {
        Nfs4Ok              = 0,
        Nfs4errPerm         = 1,
        Nfs4errNoent        = 2,
        Nfs4errIo           = 5,
        Nfs4errNxio         = 6,
        Nfs4errAccess       = 13,
        Nfs4errExist        = 17,
        Nfs4errXdev         = 18,
        Nfs4errNotdir       = 20,
        Nfs4errIsdir        = 21,
        Nfs4errInval        = 22,
        Nfs4errFbig         = 27,
        Nfs4errNospc        = 28,
        Nfs4errRofs         = 30,
        Nfs4errNametoolong  = 63,
        Nfs4errDquot        = 69,
        Nfs4errStale        = 70,
        Nfs4errBadhandle    = 10001,
        Nfs4errNotsupp      = 10004,
        Nfs4errServerfault  = 10006,
        Nfs4errBadtype      = 10007,
        Nfs4errDelay        = 10008,
        Nfs4errExpired      = 10011,
        Nfs4errGrace        = 10013,
        Nfs4errShareDenied  = 10015,
        Nfs4errNofilehandle = 10020,
        Nfs4errStaleClientid = 10022,
        Nfs4errBadSeqid     = 10026,
        Nfs4errSymlink      = 10029,
        Nfs4errAttrnotsupp  = 10032,
        Nfs4errNoGrace      = 10033,
        Nfs4errReclaimBad   = 10034,
        Nfs4errBadxdr       = 10036,
        Nfs4errBadowner     = 10039,
        Nfs4errBadchar      = 10040,
        Nfs4errBadname      = 10041,
        Nfs4errBadsession   = 10052,
        Nfs4errOpNotInSession = 10071,
        Nfs4errWrongType    = 10083,
    }
}

impl fmt::Display for NfsStat4 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u32)
    }
}

enum_from_primitive! {
    #[doc = "Kind of claim carried by an OPEN request"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum OpenClaimType {
        Null        = 0,
        Previous    = 1,
        DelegateCur = 2,
        DelegatePrev = 3,
        Fh          = 4,
        DelegCurFh  = 5,
        DelegPrevFh = 6,
    }
}

enum_from_primitive! {
    #[doc = "How a file is to be created, `createmode4`"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum CreateMode {
        Unchecked   = 0,
        Guarded     = 1,
        Exclusive   = 2,
        Exclusive41 = 3,
    }
}

enum_from_primitive! {
    #[doc = "`opentype4`"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum OpenType {
        NoCreate    = 0,
        Create      = 1,
    }
}

enum_from_primitive! {
    #[doc = "`open_delegation_type4`"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum DelegationType {
        None        = 0,
        Read        = 1,
        Write       = 2,
        NoneExt     = 3,
    }
}

bitflags! {
    /// Share access requested by OPEN
    ///
    /// NFSv4.1 clients may OR delegation "want" flags into the upper bits,
    /// so values are kept verbatim.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ShareAccess: u32 {
        const READ      = 0x00000001;
        const WRITE     = 0x00000002;
        const BOTH      = 0x00000003;
        const _         = !0;
    }
}

bitflags! {
    /// Share deny requested by OPEN
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ShareDeny: u32 {
        const NONE      = 0x00000000;
        const READ      = 0x00000001;
        const WRITE     = 0x00000002;
        const BOTH      = 0x00000003;
        const _         = !0;
    }
}

bitflags! {
    /// Bits of the ACCESS operation, used against the backend access predicate
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct AccessMask: u32 {
        const READ      = 0x00000001;
        const LOOKUP    = 0x00000002;
        const MODIFY    = 0x00000004;
        const EXTEND    = 0x00000008;
        const DELETE    = 0x00000010;
        const EXECUTE   = 0x00000020;
    }
}

bitflags! {
    /// `rflags` of a successful OPEN
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct OpenResultFlags: u32 {
        #[doc = "Client must send OPEN_CONFIRM (NFSv4.0 only)"]
        const CONFIRM           = 0x00000002;
        #[doc = "Server uses POSIX byte-range lock semantics"]
        const LOCKTYPE_POSIX    = 0x00000004;
        const PRESERVE_UNLINKED = 0x00000008;
        const MAY_NOTIFY_LOCK   = 0x00000020;
    }
}

/// Attribute bitmap, `bitmap4`
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bitmap4(pub Vec<u32>);

impl Bitmap4 {
    pub fn new() -> Bitmap4 {
        Bitmap4(Vec::new())
    }

    /// Bitmap with the given attributes set
    pub fn of(attrs: &[u32]) -> Bitmap4 {
        let mut bitmap = Bitmap4::new();
        for attr in attrs {
            bitmap.set(*attr);
        }
        bitmap
    }

    pub fn set(&mut self, attr: u32) {
        let word = (attr / 32) as usize;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1 << (attr % 32);
    }

    pub fn is_set(&self, attr: u32) -> bool {
        self.0
            .get((attr / 32) as usize)
            .is_some_and(|word| word & (1 << (attr % 32)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    /// Attribute numbers set in this bitmap, in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().enumerate().flat_map(|(i, word)| {
            (0..32)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| i as u32 * 32 + bit)
        })
    }
}

/// Attribute set as sent on the wire, `fattr4`
///
/// `attr_vals` holds the XDR encoded values of the attributes in `attrmask`,
/// in ascending attribute order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FAttr4 {
    pub attrmask: Bitmap4,
    pub attr_vals: Vec<u8>,
}

/// `nfstime4`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NfsTime4 {
    pub seconds: i64,
    pub nseconds: u32,
}

/// Opaque 8 byte verifier
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Verifier(pub [u8; NFS4_VERIFIER_SIZE]);

/// State identifier handed to the client
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId {
    pub seqid: u32,
    pub other: [u8; NFS4_OTHER_SIZE],
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for b in self.other {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ", seq: {}]", self.seqid)
    }
}

/// `change_info4`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeInfo {
    pub atomic: bool,
    pub before: u64,
    pub after: u64,
}

/// `open_owner4`
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpenOwner {
    pub clientid: u64,
    pub owner: Vec<u8>,
}

/// `createhow4`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CreateHow {
    Unchecked(FAttr4),
    Guarded(FAttr4),
    Exclusive(Verifier),
    Exclusive41 { verifier: Verifier, attrs: FAttr4 },
}

impl CreateHow {
    pub fn mode(&self) -> CreateMode {
        match self {
            CreateHow::Unchecked(_) => CreateMode::Unchecked,
            CreateHow::Guarded(_) => CreateMode::Guarded,
            CreateHow::Exclusive(_) => CreateMode::Exclusive,
            CreateHow::Exclusive41 { .. } => CreateMode::Exclusive41,
        }
    }

    /// Exclusive create, in either its NFSv4.0 or NFSv4.1 form
    pub fn is_exclusive(&self) -> bool {
        matches!(self.mode(), CreateMode::Exclusive | CreateMode::Exclusive41)
    }

    /// Attribute set the client sent along with the create
    pub fn attrs(&self) -> Option<&FAttr4> {
        match self {
            CreateHow::Unchecked(attrs) | CreateHow::Guarded(attrs) => Some(attrs),
            CreateHow::Exclusive41 { attrs, .. } => Some(attrs),
            CreateHow::Exclusive(_) => None,
        }
    }
}

/// `openflag4`
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenHow {
    #[default]
    NoCreate,
    Create(CreateHow),
}

impl OpenHow {
    pub fn open_type(&self) -> OpenType {
        match self {
            OpenHow::NoCreate => OpenType::NoCreate,
            OpenHow::Create(_) => OpenType::Create,
        }
    }
}

/// `open_claim4`, one variant per claim kind
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenClaim {
    /// Open by name in the directory of the current filehandle
    Null(Vec<u8>),
    /// Reclaim after server restart, current filehandle is the file
    Previous(DelegationType),
    DelegateCur {
        delegate_stateid: StateId,
        file: Vec<u8>,
    },
    DelegatePrev(Vec<u8>),
    /// Open of the current filehandle (NFSv4.1)
    Fh,
    DelegCurFh(StateId),
    DelegPrevFh,
    /// Claim discriminant this server does not know
    Unknown(u32),
}

impl OpenClaim {
    /// Discriminant of the claim as sent on the wire
    pub fn raw_type(&self) -> u32 {
        match *self {
            OpenClaim::Unknown(typ) => typ,
            _ => self.claim_type().map_or(0, |typ| typ as u32),
        }
    }

    /// The claim kind, `None` for an unknown discriminant
    pub fn claim_type(&self) -> Option<OpenClaimType> {
        match self {
            OpenClaim::Null(_) => Some(OpenClaimType::Null),
            OpenClaim::Previous(_) => Some(OpenClaimType::Previous),
            OpenClaim::DelegateCur { .. } => Some(OpenClaimType::DelegateCur),
            OpenClaim::DelegatePrev(_) => Some(OpenClaimType::DelegatePrev),
            OpenClaim::Fh => Some(OpenClaimType::Fh),
            OpenClaim::DelegCurFh(_) => Some(OpenClaimType::DelegCurFh),
            OpenClaim::DelegPrevFh => Some(OpenClaimType::DelegPrevFh),
            OpenClaim::Unknown(_) => None,
        }
    }
}

/// Arguments of OPEN, `OPEN4args`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpenArgs {
    /// Open-owner sequence id
    pub seqid: u32,
    pub share_access: ShareAccess,
    pub share_deny: ShareDeny,
    pub owner: OpenOwner,
    pub openhow: OpenHow,
    pub claim: OpenClaim,
}

/// Successful result of OPEN, `OPEN4resok`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpenResOk {
    pub stateid: StateId,
    pub cinfo: ChangeInfo,
    pub rflags: OpenResultFlags,
    pub attrset: Bitmap4,
    pub delegation: DelegationType,
}

/// Result of OPEN, `OPEN4res`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenRes {
    Ok(OpenResOk),
    Error(NfsStat4),
}

impl OpenRes {
    pub fn status(&self) -> NfsStat4 {
        match self {
            OpenRes::Ok(_) => NfsStat4::Nfs4Ok,
            OpenRes::Error(status) => *status,
        }
    }
}
