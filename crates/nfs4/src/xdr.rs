//! Serialize/deserialize OPEN arguments and results into/from XDR.
//!
//! XDR is big-endian and pads every variable length opaque to a multiple of
//! four bytes.

use crate::{io_err, nfs_err, proto::*, res};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{BufMut, Bytes};
use num_traits::FromPrimitive;
use std::io::Result;
use std::mem;
use std::ops::Shl;

/// Upper bound of a single opaque accepted from the wire
const MAX_OPAQUE: usize = 1 << 20;

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn read_exact<R: ReadBytesExt + ?Sized>(r: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; size];
    r.read_exact(&mut buf[..]).and(Ok(buf))
}

/// Read a variable length `opaque<>`
pub fn read_opaque<R: ReadBytesExt>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > MAX_OPAQUE {
        return res!(io_err!(InvalidData, "opaque too long"));
    }
    let buf = read_exact(r, len)?;
    read_exact(r, padding(len))?;
    Ok(buf)
}

/// Write a variable length `opaque<>`
pub fn write_opaque<W: WriteBytesExt>(w: &mut W, data: &[u8]) -> Result<usize> {
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(data)?;
    let pad = padding(data.len());
    w.write_all(&[0u8; 3][..pad])?;
    Ok(mem::size_of::<u32>() + data.len() + pad)
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<
pub struct SResult<T>(::std::io::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: encoder << data
    pub fn encode<T: Encodable>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<W> SResult<Encoder<W>> {
    fn written(self) -> Result<usize> {
        self.0.map(|enc| enc.bytes)
    }
}

/// Trait representing a type which can be serialized into XDR
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<BigEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u64::<BigEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for i64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_i64::<BigEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for bool {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (*self as u32).encode(w)
    }
}

impl Encodable for String {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        write_opaque(w, self.as_bytes())
    }
}

impl Encodable for Bitmap4 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.0
            .iter()
            .fold(Encoder::new(w) << &(self.0.len() as u32), |acc, word| acc << word)
            .written()
    }
}

impl Encodable for FAttr4 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.attrmask.encode(w)?;
        Ok(bytes + write_opaque(w, &self.attr_vals)?)
    }
}

impl Encodable for NfsTime4 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (Encoder::new(w) << &self.seconds << &self.nseconds).written()
    }
}

impl Encodable for Verifier {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_all(&self.0).and(Ok(NFS4_VERIFIER_SIZE))
    }
}

impl Encodable for StateId {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.seqid.encode(w)?;
        w.write_all(&self.other)?;
        Ok(bytes + NFS4_OTHER_SIZE)
    }
}

impl Encodable for ChangeInfo {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (Encoder::new(w) << &self.atomic << &self.before << &self.after).written()
    }
}

impl Encodable for OpenOwner {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.clientid.encode(w)?;
        Ok(bytes + write_opaque(w, &self.owner)?)
    }
}

impl Encodable for CreateHow {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let enc = Encoder::new(w) << &(self.mode() as u32);
        let enc = match *self {
            CreateHow::Unchecked(ref attrs) | CreateHow::Guarded(ref attrs) => enc << attrs,
            CreateHow::Exclusive(ref verifier) => enc << verifier,
            CreateHow::Exclusive41 {
                ref verifier,
                ref attrs,
            } => enc << verifier << attrs,
        };
        enc.written()
    }
}

impl Encodable for OpenHow {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = (self.open_type() as u32).encode(w)?;
        match *self {
            OpenHow::NoCreate => Ok(bytes),
            OpenHow::Create(ref how) => Ok(bytes + how.encode(w)?),
        }
    }
}

impl Encodable for OpenClaim {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.raw_type().encode(w)?;
        let body = match *self {
            OpenClaim::Null(ref name) | OpenClaim::DelegatePrev(ref name) => write_opaque(w, name)?,
            OpenClaim::Previous(delegation) => (delegation as u32).encode(w)?,
            OpenClaim::DelegateCur {
                ref delegate_stateid,
                ref file,
            } => delegate_stateid.encode(w)? + write_opaque(w, file)?,
            OpenClaim::DelegCurFh(ref stateid) => stateid.encode(w)?,
            OpenClaim::Fh | OpenClaim::DelegPrevFh | OpenClaim::Unknown(_) => 0,
        };
        Ok(bytes + body)
    }
}

impl Encodable for OpenArgs {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (Encoder::new(w)
            << &self.seqid
            << &self.share_access.bits()
            << &self.share_deny.bits()
            << &self.owner
            << &self.openhow
            << &self.claim)
            .written()
    }
}

impl Encodable for OpenResOk {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (Encoder::new(w)
            << &self.stateid
            << &self.cinfo
            << &self.rflags.bits()
            << &self.attrset
            << &(self.delegation as u32))
            .written()
    }
}

impl Encodable for OpenRes {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let bytes = (self.status() as u32).encode(w)?;
        match *self {
            OpenRes::Ok(ref resok) => Ok(bytes + resok.encode(w)?),
            OpenRes::Error(_) => Ok(bytes),
        }
    }
}

/// Trait representing a type which can be deserialized from XDR
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u32::<BigEndian>()
    }
}

impl Decodable for u64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u64::<BigEndian>()
    }
}

impl Decodable for i64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_i64::<BigEndian>()
    }
}

impl Decodable for bool {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        match r.read_u32::<BigEndian>()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => res!(io_err!(InvalidData, "Invalid boolean")),
        }
    }
}

impl Decodable for String {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        String::from_utf8(read_opaque(r)?).or(res!(io_err!(InvalidData, "Invalid UTF-8 sequence")))
    }
}

impl Decodable for Bitmap4 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u32 = Decodable::decode(r)?;
        if len as usize > MAX_OPAQUE / 4 {
            return res!(io_err!(InvalidData, "bitmap too long"));
        }
        let mut words = Vec::with_capacity(len as usize);
        for _ in 0..len {
            words.push(Decodable::decode(r)?);
        }
        Ok(Bitmap4(words))
    }
}

impl Decodable for FAttr4 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FAttr4 {
            attrmask: Decodable::decode(r)?,
            attr_vals: read_opaque(r)?,
        })
    }
}

impl Decodable for NfsTime4 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(NfsTime4 {
            seconds: Decodable::decode(r)?,
            nseconds: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Verifier {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let mut verifier = [0; NFS4_VERIFIER_SIZE];
        r.read_exact(&mut verifier)?;
        Ok(Verifier(verifier))
    }
}

impl Decodable for StateId {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let seqid = Decodable::decode(r)?;
        let mut other = [0; NFS4_OTHER_SIZE];
        r.read_exact(&mut other)?;
        Ok(StateId { seqid, other })
    }
}

impl Decodable for ChangeInfo {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(ChangeInfo {
            atomic: Decodable::decode(r)?,
            before: Decodable::decode(r)?,
            after: Decodable::decode(r)?,
        })
    }
}

impl Decodable for OpenOwner {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(OpenOwner {
            clientid: Decodable::decode(r)?,
            owner: read_opaque(r)?,
        })
    }
}

impl Decodable for DelegationType {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let typ: u32 = Decodable::decode(r)?;
        DelegationType::from_u32(typ).ok_or(io_err!(InvalidData, "Invalid delegation type"))
    }
}

impl Decodable for CreateHow {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let mode: u32 = Decodable::decode(r)?;
        Ok(match CreateMode::from_u32(mode) {
            Some(CreateMode::Unchecked) => CreateHow::Unchecked(Decodable::decode(r)?),
            Some(CreateMode::Guarded) => CreateHow::Guarded(Decodable::decode(r)?),
            Some(CreateMode::Exclusive) => CreateHow::Exclusive(Decodable::decode(r)?),
            Some(CreateMode::Exclusive41) => CreateHow::Exclusive41 {
                verifier: Decodable::decode(r)?,
                attrs: Decodable::decode(r)?,
            },
            None => return res!(io_err!(InvalidData, format!("bad value: {}", mode))),
        })
    }
}

impl Decodable for OpenHow {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let typ: u32 = Decodable::decode(r)?;
        match OpenType::from_u32(typ) {
            Some(OpenType::NoCreate) => Ok(OpenHow::NoCreate),
            Some(OpenType::Create) => Ok(OpenHow::Create(Decodable::decode(r)?)),
            None => res!(io_err!(InvalidData, "Invalid open type")),
        }
    }
}

impl Decodable for OpenClaim {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        use crate::proto::OpenClaimType::*;

        let typ: u32 = Decodable::decode(r)?;
        Ok(match OpenClaimType::from_u32(typ) {
            Some(Null) => OpenClaim::Null(read_opaque(r)?),
            Some(Previous) => OpenClaim::Previous(Decodable::decode(r)?),
            Some(DelegateCur) => OpenClaim::DelegateCur {
                delegate_stateid: Decodable::decode(r)?,
                file: read_opaque(r)?,
            },
            Some(DelegatePrev) => OpenClaim::DelegatePrev(read_opaque(r)?),
            Some(Fh) => OpenClaim::Fh,
            Some(DelegCurFh) => OpenClaim::DelegCurFh(Decodable::decode(r)?),
            Some(DelegPrevFh) => OpenClaim::DelegPrevFh,
            // the claim is the last field of OPEN4args, nothing to skip
            None => OpenClaim::Unknown(typ),
        })
    }
}

impl Decodable for OpenArgs {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(OpenArgs {
            seqid: Decodable::decode(r)?,
            share_access: ShareAccess::from_bits_retain(Decodable::decode(r)?),
            share_deny: ShareDeny::from_bits_retain(Decodable::decode(r)?),
            owner: Decodable::decode(r)?,
            openhow: Decodable::decode(r)?,
            claim: Decodable::decode(r)?,
        })
    }
}

impl Decodable for OpenResOk {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(OpenResOk {
            stateid: Decodable::decode(r)?,
            cinfo: Decodable::decode(r)?,
            rflags: OpenResultFlags::from_bits_truncate(Decodable::decode(r)?),
            attrset: Decodable::decode(r)?,
            delegation: Decodable::decode(r)?,
        })
    }
}

impl Decodable for OpenRes {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let status: u32 = Decodable::decode(r)?;
        match NfsStat4::from_u32(status) {
            Some(NfsStat4::Nfs4Ok) => Ok(OpenRes::Ok(Decodable::decode(r)?)),
            Some(status) => Ok(OpenRes::Error(status)),
            None => res!(io_err!(InvalidData, "Invalid status")),
        }
    }
}

/// Read OPEN arguments, a malformed stream is reported as `NFS4ERR_BADXDR`
pub fn read_open_args<R: ReadBytesExt>(r: &mut R) -> crate::Result<OpenArgs> {
    Decodable::decode(r).map_err(|e| nfs_err!(Nfs4errBadxdr, "{}", e))
}

/// Write an OPEN result into a byte-oriented stream
pub fn write_open_res<W: WriteBytesExt>(w: &mut W, res: &OpenRes) -> Result<usize> {
    res.encode(w)
}

/// Serialize an OPEN result into a frozen buffer
pub fn open_res_to_bytes(res: &OpenRes) -> Result<Bytes> {
    let mut writer = bytes::BytesMut::with_capacity(128).writer();
    write_open_res(&mut writer, res)?;
    Ok(writer.into_inner().freeze())
}
