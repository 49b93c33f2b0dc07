//! Datatype descriptions and their on-disk encoding.
//!
//! The encoding follows the HDF5 datatype message layout: an 8-byte header
//! (class and version nibbles, a 24-bit class bit field, a 32-bit element
//! size) followed by class-specific properties. Compound and array types
//! embed their member types recursively.

use byteorder::{ByteOrder, LittleEndian};

use super::space::decode_error;
use super::{Failure, Outcome};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::hid_t;
use crate::h5t::{self, H5T_class_t, H5T_cset_t, H5T_str_t};

const CLASS_FIXED: u8 = 0;
const CLASS_FLOAT: u8 = 1;
const CLASS_STRING: u8 = 3;
const CLASS_BITFIELD: u8 = 4;
const CLASS_COMPOUND: u8 = 6;
const CLASS_VLEN: u8 = 9;
const CLASS_ARRAY: u8 = 10;

/// Byte-order bit of numeric types written by this host.
const ORDER: u8 = if cfg!(target_endian = "big") { 0x01 } else { 0x00 };

/// Memory slot of a variable-length string element.
pub(crate) const VL_SLOT: usize = std::mem::size_of::<usize>();
/// File form of a variable-length string: byte length, heap collection
/// address and object index.
pub(crate) const VL_DISK_SIZE: usize = 16;

const MAX_RANK: usize = 32;
const MAX_NESTING: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Member {
    pub name: String,
    pub offset: usize,
    pub desc: TypeDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TypeDesc {
    Integer { size: usize, signed: bool },
    Float { size: usize },
    Bitfield { size: usize },
    String { size: usize, cset: H5T_cset_t, pad: H5T_str_t },
    /// Variable-length string; elements are pointer-sized in memory.
    VarString { cset: H5T_cset_t },
    Array { base: Box<TypeDesc>, dims: Vec<u64> },
    Compound { size: usize, members: Vec<Member> },
}

/// Permanent library-owned datatypes and their identifiers.
pub(crate) fn predefined() -> Vec<(hid_t, TypeDesc)> {
    let int = |size, signed| TypeDesc::Integer { size, signed };
    vec![
        (h5t::H5T_NATIVE_INT8, int(1, true)),
        (h5t::H5T_NATIVE_INT16, int(2, true)),
        (h5t::H5T_NATIVE_INT32, int(4, true)),
        (h5t::H5T_NATIVE_INT64, int(8, true)),
        (h5t::H5T_NATIVE_UINT8, int(1, false)),
        (h5t::H5T_NATIVE_UINT16, int(2, false)),
        (h5t::H5T_NATIVE_UINT32, int(4, false)),
        (h5t::H5T_NATIVE_UINT64, int(8, false)),
        (h5t::H5T_NATIVE_FLOAT, TypeDesc::Float { size: 4 }),
        (h5t::H5T_NATIVE_DOUBLE, TypeDesc::Float { size: 8 }),
        (h5t::H5T_NATIVE_B8, TypeDesc::Bitfield { size: 1 }),
        (
            h5t::H5T_C_S1,
            TypeDesc::String {
                size: 1,
                cset: H5T_cset_t::H5T_CSET_ASCII,
                pad: H5T_str_t::H5T_STR_NULLTERM,
            },
        ),
    ]
}

impl TypeDesc {
    pub(crate) fn size(&self) -> usize {
        match self {
            TypeDesc::Integer { size, .. }
            | TypeDesc::Float { size }
            | TypeDesc::Bitfield { size }
            | TypeDesc::String { size, .. }
            | TypeDesc::Compound { size, .. } => *size,
            TypeDesc::VarString { .. } => VL_SLOT,
            TypeDesc::Array { base, dims } => base.size() * dims.iter().product::<u64>() as usize,
        }
    }

    pub(crate) fn class(&self) -> H5T_class_t {
        match self {
            TypeDesc::Integer { .. } => H5T_class_t::H5T_INTEGER,
            TypeDesc::Float { .. } => H5T_class_t::H5T_FLOAT,
            TypeDesc::Bitfield { .. } => H5T_class_t::H5T_BITFIELD,
            TypeDesc::String { .. } | TypeDesc::VarString { .. } => H5T_class_t::H5T_STRING,
            TypeDesc::Array { .. } => H5T_class_t::H5T_ARRAY,
            TypeDesc::Compound { .. } => H5T_class_t::H5T_COMPOUND,
        }
    }

    /// Whether any element of this type holds a variable-length string.
    pub(crate) fn has_vlen(&self) -> bool {
        match self {
            TypeDesc::VarString { .. } => true,
            TypeDesc::Array { base, .. } => base.has_vlen(),
            TypeDesc::Compound { members, .. } => members.iter().any(|m| m.desc.has_vlen()),
            _ => false,
        }
    }

    /// Adds a member to a compound type, keeping members sorted by offset.
    pub(crate) fn insert_member(&mut self, name: String, offset: usize, desc: TypeDesc) -> Outcome<()> {
        let TypeDesc::Compound { size, members } = self else {
            return Err(Failure::bad_type("not a compound datatype"));
        };
        let cant_insert = |desc: String| {
            Failure::new(H5E_major_t::H5E_DATATYPE, H5E_minor_t::H5E_CANTINSERT, desc)
        };
        if name.is_empty() {
            return Err(cant_insert("member name is empty".to_owned()));
        }
        if members.iter().any(|m| m.name == name) {
            return Err(cant_insert(format!("duplicate member name {name:?}")));
        }
        let end = offset + desc.size();
        if end > *size {
            return Err(cant_insert(format!(
                "member {name:?} at offset {offset} extends past the compound size {size}"
            )));
        }
        if let Some(other) = members
            .iter()
            .find(|m| offset < m.offset + m.desc.size() && m.offset < end)
        {
            return Err(cant_insert(format!(
                "member {name:?} overlaps member {:?}",
                other.name
            )));
        }
        let at = members.partition_point(|m| m.offset < offset);
        members.insert(at, Member { name, offset, desc });
        Ok(())
    }

    /// Array type over `base`, rejecting element counts whose byte size
    /// overflows.
    pub(crate) fn array(base: TypeDesc, dims: Vec<u64>) -> Outcome<Self> {
        let mut size = base.size();
        for &d in &dims {
            size = usize::try_from(d)
                .ok()
                .and_then(|d| size.checked_mul(d))
                .ok_or_else(|| Failure::nospace("array datatype too large"))?;
        }
        Ok(TypeDesc::Array {
            base: Box::new(base),
            dims,
        })
    }

    /// Element size in a file, where each variable-length string is a
    /// 16-byte global heap reference rather than a pointer.
    pub(crate) fn disk_size(&self) -> usize {
        self.size() + self.disk_growth()
    }

    fn disk_growth(&self) -> usize {
        match self {
            TypeDesc::VarString { .. } => VL_DISK_SIZE - VL_SLOT,
            TypeDesc::Array { base, dims } => {
                base.disk_growth() * dims.iter().product::<u64>() as usize
            }
            TypeDesc::Compound { members, .. } => members.iter().map(|m| m.desc.disk_growth()).sum(),
            _ => 0,
        }
    }

    /// Encodes the datatype message describing the file form of this type.
    pub(crate) fn encode(&self) -> Outcome<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> Outcome<()> {
        match self {
            TypeDesc::Integer { size, signed } => {
                let bf0 = ORDER | if *signed { 0x08 } else { 0x00 };
                header(buf, CLASS_FIXED, 1, [bf0, 0, 0], *size)?;
                push_precision(buf, *size)
            }
            TypeDesc::Float { size } => {
                let (exp_loc, exp_size, mant_size, bias) = match size {
                    4 => (23u8, 8u8, 23u8, 127u32),
                    8 => (52, 11, 52, 1023),
                    other => return Err(unsupported(format!("{other}-byte floats are not supported"))),
                };
                // Sign bit location sits in the second bit-field byte.
                let sign = (*size * 8 - 1) as u8;
                header(buf, CLASS_FLOAT, 1, [0x20 | ORDER, sign, 0], *size)?;
                push_precision(buf, *size)?;
                buf.extend_from_slice(&[exp_loc, exp_size, 0, mant_size]);
                buf.extend_from_slice(&bias.to_le_bytes());
                Ok(())
            }
            TypeDesc::Bitfield { size } => {
                header(buf, CLASS_BITFIELD, 1, [ORDER, 0, 0], *size)?;
                push_precision(buf, *size)
            }
            TypeDesc::String { size, cset, pad } => {
                let bf0 = (*pad as u8) | ((*cset as u8) << 4);
                header(buf, CLASS_STRING, 1, [bf0, 0, 0], *size)
            }
            TypeDesc::VarString { cset } => {
                header(buf, CLASS_VLEN, 1, [0x01, *cset as u8, 0], VL_DISK_SIZE)?;
                TypeDesc::Integer { size: 1, signed: false }.encode_into(buf)
            }
            TypeDesc::Array { base, dims } => {
                header(buf, CLASS_ARRAY, 3, [0, 0, 0], self.disk_size())?;
                let rank = u8::try_from(dims.len())
                    .map_err(|_| too_large(format!("array rank {}", dims.len())))?;
                buf.push(rank);
                for &d in dims {
                    let d = u32::try_from(d).map_err(|_| too_large(format!("array dimension {d}")))?;
                    buf.extend_from_slice(&d.to_le_bytes());
                }
                base.encode_into(buf)
            }
            TypeDesc::Compound { members, .. } => {
                let n = u16::try_from(members.len())
                    .map_err(|_| too_large(format!("{} compound members", members.len())))?;
                let disk_size = self.disk_size();
                let [lo, hi] = n.to_le_bytes();
                header(buf, CLASS_COMPOUND, 3, [lo, hi, 0], disk_size)?;
                let ob = offset_bytes_for_size(disk_size);
                let mut growth = 0;
                for member in members {
                    buf.extend_from_slice(member.name.as_bytes());
                    buf.push(0);
                    let offset = (member.offset + growth) as u64;
                    buf.extend_from_slice(&offset.to_le_bytes()[..ob]);
                    member.desc.encode_into(buf)?;
                    growth += member.desc.disk_growth();
                }
                Ok(())
            }
        }
    }

    /// Decodes one datatype message into the memory form of the type.
    /// Returns the type and the bytes consumed.
    pub(crate) fn decode(data: &[u8]) -> Outcome<(TypeDesc, usize)> {
        decode_at(data, 0)
    }
}

fn decode_at(data: &[u8], depth: usize) -> Outcome<(TypeDesc, usize)> {
    if depth > MAX_NESTING {
        return Err(decode_error("datatype nesting is too deep"));
    }
    ensure_len(data, 0, 8)?;
    let class = data[0] & 0x0F;
    let version = data[0] >> 4;
    let (bf0, bf1) = (data[1], data[2]);
    let size = LittleEndian::read_u32(&data[4..8]) as usize;
    let mut pos = 8;
    match class {
        CLASS_FIXED | CLASS_BITFIELD => {
            ensure_len(data, pos, 4)?;
            pos += 4;
            check_order(bf0)?;
            if size == 0 {
                return Err(decode_error("zero-sized datatype"));
            }
            let desc = if class == CLASS_FIXED {
                TypeDesc::Integer { size, signed: bf0 & 0x08 != 0 }
            } else {
                TypeDesc::Bitfield { size }
            };
            Ok((desc, pos))
        }
        CLASS_FLOAT => {
            ensure_len(data, pos, 12)?;
            pos += 12;
            if bf0 & 0x40 != 0 {
                return Err(unsupported("VAX float byte order is not supported"));
            }
            check_order(bf0)?;
            if size != 4 && size != 8 {
                return Err(unsupported(format!("{size}-byte floats are not supported")));
            }
            Ok((TypeDesc::Float { size }, pos))
        }
        CLASS_STRING => {
            if size == 0 {
                return Err(decode_error("zero-sized string datatype"));
            }
            Ok((
                TypeDesc::String {
                    size,
                    pad: parse_pad(bf0 & 0x0F)?,
                    cset: parse_cset(bf0 >> 4)?,
                },
                pos,
            ))
        }
        CLASS_VLEN => {
            if bf0 & 0x0F != 1 {
                return Err(unsupported("variable-length sequences are not supported"));
            }
            let cset = parse_cset(bf1 & 0x0F)?;
            let (_, consumed) = decode_at(&data[pos..], depth + 1)?;
            pos += consumed;
            Ok((TypeDesc::VarString { cset }, pos))
        }
        CLASS_ARRAY => {
            if version != 3 {
                return Err(unsupported(format!("array datatype version {version}")));
            }
            ensure_len(data, pos, 1)?;
            let ndims = data[pos] as usize;
            pos += 1;
            if ndims == 0 || ndims > MAX_RANK {
                return Err(decode_error(format!("invalid array rank {ndims}")));
            }
            ensure_len(data, pos, ndims * 4)?;
            let dims: Vec<u64> = (0..ndims)
                .map(|i| LittleEndian::read_u32(&data[pos + i * 4..]) as u64)
                .collect();
            pos += ndims * 4;
            if dims.contains(&0) {
                return Err(decode_error("zero-sized array dimension"));
            }
            let (base, consumed) = decode_at(&data[pos..], depth + 1)?;
            pos += consumed;
            let desc = TypeDesc::array(base, dims).map_err(|f| decode_error(f.desc))?;
            // The disk size must fit in memory as well.
            desc.disk_growth_checked()?;
            Ok((desc, pos))
        }
        CLASS_COMPOUND => {
            let count = (bf0 as usize) | ((bf1 as usize) << 8);
            let mut members = Vec::with_capacity(count.min(data.len() / 8));
            for _ in 0..count {
                let (name, used) = read_null_terminated_string(data, pos)?;
                pos += match version {
                    1 | 2 => used.div_ceil(8) * 8,
                    3 => used,
                    other => return Err(unsupported(format!("compound datatype version {other}"))),
                };
                let offset = match version {
                    1 | 2 => {
                        ensure_len(data, pos, 4)?;
                        pos += 4;
                        LittleEndian::read_u32(&data[pos - 4..]) as usize
                    }
                    _ => {
                        let ob = offset_bytes_for_size(size);
                        ensure_len(data, pos, ob)?;
                        pos += ob;
                        LittleEndian::read_uint(&data[pos - ob..], ob) as usize
                    }
                };
                let mut dims = Vec::new();
                if version == 1 {
                    ensure_len(data, pos, 28)?;
                    let ndims = data[pos] as usize;
                    if ndims > 4 {
                        return Err(decode_error(format!("invalid member rank {ndims}")));
                    }
                    dims = (0..ndims)
                        .map(|i| LittleEndian::read_u32(&data[pos + 12 + i * 4..]) as u64)
                        .collect();
                    pos += 28;
                }
                let (mut desc, consumed) = decode_at(&data[pos..], depth + 1)?;
                pos += consumed;
                if !dims.is_empty() {
                    desc = TypeDesc::array(desc, dims).map_err(|f| decode_error(f.desc))?;
                }
                members.push(Member { name, offset, desc });
            }
            Ok((compound_from_disk(size, members)?, pos))
        }
        other => Err(unsupported(format!("datatype class {other} is not supported"))),
    }
}

/// Rebuilds the memory layout of a compound from its file layout: each
/// variable-length member shrinks from a heap reference to a pointer, and
/// later members move down by the accumulated difference.
fn compound_from_disk(disk_size: usize, mut members: Vec<Member>) -> Outcome<TypeDesc> {
    members.sort_by_key(|m| m.offset);
    let mut growth = 0usize;
    let mut placed = Vec::with_capacity(members.len());
    for member in members {
        let offset = member
            .offset
            .checked_sub(growth)
            .ok_or_else(|| decode_error(format!("member {:?} overlaps its predecessor", member.name)))?;
        growth += member.desc.disk_growth_checked()?;
        placed.push(Member { offset, ..member });
    }
    let size = disk_size
        .checked_sub(growth)
        .ok_or_else(|| decode_error("compound size is smaller than its members"))?;
    let mut desc = TypeDesc::Compound {
        size,
        members: Vec::with_capacity(placed.len()),
    };
    for member in placed {
        desc.insert_member(member.name, member.offset, member.desc)
            .map_err(|f| decode_error(f.desc))?;
    }
    Ok(desc)
}

impl TypeDesc {
    fn disk_growth_checked(&self) -> Outcome<usize> {
        let overflow = || decode_error("datatype too large");
        match self {
            TypeDesc::VarString { .. } => Ok(VL_DISK_SIZE - VL_SLOT),
            TypeDesc::Array { base, dims } => dims.iter().try_fold(base.disk_growth_checked()?, |acc, &d| {
                usize::try_from(d)
                    .ok()
                    .and_then(|d| acc.checked_mul(d))
                    .ok_or_else(overflow)
            }),
            TypeDesc::Compound { members, .. } => members.iter().try_fold(0usize, |acc, m| {
                acc.checked_add(m.desc.disk_growth_checked()?).ok_or_else(overflow)
            }),
            _ => Ok(0),
        }
    }
}

fn header(buf: &mut Vec<u8>, class: u8, version: u8, bf: [u8; 3], size: usize) -> Outcome<()> {
    let size = u32::try_from(size).map_err(|_| too_large(format!("{size}-byte datatype")))?;
    buf.push((class & 0x0F) | ((version & 0x0F) << 4));
    buf.extend_from_slice(&bf);
    buf.extend_from_slice(&size.to_le_bytes());
    Ok(())
}

fn push_precision(buf: &mut Vec<u8>, size: usize) -> Outcome<()> {
    let bits = size
        .checked_mul(8)
        .and_then(|bits| u16::try_from(bits).ok())
        .ok_or_else(|| too_large(format!("{size}-byte numeric type")))?;
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&bits.to_le_bytes());
    Ok(())
}

fn check_order(bf0: u8) -> Outcome<()> {
    if bf0 & 0x01 != ORDER {
        return Err(unsupported("stored byte order differs from the host"));
    }
    Ok(())
}

fn offset_bytes_for_size(compound_size: usize) -> usize {
    if compound_size <= 0xFF {
        1
    } else if compound_size <= 0xFFFF {
        2
    } else if compound_size <= 0xFF_FFFF {
        3
    } else {
        4
    }
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Outcome<()> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(decode_error(format!(
            "datatype message truncated: need {needed} bytes at {offset}, have {}",
            data.len()
        ))),
    }
}

fn read_null_terminated_string(data: &[u8], offset: usize) -> Outcome<(String, usize)> {
    let remaining = data.get(offset..).unwrap_or_default();
    let end = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| decode_error("unterminated member name"))?;
    let name = std::str::from_utf8(&remaining[..end])
        .map_err(|_| decode_error("member name is not valid UTF-8"))?;
    Ok((name.to_owned(), end + 1))
}

fn parse_pad(val: u8) -> Outcome<H5T_str_t> {
    match val {
        0 => Ok(H5T_str_t::H5T_STR_NULLTERM),
        1 => Ok(H5T_str_t::H5T_STR_NULLPAD),
        2 => Ok(H5T_str_t::H5T_STR_SPACEPAD),
        other => Err(decode_error(format!("invalid string padding {other}"))),
    }
}

fn parse_cset(val: u8) -> Outcome<H5T_cset_t> {
    match val {
        0 => Ok(H5T_cset_t::H5T_CSET_ASCII),
        1 => Ok(H5T_cset_t::H5T_CSET_UTF8),
        other => Err(decode_error(format!("invalid character set {other}"))),
    }
}

fn unsupported(desc: impl Into<String>) -> Failure {
    Failure::new(H5E_major_t::H5E_DATATYPE, H5E_minor_t::H5E_UNSUPPORTED, desc)
}

fn too_large(what: String) -> Failure {
    Failure::new(
        H5E_major_t::H5E_DATATYPE,
        H5E_minor_t::H5E_CANTENCODE,
        format!("{what} does not fit the file format"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32() -> TypeDesc {
        TypeDesc::Integer { size: 4, signed: true }
    }

    fn compound(size: usize) -> TypeDesc {
        TypeDesc::Compound {
            size,
            members: Vec::new(),
        }
    }

    #[test]
    fn integer_header_layout() {
        let buf = TypeDesc::Integer { size: 2, signed: false }.encode().unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[1], 0x00);
        assert_eq!(LittleEndian::read_u32(&buf[4..8]), 2);
        assert_eq!(LittleEndian::read_u16(&buf[10..12]), 16);
    }

    #[test]
    fn nested_compound_parses_back() {
        let mut inner = compound(12);
        inner.insert_member("x".into(), 0, TypeDesc::Float { size: 8 }).unwrap();
        inner
            .insert_member(
                "tags".into(),
                8,
                TypeDesc::Array {
                    base: Box::new(TypeDesc::Integer { size: 1, signed: false }),
                    dims: vec![2, 2],
                },
            )
            .unwrap();
        let mut outer = compound(24);
        outer.insert_member("inner".into(), 0, inner).unwrap();
        outer
            .insert_member("name".into(), 16, TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_UTF8 })
            .unwrap();

        let bytes = outer.encode().unwrap();
        let (parsed, used) = TypeDesc::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(parsed, outer);
        assert!(parsed.has_vlen());
    }

    #[test]
    fn members_stay_sorted_by_offset() {
        let mut ty = compound(8);
        ty.insert_member("b".into(), 4, int32()).unwrap();
        ty.insert_member("a".into(), 0, int32()).unwrap();
        let TypeDesc::Compound { members, .. } = ty else { unreachable!() };
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn insert_rejects_overlap_bounds_and_duplicates() {
        let mut ty = compound(8);
        ty.insert_member("a".into(), 0, int32()).unwrap();
        assert!(ty.insert_member("b".into(), 2, int32()).is_err());
        assert!(ty.insert_member("c".into(), 6, int32()).is_err());
        assert!(ty.insert_member("a".into(), 4, int32()).is_err());
        assert!(ty.insert_member("d".into(), 4, int32()).is_ok());
    }

    #[test]
    fn truncated_message_is_a_decode_error() {
        let bytes = int32().encode().unwrap();
        let err = TypeDesc::decode(&bytes[..6]).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }

    #[test]
    fn vlen_strings_are_string_class() {
        let ty = TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_ASCII };
        assert_eq!(ty.class(), H5T_class_t::H5T_STRING);
        assert_eq!(ty.size(), std::mem::size_of::<usize>());
        assert_eq!(ty.disk_size(), 16);
    }

    #[test]
    fn float_records_its_sign_bit() {
        let single = TypeDesc::Float { size: 4 }.encode().unwrap();
        let double = TypeDesc::Float { size: 8 }.encode().unwrap();
        assert_eq!(single[2], 31);
        assert_eq!(double[2], 63);
        assert_eq!(single[1] & 0x20, 0x20);
    }

    #[test]
    fn vlen_members_widen_in_the_file() {
        let mut ty = compound(16);
        ty.insert_member("name".into(), 0, TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_UTF8 })
            .unwrap();
        ty.insert_member("n".into(), 8, int32()).unwrap();
        assert_eq!(ty.disk_size(), 16 + VL_DISK_SIZE - VL_SLOT);

        let bytes = ty.encode().unwrap();
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]) as usize, ty.disk_size());
        // "name\0" then a one-byte offset, then the vlen message.
        assert_eq!(bytes[13], 0);
        let (parsed, _) = TypeDesc::decode(&bytes).unwrap();
        assert_eq!(parsed, ty);
    }

    #[test]
    fn foreign_byte_order_is_unsupported() {
        let mut bytes = int32().encode().unwrap();
        bytes[1] ^= 0x01;
        let err = TypeDesc::decode(&bytes).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_UNSUPPORTED);
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let mut ty = int32();
        for _ in 0..40 {
            ty = TypeDesc::array(ty, vec![1]).unwrap();
        }
        let bytes = ty.encode().unwrap();
        let err = TypeDesc::decode(&bytes).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }

    #[test]
    fn oversized_dimensions_do_not_truncate() {
        let err = TypeDesc::array(TypeDesc::Bitfield { size: 1 }, vec![1 << 33])
            .unwrap()
            .encode()
            .unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTENCODE);
        assert!(TypeDesc::array(int32(), vec![u64::MAX, 2]).is_err());
    }

    #[test]
    fn compound_member_count_is_bounded_by_input() {
        // Header claims 65535 members but carries none.
        let mut bytes = vec![0x36, 0xFF, 0xFF, 0, 8, 0, 0, 0];
        bytes.extend_from_slice(b"a\0");
        let err = TypeDesc::decode(&bytes).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }
}
