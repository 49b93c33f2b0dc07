//! Moving element bytes between caller memory and stored payloads.
//!
//! Transfers walk the datatype and touch only member bytes, so padding in
//! caller structs is never read. Variable-length strings cross the boundary
//! as C string pointers: writes copy the pointed-to bytes, reads hand out
//! `malloc`-allocated copies the caller frees with `H5free_memory`.

use std::ffi::CStr;
use std::os::raw::c_char;

use super::dtype::{TypeDesc, VL_SLOT as SLOT};
use super::space::strides;
use super::tree::Payload;
use super::{malloc_bytes, Failure, Outcome};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5t::H5T_cset_t;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Bytes { offset: usize, len: usize },
    VarString { offset: usize, cset: H5T_cset_t },
    /// One-byte bitfield; holds a boolean, so only 0 and 1 are valid.
    Flag { offset: usize },
}

/// Whether every byte of an element is copied verbatim.
fn is_plain(desc: &TypeDesc) -> bool {
    match desc {
        TypeDesc::Integer { .. } | TypeDesc::Float { .. } | TypeDesc::String { .. } => true,
        TypeDesc::Bitfield { size } => *size != 1,
        TypeDesc::Array { base, .. } => is_plain(base),
        TypeDesc::VarString { .. } | TypeDesc::Compound { .. } => false,
    }
}

/// Flattens one element of `desc` into byte runs and string slots.
fn segments(desc: &TypeDesc) -> Vec<Segment> {
    fn walk(desc: &TypeDesc, base: usize, out: &mut Vec<Segment>) {
        match desc {
            TypeDesc::VarString { cset } => out.push(Segment::VarString {
                offset: base,
                cset: *cset,
            }),
            TypeDesc::Compound { members, .. } => {
                for member in members {
                    walk(&member.desc, base + member.offset, out);
                }
            }
            TypeDesc::Bitfield { size: 1 } => out.push(Segment::Flag { offset: base }),
            TypeDesc::Array { base: elem, dims } if !is_plain(elem) => {
                let count = dims.iter().product::<u64>() as usize;
                for i in 0..count {
                    walk(elem, base + i * elem.size(), out);
                }
            }
            other => {
                let len = other.size();
                match out.last_mut() {
                    Some(Segment::Bytes { offset, len: prev }) if *offset + *prev == base => {
                        *prev += len;
                    }
                    _ => out.push(Segment::Bytes { offset: base, len }),
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(desc, 0, &mut out);
    out
}

fn invalid_flag(element: usize, byte: u8) -> Failure {
    Failure::new(
        H5E_major_t::H5E_ARGS,
        H5E_minor_t::H5E_BADVALUE,
        format!("element {element}: boolean byte {byte} is neither 0 nor 1"),
    )
}

fn check_conversion(mem: &TypeDesc, stored: &TypeDesc) -> Outcome<()> {
    if mem == stored {
        Ok(())
    } else {
        Err(Failure::new(
            H5E_major_t::H5E_DATATYPE,
            H5E_minor_t::H5E_CANTCONVERT,
            "no conversion path between the memory and stored datatypes",
        ))
    }
}

/// Replaces every element of `payload` with the elements at `buf`.
///
/// # Safety
/// `buf` must point to `payload.space` elements laid out per `mem_type`.
pub(crate) unsafe fn write(payload: &mut Payload, mem_type: &TypeDesc, buf: *const u8) -> Outcome<()> {
    check_conversion(mem_type, &payload.dtype)?;
    let count = payload.space.element_count()?;
    if count == 0 {
        return Ok(());
    }
    if buf.is_null() {
        return Err(Failure::args("null write buffer"));
    }
    let size = payload.dtype.size();
    let segs = segments(&payload.dtype);
    let mut data = vec![0u8; payload.data.len()];
    let mut strings = Vec::new();
    for i in 0..count {
        let src = buf.add(i * size);
        let dst = &mut data[i * size..(i + 1) * size];
        for seg in &segs {
            match *seg {
                Segment::Bytes { offset, len } => {
                    std::ptr::copy_nonoverlapping(src.add(offset), dst[offset..].as_mut_ptr(), len);
                }
                Segment::VarString { offset, cset } => {
                    let ptr = std::ptr::read_unaligned(src.add(offset).cast::<*const c_char>());
                    let slot = if ptr.is_null() {
                        0
                    } else {
                        let bytes = CStr::from_ptr(ptr).to_bytes();
                        if cset == H5T_cset_t::H5T_CSET_UTF8 && std::str::from_utf8(bytes).is_err() {
                            return Err(Failure::new(
                                H5E_major_t::H5E_DATATYPE,
                                H5E_minor_t::H5E_CANTCONVERT,
                                format!("element {i}: string is not valid UTF-8"),
                            ));
                        }
                        strings.push(bytes.to_vec());
                        strings.len()
                    };
                    dst[offset..offset + SLOT].copy_from_slice(&slot.to_ne_bytes());
                }
                Segment::Flag { offset } => {
                    let byte = *src.add(offset);
                    if byte > 1 {
                        return Err(invalid_flag(i, byte));
                    }
                    dst[offset] = byte;
                }
            }
        }
    }
    payload.data = data;
    payload.strings = strings;
    Ok(())
}

/// Copies every element of `payload` into `buf`.
///
/// # Safety
/// `buf` must be valid for writes of `payload.space` elements of `mem_type`.
pub(crate) unsafe fn read(payload: &Payload, mem_type: &TypeDesc, buf: *mut u8) -> Outcome<()> {
    check_conversion(mem_type, &payload.dtype)?;
    let count = payload.space.element_count()?;
    if count == 0 {
        return Ok(());
    }
    if buf.is_null() {
        return Err(Failure::args("null read buffer"));
    }
    let size = payload.dtype.size();
    let segs = segments(&payload.dtype);
    // Stored booleans are checked up front so a bad byte never reaches `buf`.
    for i in 0..count {
        for seg in &segs {
            if let Segment::Flag { offset } = *seg {
                let byte = payload.data[i * size + offset];
                if byte > 1 {
                    return Err(invalid_flag(i, byte));
                }
            }
        }
    }
    let mut allocated: Vec<*mut c_char> = Vec::new();
    for i in 0..count {
        let src = &payload.data[i * size..(i + 1) * size];
        let dst = buf.add(i * size);
        for seg in &segs {
            match *seg {
                Segment::Bytes { offset, len } => {
                    std::ptr::copy_nonoverlapping(src[offset..].as_ptr(), dst.add(offset), len);
                }
                Segment::VarString { offset, .. } => {
                    let mut raw = [0u8; SLOT];
                    raw.copy_from_slice(&src[offset..offset + SLOT]);
                    let slot = usize::from_ne_bytes(raw);
                    let ptr = match slot.checked_sub(1).and_then(|idx| payload.strings.get(idx)) {
                        None => std::ptr::null_mut(),
                        Some(bytes) => match malloc_bytes(bytes) {
                            Ok(ptr) => ptr,
                            Err(failure) => {
                                for ptr in allocated {
                                    libc::free(ptr.cast());
                                }
                                return Err(failure);
                            }
                        },
                    };
                    if !ptr.is_null() {
                        allocated.push(ptr);
                    }
                    std::ptr::write_unaligned(dst.add(offset).cast::<*mut c_char>(), ptr);
                }
                Segment::Flag { offset } => *dst.add(offset) = src[offset],
            }
        }
    }
    Ok(())
}

/// Re-lays out `payload` for a larger extent of the same rank. Elements
/// keep their coordinates; coordinates outside the old extent are zero.
pub(crate) fn relayout(payload: &mut Payload, new_dims: &[u64]) -> Outcome<()> {
    let old_dims = payload.space.dims().to_vec();
    if new_dims.len() != old_dims.len() {
        return Err(Failure::args("new extent has a different rank"));
    }
    if let Some(axis) = (0..old_dims.len()).find(|&axis| new_dims[axis] < old_dims[axis]) {
        return Err(Failure::new(
            H5E_major_t::H5E_DATASPACE,
            H5E_minor_t::H5E_BADRANGE,
            format!(
                "axis {axis}: extent cannot shrink from {} to {}",
                old_dims[axis], new_dims[axis]
            ),
        ));
    }
    let maxdims = payload.space.maxdims().to_vec();
    let new_space = super::space::SpaceDesc::Simple {
        dims: new_dims.to_vec(),
        maxdims,
    };
    let size = payload.dtype.size();
    let count = new_space.element_count()?;
    let len = count
        .checked_mul(size)
        .ok_or_else(|| Failure::nospace("dataset storage too large"))?;
    let mut data = vec![0u8; len];
    let old_strides = strides(&old_dims);
    let new_strides = strides(new_dims);
    let old_count = payload.space.element_count()?;
    for old_index in 0..old_count as u64 {
        let new_index: u64 = (0..old_dims.len())
            .map(|axis| (old_index / old_strides[axis]) % old_dims[axis] * new_strides[axis])
            .sum();
        let (from, to) = (old_index as usize * size, new_index as usize * size);
        data[to..to + size].copy_from_slice(&payload.data[from..from + size]);
    }
    payload.data = data;
    payload.space = new_space;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dtype::Member;
    use crate::engine::space::SpaceDesc;

    fn u16_payload(dims: Vec<u64>, maxdims: Vec<u64>) -> Payload {
        let space = SpaceDesc::simple(dims, Some(maxdims)).unwrap();
        Payload::new(TypeDesc::Integer { size: 2, signed: false }, space).unwrap()
    }

    #[test]
    fn padding_is_skipped() {
        let ty = TypeDesc::Compound {
            size: 8,
            members: vec![
                Member { name: "a".into(), offset: 0, desc: TypeDesc::Integer { size: 1, signed: false } },
                Member { name: "b".into(), offset: 4, desc: TypeDesc::Integer { size: 4, signed: false } },
            ],
        };
        assert_eq!(
            segments(&ty),
            vec![Segment::Bytes { offset: 0, len: 1 }, Segment::Bytes { offset: 4, len: 4 }]
        );
    }

    #[test]
    fn adjacent_members_coalesce() {
        let ty = TypeDesc::Compound {
            size: 8,
            members: vec![
                Member { name: "a".into(), offset: 0, desc: TypeDesc::Integer { size: 4, signed: true } },
                Member { name: "b".into(), offset: 4, desc: TypeDesc::Float { size: 4 } },
            ],
        };
        assert_eq!(segments(&ty), vec![Segment::Bytes { offset: 0, len: 8 }]);
    }

    #[test]
    fn mismatched_memory_type_is_rejected() {
        let mut payload = u16_payload(vec![2], vec![2]);
        let values = [1i32, 2];
        let err = unsafe {
            write(&mut payload, &TypeDesc::Integer { size: 4, signed: true }, values.as_ptr().cast())
        }
        .unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTCONVERT);
    }

    #[test]
    fn strings_round_trip_through_malloc() {
        let ty = TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_UTF8 };
        let space = SpaceDesc::simple(vec![2], None).unwrap();
        let mut payload = Payload::new(ty.clone(), space).unwrap();
        let input = [c"héllo".as_ptr(), std::ptr::null()];
        unsafe { write(&mut payload, &ty, input.as_ptr().cast()).unwrap() };

        let mut output = [std::ptr::null_mut::<c_char>(); 2];
        unsafe { read(&payload, &ty, output.as_mut_ptr().cast()).unwrap() };
        assert!(output[1].is_null());
        let text = unsafe { CStr::from_ptr(output[0]) };
        assert_eq!(text.to_str().unwrap(), "héllo");
        unsafe { libc::free(output[0].cast()) };
    }

    #[test]
    fn relayout_keeps_coordinates() {
        let mut payload = u16_payload(vec![2, 3], vec![4, 3]);
        let values: Vec<u16> = (0..6).collect();
        let ty = payload.dtype.clone();
        unsafe { write(&mut payload, &ty, values.as_ptr().cast()).unwrap() };
        relayout(&mut payload, &[3, 3]).unwrap();

        let mut out = vec![0u16; 9];
        unsafe { read(&payload, &ty, out.as_mut_ptr().cast()).unwrap() };
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5, 0, 0, 0]);

        let err = relayout(&mut payload, &[1, 3]).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_BADRANGE);
        assert_eq!(payload.space.dims(), &[3, 3]);
    }

    #[test]
    fn boolean_bytes_must_be_zero_or_one() {
        let ty = TypeDesc::Bitfield { size: 1 };
        let space = SpaceDesc::simple(vec![3], None).unwrap();
        let mut payload = Payload::new(ty.clone(), space).unwrap();
        unsafe { write(&mut payload, &ty, [1u8, 0, 1].as_ptr()).unwrap() };

        let err = unsafe { write(&mut payload, &ty, [1u8, 2, 0].as_ptr()) }.unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_BADVALUE);
        assert_eq!(payload.data, vec![1, 0, 1]);

        // A stored byte outside 0..=1 is refused before the caller sees it.
        payload.data[2] = 7;
        let mut out = [9u8; 3];
        let err = unsafe { read(&payload, &ty, out.as_mut_ptr()) }.unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_BADVALUE);
        assert_eq!(out, [9, 9, 9]);
    }

    #[test]
    fn boolean_members_and_arrays_are_checked() {
        let flags = TypeDesc::array(TypeDesc::Bitfield { size: 1 }, vec![2]).unwrap();
        let ty = TypeDesc::Compound {
            size: 4,
            members: vec![
                Member { name: "n".into(), offset: 0, desc: TypeDesc::Integer { size: 2, signed: false } },
                Member { name: "f".into(), offset: 2, desc: flags },
            ],
        };
        assert_eq!(
            segments(&ty),
            vec![
                Segment::Bytes { offset: 0, len: 2 },
                Segment::Flag { offset: 2 },
                Segment::Flag { offset: 3 },
            ]
        );
        let mut payload = Payload::new(ty.clone(), SpaceDesc::Scalar).unwrap();
        let err = unsafe { write(&mut payload, &ty, [5u8, 0, 1, 3].as_ptr()) }.unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_BADVALUE);
        unsafe { write(&mut payload, &ty, [5u8, 0, 1, 0].as_ptr()).unwrap() };
    }
}
