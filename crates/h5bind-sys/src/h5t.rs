//! Datatypes: the byte layout of one element.

use std::os::raw::{c_char, c_int, c_uint};

use crate::engine::dtype::TypeDesc;
use crate::engine::{self, malloc_bytes, read_dims, read_name, Failure, Object};
use crate::h5::{herr_t, hsize_t, htri_t, size_t};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::{hid_t, make_id, H5I_type_t, H5I_INVALID_HID};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5T_class_t {
    H5T_NO_CLASS = -1,
    H5T_INTEGER = 0,
    H5T_FLOAT = 1,
    H5T_TIME = 2,
    H5T_STRING = 3,
    H5T_BITFIELD = 4,
    H5T_OPAQUE = 5,
    H5T_COMPOUND = 6,
    H5T_REFERENCE = 7,
    H5T_ENUM = 8,
    H5T_VLEN = 9,
    H5T_ARRAY = 10,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5T_sign_t {
    H5T_SGN_ERROR = -1,
    H5T_SGN_NONE = 0,
    H5T_SGN_2 = 1,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5T_cset_t {
    H5T_CSET_ERROR = -1,
    H5T_CSET_ASCII = 0,
    H5T_CSET_UTF8 = 1,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5T_str_t {
    H5T_STR_ERROR = -1,
    H5T_STR_NULLTERM = 0,
    H5T_STR_NULLPAD = 1,
    H5T_STR_SPACEPAD = 2,
}

/// Size marking a variable-length string in [`H5Tset_size`].
pub const H5T_VARIABLE: size_t = size_t::MAX;

/// Highest supported array rank.
pub const H5T_ARRAY_MAX_RANK: c_uint = 32;

const fn predefined(serial: i64) -> hid_t {
    make_id(H5I_type_t::H5I_DATATYPE, serial)
}

pub const H5T_NATIVE_INT8: hid_t = predefined(1);
pub const H5T_NATIVE_INT16: hid_t = predefined(2);
pub const H5T_NATIVE_INT32: hid_t = predefined(3);
pub const H5T_NATIVE_INT64: hid_t = predefined(4);
pub const H5T_NATIVE_UINT8: hid_t = predefined(5);
pub const H5T_NATIVE_UINT16: hid_t = predefined(6);
pub const H5T_NATIVE_UINT32: hid_t = predefined(7);
pub const H5T_NATIVE_UINT64: hid_t = predefined(8);
pub const H5T_NATIVE_FLOAT: hid_t = predefined(9);
pub const H5T_NATIVE_DOUBLE: hid_t = predefined(10);
/// 8-bit bitfield.
pub const H5T_NATIVE_B8: hid_t = predefined(11);
/// One-byte null-terminated ASCII string; copy and resize it to build text
/// types.
pub const H5T_C_S1: hid_t = predefined(12);

fn register_type(lib: &mut engine::Library, desc: TypeDesc) -> hid_t {
    lib.register(Object::Datatype { desc, locked: false })
}

pub extern "C" fn H5Tcopy(type_id: hid_t) -> hid_t {
    engine::api("H5Tcopy", H5I_INVALID_HID, |lib| {
        let desc = lib.datatype(type_id)?.clone();
        Ok(register_type(lib, desc))
    })
}

/// Creates an empty type of `class`. Only compound types can be created
/// this way.
pub extern "C" fn H5Tcreate(class: H5T_class_t, size: size_t) -> hid_t {
    engine::api("H5Tcreate", H5I_INVALID_HID, |lib| {
        if class != H5T_class_t::H5T_COMPOUND {
            return Err(Failure::new(
                H5E_major_t::H5E_DATATYPE,
                H5E_minor_t::H5E_UNSUPPORTED,
                format!("cannot create a {class:?} type"),
            ));
        }
        if size == 0 {
            return Err(Failure::args("compound size must be positive"));
        }
        Ok(register_type(lib, TypeDesc::Compound { size, members: Vec::new() }))
    })
}

pub extern "C" fn H5Tclose(type_id: hid_t) -> herr_t {
    engine::api("H5Tclose", -1, |lib| {
        lib.release(type_id, Some(H5I_type_t::H5I_DATATYPE))?;
        Ok(0)
    })
}

/// Adds member `name` of type `field_id` at byte `offset` of a compound.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Tinsert(
    parent_id: hid_t,
    name: *const c_char,
    offset: size_t,
    field_id: hid_t,
) -> herr_t {
    engine::api("H5Tinsert", -1, |lib| {
        let name = read_name(name)?;
        let field = lib.datatype(field_id)?.clone();
        lib.datatype_mut(parent_id)?.insert_member(name, offset, field)?;
        Ok(0)
    })
}

/// Creates an array type of `ndims` dimensions over `base_id`.
///
/// # Safety
/// `dims` must point to `ndims` values.
pub unsafe extern "C" fn H5Tarray_create2(base_id: hid_t, ndims: c_uint, dims: *const hsize_t) -> hid_t {
    engine::api("H5Tarray_create2", H5I_INVALID_HID, |lib| {
        if ndims == 0 || ndims > H5T_ARRAY_MAX_RANK {
            return Err(Failure::args(format!("invalid array rank {ndims}")));
        }
        let dims = read_dims(dims, ndims as usize)?;
        if dims.contains(&0) {
            return Err(Failure::args("zero-sized array dimension"));
        }
        let base = lib.datatype(base_id)?.clone();
        Ok(register_type(lib, TypeDesc::array(base, dims)?))
    })
}

pub extern "C" fn H5Tget_array_ndims(type_id: hid_t) -> c_int {
    engine::api("H5Tget_array_ndims", -1, |lib| match lib.datatype(type_id)? {
        TypeDesc::Array { dims, .. } => Ok(dims.len() as c_int),
        _ => Err(Failure::bad_type("not an array datatype")),
    })
}

/// Copies the array dimensions out and returns the rank.
///
/// # Safety
/// `dims` must be valid for writes of the array's rank.
pub unsafe extern "C" fn H5Tget_array_dims2(type_id: hid_t, dims: *mut hsize_t) -> c_int {
    engine::api("H5Tget_array_dims2", -1, |lib| match lib.datatype(type_id)? {
        TypeDesc::Array { dims: array_dims, .. } => {
            if dims.is_null() {
                return Err(Failure::args("null dimension array"));
            }
            std::ptr::copy_nonoverlapping(array_dims.as_ptr(), dims, array_dims.len());
            Ok(array_dims.len() as c_int)
        }
        _ => Err(Failure::bad_type("not an array datatype")),
    })
}

/// Resizes a string type. [`H5T_VARIABLE`] turns it into a
/// variable-length string; compound types may only grow.
pub extern "C" fn H5Tset_size(type_id: hid_t, size: size_t) -> herr_t {
    engine::api("H5Tset_size", -1, |lib| {
        let desc = lib.datatype_mut(type_id)?;
        let text = match &*desc {
            TypeDesc::String { cset, pad, .. } => Some((*cset, *pad)),
            TypeDesc::VarString { cset } => Some((*cset, H5T_str_t::H5T_STR_NULLTERM)),
            _ => None,
        };
        if let Some((cset, pad)) = text {
            *desc = match size {
                0 => return Err(Failure::args("string size must be positive")),
                H5T_VARIABLE => TypeDesc::VarString { cset },
                size => TypeDesc::String { size, cset, pad },
            };
            return Ok(0);
        }
        match desc {
            TypeDesc::Compound { size: current, members } => {
                let end = members
                    .iter()
                    .map(|m| m.offset + m.desc.size())
                    .max()
                    .unwrap_or(0);
                if size < end || size == 0 {
                    return Err(Failure::args(format!("size {size} truncates compound members")));
                }
                *current = size;
                Ok(0)
            }
            _ => Err(Failure::new(
                H5E_major_t::H5E_DATATYPE,
                H5E_minor_t::H5E_UNSUPPORTED,
                "size of this datatype class cannot be changed",
            )),
        }
    })
}

/// Element size in bytes, 0 on failure.
pub extern "C" fn H5Tget_size(type_id: hid_t) -> size_t {
    engine::api("H5Tget_size", 0, |lib| Ok(lib.datatype(type_id)?.size()))
}

pub extern "C" fn H5Tget_class(type_id: hid_t) -> H5T_class_t {
    engine::api("H5Tget_class", H5T_class_t::H5T_NO_CLASS, |lib| {
        Ok(lib.datatype(type_id)?.class())
    })
}

pub extern "C" fn H5Tget_sign(type_id: hid_t) -> H5T_sign_t {
    engine::api("H5Tget_sign", H5T_sign_t::H5T_SGN_ERROR, |lib| match lib.datatype(type_id)? {
        TypeDesc::Integer { signed: true, .. } => Ok(H5T_sign_t::H5T_SGN_2),
        TypeDesc::Integer { signed: false, .. } => Ok(H5T_sign_t::H5T_SGN_NONE),
        _ => Err(Failure::bad_type("not an integer datatype")),
    })
}

pub extern "C" fn H5Tset_cset(type_id: hid_t, cset: H5T_cset_t) -> herr_t {
    engine::api("H5Tset_cset", -1, |lib| {
        if cset == H5T_cset_t::H5T_CSET_ERROR {
            return Err(Failure::args("invalid character set"));
        }
        match lib.datatype_mut(type_id)? {
            TypeDesc::String { cset: current, .. } | TypeDesc::VarString { cset: current } => {
                *current = cset;
                Ok(0)
            }
            _ => Err(Failure::bad_type("not a string datatype")),
        }
    })
}

pub extern "C" fn H5Tget_cset(type_id: hid_t) -> H5T_cset_t {
    engine::api("H5Tget_cset", H5T_cset_t::H5T_CSET_ERROR, |lib| match lib.datatype(type_id)? {
        TypeDesc::String { cset, .. } | TypeDesc::VarString { cset } => Ok(*cset),
        _ => Err(Failure::bad_type("not a string datatype")),
    })
}

pub extern "C" fn H5Tset_strpad(type_id: hid_t, strpad: H5T_str_t) -> herr_t {
    engine::api("H5Tset_strpad", -1, |lib| {
        if strpad == H5T_str_t::H5T_STR_ERROR {
            return Err(Failure::args("invalid string padding"));
        }
        match lib.datatype_mut(type_id)? {
            TypeDesc::String { pad, .. } => {
                *pad = strpad;
                Ok(0)
            }
            TypeDesc::VarString { .. } => Ok(0),
            _ => Err(Failure::bad_type("not a string datatype")),
        }
    })
}

pub extern "C" fn H5Tget_strpad(type_id: hid_t) -> H5T_str_t {
    engine::api("H5Tget_strpad", H5T_str_t::H5T_STR_ERROR, |lib| match lib.datatype(type_id)? {
        TypeDesc::String { pad, .. } => Ok(*pad),
        TypeDesc::VarString { .. } => Ok(H5T_str_t::H5T_STR_NULLTERM),
        _ => Err(Failure::bad_type("not a string datatype")),
    })
}

pub extern "C" fn H5Tis_variable_str(type_id: hid_t) -> htri_t {
    engine::api("H5Tis_variable_str", -1, |lib| {
        Ok(htri_t::from(matches!(lib.datatype(type_id)?, TypeDesc::VarString { .. })))
    })
}

fn members(desc: &TypeDesc) -> engine::Outcome<&[engine::dtype::Member]> {
    match desc {
        TypeDesc::Compound { members, .. } => Ok(members),
        _ => Err(Failure::bad_type("not a compound datatype")),
    }
}

fn member(desc: &TypeDesc, idx: c_uint) -> engine::Outcome<&engine::dtype::Member> {
    members(desc)?.get(idx as usize).ok_or_else(|| {
        Failure::new(
            H5E_major_t::H5E_ARGS,
            H5E_minor_t::H5E_BADRANGE,
            format!("member index {idx} out of range"),
        )
    })
}

pub extern "C" fn H5Tget_nmembers(type_id: hid_t) -> c_int {
    engine::api("H5Tget_nmembers", -1, |lib| {
        Ok(members(lib.datatype(type_id)?)?.len() as c_int)
    })
}

/// Name of member `idx`, allocated with the C allocator. Release it with
/// `H5free_memory`. Null on failure.
pub extern "C" fn H5Tget_member_name(type_id: hid_t, idx: c_uint) -> *mut c_char {
    engine::api("H5Tget_member_name", std::ptr::null_mut(), |lib| {
        malloc_bytes(member(lib.datatype(type_id)?, idx)?.name.as_bytes())
    })
}

/// Byte offset of member `idx`. Returns 0 on failure, which is also a valid
/// offset; check the error stack to tell them apart.
pub extern "C" fn H5Tget_member_offset(type_id: hid_t, idx: c_uint) -> size_t {
    engine::api("H5Tget_member_offset", 0, |lib| {
        Ok(member(lib.datatype(type_id)?, idx)?.offset)
    })
}

/// Opens a copy of the type of member `idx`.
pub extern "C" fn H5Tget_member_type(type_id: hid_t, idx: c_uint) -> hid_t {
    engine::api("H5Tget_member_type", H5I_INVALID_HID, |lib| {
        let desc = member(lib.datatype(type_id)?, idx)?.desc.clone();
        Ok(register_type(lib, desc))
    })
}

/// Opens a copy of the element type of an array type.
pub extern "C" fn H5Tget_super(type_id: hid_t) -> hid_t {
    engine::api("H5Tget_super", H5I_INVALID_HID, |lib| match lib.datatype(type_id)? {
        TypeDesc::Array { base, .. } => {
            let base = (**base).clone();
            Ok(register_type(lib, base))
        }
        _ => Err(Failure::bad_type("datatype has no base type")),
    })
}

/// Structural equality of two types.
pub extern "C" fn H5Tequal(type1_id: hid_t, type2_id: hid_t) -> htri_t {
    engine::api("H5Tequal", -1, |lib| {
        Ok(htri_t::from(lib.datatype(type1_id)? == lib.datatype(type2_id)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;
    use std::ffi::CStr;

    #[test]
    fn compound_members_read_back() {
        let ty = H5Tcreate(H5T_class_t::H5T_COMPOUND, 16);
        unsafe {
            assert_eq!(H5Tinsert(ty, c"id".as_ptr(), 0, H5T_NATIVE_UINT32), 0);
            assert_eq!(H5Tinsert(ty, c"value".as_ptr(), 8, H5T_NATIVE_DOUBLE), 0);
        }
        assert_eq!(H5Tget_class(ty), H5T_class_t::H5T_COMPOUND);
        assert_eq!(H5Tget_nmembers(ty), 2);
        assert_eq!(H5Tget_member_offset(ty, 1), 8);

        let name = H5Tget_member_name(ty, 1);
        assert_eq!(unsafe { CStr::from_ptr(name) }.to_str().unwrap(), "value");
        unsafe { crate::h5::H5free_memory(name.cast()) };

        let member = H5Tget_member_type(ty, 0);
        assert_eq!(H5Tequal(member, H5T_NATIVE_UINT32), 1);
        assert_eq!(H5Tget_sign(member), H5T_sign_t::H5T_SGN_NONE);
        H5Tclose(member);
        H5Tclose(ty);
    }

    #[test]
    fn overlapping_insert_fails() {
        H5Eset_auto(false);
        let ty = H5Tcreate(H5T_class_t::H5T_COMPOUND, 8);
        unsafe {
            assert_eq!(H5Tinsert(ty, c"a".as_ptr(), 0, H5T_NATIVE_INT32), 0);
            assert!(H5Tinsert(ty, c"b".as_ptr(), 2, H5T_NATIVE_INT32) < 0);
        }
        H5Tclose(ty);
    }

    #[test]
    fn predefined_types_are_locked() {
        H5Eset_auto(false);
        assert!(H5Tset_size(H5T_C_S1, 8) < 0);
        assert_eq!(H5Tget_size(H5T_C_S1), 1);
        assert!(H5Tclose(H5T_NATIVE_DOUBLE) < 0);
    }

    #[test]
    fn strings_fixed_and_variable() {
        let fixed = H5Tcopy(H5T_C_S1);
        assert_eq!(H5Tset_size(fixed, 12), 0);
        assert_eq!(H5Tset_cset(fixed, H5T_cset_t::H5T_CSET_UTF8), 0);
        assert_eq!(H5Tset_strpad(fixed, H5T_str_t::H5T_STR_NULLPAD), 0);
        assert_eq!(H5Tget_size(fixed), 12);
        assert_eq!(H5Tis_variable_str(fixed), 0);

        let var = H5Tcopy(fixed);
        assert_eq!(H5Tset_size(var, H5T_VARIABLE), 0);
        assert_eq!(H5Tis_variable_str(var), 1);
        assert_eq!(H5Tget_class(var), H5T_class_t::H5T_STRING);
        assert_eq!(H5Tget_cset(var), H5T_cset_t::H5T_CSET_UTF8);
        assert_eq!(H5Tget_size(var), std::mem::size_of::<usize>());
        H5Tclose(fixed);
        H5Tclose(var);
    }

    #[test]
    fn array_dims_read_back() {
        let dims = [2u64, 3];
        let arr = unsafe { H5Tarray_create2(H5T_NATIVE_FLOAT, 2, dims.as_ptr()) };
        assert_eq!(H5Tget_class(arr), H5T_class_t::H5T_ARRAY);
        assert_eq!(H5Tget_size(arr), 24);
        assert_eq!(H5Tget_array_ndims(arr), 2);
        let mut out = [0u64; 2];
        assert_eq!(unsafe { H5Tget_array_dims2(arr, out.as_mut_ptr()) }, 2);
        assert_eq!(out, dims);
        let base = H5Tget_super(arr);
        assert_eq!(H5Tequal(base, H5T_NATIVE_FLOAT), 1);
        H5Tclose(base);
        H5Tclose(arr);
    }
}
