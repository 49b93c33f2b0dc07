//! Identifier (handle) management.

use std::os::raw::{c_char, c_int};

use crate::engine::{self, copy_name, Failure};
use crate::h5::{herr_t, hsize_t, htri_t, size_t, ssize_t};

pub type hid_t = i64;

/// Sentinel returned by identifier-producing calls on failure.
pub const H5I_INVALID_HID: hid_t = -1;

/// Kind of object an identifier refers to. Encoded in the identifier's top
/// byte.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5I_type_t {
    H5I_BADID = -1,
    H5I_FILE = 1,
    H5I_GROUP,
    H5I_DATATYPE,
    H5I_DATASPACE,
    H5I_DATASET,
    H5I_ATTR,
    H5I_GENPROP_CLS,
    H5I_GENPROP_LST,
}

pub(crate) const TYPE_SHIFT: u32 = 56;

pub(crate) const fn make_id(ty: H5I_type_t, serial: i64) -> hid_t {
    ((ty as i64) << TYPE_SHIFT) | serial
}

/// Returns the kind of object `id` refers to, or `H5I_BADID`.
pub extern "C" fn H5Iget_type(id: hid_t) -> H5I_type_t {
    engine::api("H5Iget_type", H5I_type_t::H5I_BADID, |lib| {
        Ok(lib.object(id)?.id_type())
    })
}

/// Returns 1 when `id` refers to a live object, 0 when it was released or
/// its file has been closed. Never pushes an error.
pub extern "C" fn H5Iis_valid(id: hid_t) -> htri_t {
    engine::api("H5Iis_valid", -1, |lib| Ok(htri_t::from(lib.is_valid(id))))
}

/// Releases `id`. Returns the remaining reference count (always 0, handles
/// are never shared) or a negative value on failure.
pub extern "C" fn H5Idec_ref(id: hid_t) -> c_int {
    engine::api("H5Idec_ref", -1, |lib| {
        lib.release(id, None)?;
        Ok(0)
    })
}

/// Copies the absolute path of the object `id` refers to into `name`.
///
/// Returns the full path length, excluding the terminating NUL. `name` may
/// be null to query the length.
///
/// # Safety
/// `name` must be null or valid for `size` bytes of writes.
pub unsafe extern "C" fn H5Iget_name(id: hid_t, name: *mut c_char, size: size_t) -> ssize_t {
    engine::api("H5Iget_name", -1, |lib| {
        let path = lib.object_path(id)?;
        Ok(copy_name(&path, name, size))
    })
}

/// Opens a new file identifier for the file containing the object `id`,
/// with the same write intent as `id`.
pub extern "C" fn H5Iget_file_id(id: hid_t) -> hid_t {
    engine::api("H5Iget_file_id", H5I_INVALID_HID, |lib| {
        let object = lib.object(id)?;
        let (Some(key), Some(writable)) = (object.file_key(), object.writable()) else {
            return Err(Failure::args("object is not associated with a file"));
        };
        lib.reopen_file(key, writable)
    })
}

/// Counts the live, caller-owned identifiers of kind `ty`.
///
/// # Safety
/// `num_members` must be valid for writes.
pub unsafe extern "C" fn H5Inmembers(ty: H5I_type_t, num_members: *mut hsize_t) -> herr_t {
    engine::api("H5Inmembers", -1, |lib| {
        if num_members.is_null() {
            return Err(Failure::args("null output pointer"));
        }
        *num_members = lib.count_of_type(ty) as hsize_t;
        Ok(0)
    })
}
