//! Files.

use std::ffi::OsStr;
use std::os::raw::{c_char, c_uint};
use std::path::Path;

use crate::engine::plist::PlistClass;
use crate::engine::{self, copy_name, read_name, Failure, Object};
use crate::h5::{herr_t, size_t, ssize_t};
use crate::h5i::{hid_t, H5I_type_t, H5I_INVALID_HID};

/// Open for reading only.
pub const H5F_ACC_RDONLY: c_uint = 0x0000;
/// Open for reading and writing.
pub const H5F_ACC_RDWR: c_uint = 0x0001;
/// Create, overwriting any existing file.
pub const H5F_ACC_TRUNC: c_uint = 0x0002;
/// Create, failing if the file exists.
pub const H5F_ACC_EXCL: c_uint = 0x0004;

pub const H5F_OBJ_FILE: c_uint = 0x0001;
pub const H5F_OBJ_DATASET: c_uint = 0x0002;
pub const H5F_OBJ_GROUP: c_uint = 0x0004;
pub const H5F_OBJ_DATATYPE: c_uint = 0x0008;
pub const H5F_OBJ_ATTR: c_uint = 0x0010;
pub const H5F_OBJ_ALL: c_uint =
    H5F_OBJ_FILE | H5F_OBJ_DATASET | H5F_OBJ_GROUP | H5F_OBJ_DATATYPE | H5F_OBJ_ATTR;

/// Counts across every open file in [`H5Fget_obj_count`].
pub const H5F_OBJ_ALL_FILES: hid_t = -1;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H5F_scope_t {
    H5F_SCOPE_LOCAL = 0,
    H5F_SCOPE_GLOBAL = 1,
}

unsafe fn read_path(filename: *const c_char) -> engine::Outcome<String> {
    let name = read_name(filename)?;
    if name.is_empty() {
        return Err(Failure::args("empty file name"));
    }
    Ok(name)
}

/// Creates a file. `flags` must contain exactly one of [`H5F_ACC_TRUNC`]
/// or [`H5F_ACC_EXCL`].
///
/// # Safety
/// `filename` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Fcreate(
    filename: *const c_char,
    flags: c_uint,
    fcpl_id: hid_t,
    fapl_id: hid_t,
) -> hid_t {
    engine::api("H5Fcreate", H5I_INVALID_HID, |lib| {
        let name = read_path(filename)?;
        let trunc = flags & H5F_ACC_TRUNC != 0;
        let excl = flags & H5F_ACC_EXCL != 0;
        if trunc == excl {
            return Err(Failure::args("exactly one of TRUNC and EXCL must be given"));
        }
        let fcpl = lib.plist(fcpl_id, PlistClass::FileCreate)?;
        lib.plist(fapl_id, PlistClass::FileAccess)?;
        lib.create_file(Path::new(OsStr::new(&name)), flags, &fcpl)
    })
}

/// Opens an existing file with [`H5F_ACC_RDONLY`] or [`H5F_ACC_RDWR`].
/// Opening a file that is already open shares its state.
///
/// # Safety
/// `filename` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Fopen(filename: *const c_char, flags: c_uint, fapl_id: hid_t) -> hid_t {
    engine::api("H5Fopen", H5I_INVALID_HID, |lib| {
        let name = read_path(filename)?;
        if flags & !(H5F_ACC_RDWR) != 0 {
            return Err(Failure::args("invalid open flags"));
        }
        lib.plist(fapl_id, PlistClass::FileAccess)?;
        lib.open_file(Path::new(OsStr::new(&name)), flags)
    })
}

/// Releases a file identifier. The file is written out and closed once its
/// last identifier is released; identifiers of objects inside it become
/// stale.
pub extern "C" fn H5Fclose(file_id: hid_t) -> herr_t {
    engine::api("H5Fclose", -1, |lib| {
        lib.release(file_id, Some(H5I_type_t::H5I_FILE))?;
        Ok(0)
    })
}

/// Writes the file containing `object_id` out.
pub extern "C" fn H5Fflush(object_id: hid_t, _scope: H5F_scope_t) -> herr_t {
    engine::api("H5Fflush", -1, |lib| {
        let key = lib
            .object(object_id)?
            .file_key()
            .ok_or_else(|| Failure::bad_type("object is not in a file"))?;
        lib.flush_file(key).map_err(|f| {
            f.context(
                crate::h5e::H5E_major_t::H5E_FILE,
                crate::h5e::H5E_minor_t::H5E_CANTFLUSH,
                "unable to flush file",
            )
        })?;
        Ok(0)
    })
}

/// Reports the access flags `file_id` itself was opened with. Two
/// identifiers on the same file may differ.
///
/// # Safety
/// `intent` must be valid for writes.
pub unsafe extern "C" fn H5Fget_intent(file_id: hid_t, intent: *mut c_uint) -> herr_t {
    engine::api("H5Fget_intent", -1, |lib| {
        let Object::File { file, writable } = lib.object(file_id)? else {
            return Err(Failure::bad_type("not a file identifier"));
        };
        let writable = *writable;
        lib.file(*file)?;
        if intent.is_null() {
            return Err(Failure::args("null output pointer"));
        }
        *intent = if writable { H5F_ACC_RDWR } else { H5F_ACC_RDONLY };
        Ok(0)
    })
}

/// Copies the path of the file containing `obj_id`. Returns its length.
///
/// # Safety
/// `name` must be null or valid for `size` bytes of writes.
pub unsafe extern "C" fn H5Fget_name(obj_id: hid_t, name: *mut c_char, size: size_t) -> ssize_t {
    engine::api("H5Fget_name", -1, |lib| {
        let key = lib
            .object(obj_id)?
            .file_key()
            .ok_or_else(|| Failure::bad_type("object is not in a file"))?;
        let path = lib.file(key)?.path.to_string_lossy().into_owned();
        Ok(copy_name(&path, name, size))
    })
}

/// Counts open identifiers of the kinds in `types` attached to the file of
/// `file_id`, or to any file with [`H5F_OBJ_ALL_FILES`].
pub extern "C" fn H5Fget_obj_count(file_id: hid_t, types: c_uint) -> ssize_t {
    engine::api("H5Fget_obj_count", -1, |lib| {
        let key = if file_id == H5F_OBJ_ALL_FILES {
            None
        } else {
            let key = lib
                .object(file_id)?
                .file_key()
                .ok_or_else(|| Failure::bad_type("object is not in a file"))?;
            lib.file(key)?;
            Some(key)
        };
        Ok(lib.count_in_file(key, types) as ssize_t)
    })
}
