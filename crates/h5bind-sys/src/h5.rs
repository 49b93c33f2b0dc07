//! Library-wide entry points and basic scalar types.

use std::os::raw::{c_int, c_uint, c_void};

use crate::engine::{self, Failure};

pub use libc::{size_t, ssize_t};

pub type herr_t = c_int;
pub type htri_t = c_int;
pub type hsize_t = u64;
pub type hssize_t = i64;
pub type hbool_t = bool;

/// Human-readable version banner of this engine build.
pub const H5_VERS_INFO: &str = concat!("h5bind-sys ", env!("CARGO_PKG_VERSION"));

/// Initializes the library. Every other entry point initializes lazily, so
/// calling this is optional.
pub extern "C" fn H5open() -> herr_t {
    engine::api("H5open", -1, |_| Ok(0))
}

/// Reports the engine version as `(major, minor, release)`.
///
/// # Safety
/// All three pointers must be valid for writes.
pub unsafe extern "C" fn H5get_libversion(
    majnum: *mut c_uint,
    minnum: *mut c_uint,
    relnum: *mut c_uint,
) -> herr_t {
    engine::api("H5get_libversion", -1, |_| {
        if majnum.is_null() || minnum.is_null() || relnum.is_null() {
            return Err(Failure::args("null version output pointer"));
        }
        *majnum = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
        *minnum = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
        *relnum = env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0);
        Ok(0)
    })
}

/// Reports whether this build serializes concurrent callers itself.
///
/// # Safety
/// `is_ts` must be valid for writes.
pub unsafe extern "C" fn H5is_library_threadsafe(is_ts: *mut hbool_t) -> herr_t {
    engine::api("H5is_library_threadsafe", -1, |_| {
        if is_ts.is_null() {
            return Err(Failure::args("null output pointer"));
        }
        *is_ts = cfg!(feature = "threadsafe");
        Ok(0)
    })
}

/// Releases memory the library allocated on the caller's behalf (member
/// names, variable-length strings).
///
/// # Safety
/// `buf` must be null or a pointer previously returned by this library and
/// not yet freed.
pub unsafe extern "C" fn H5free_memory(buf: *mut c_void) -> herr_t {
    libc::free(buf);
    0
}
