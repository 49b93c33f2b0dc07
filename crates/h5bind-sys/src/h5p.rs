//! Property lists.
//!
//! Each class has a permanent class identifier and a permanent default list.
//! Passing [`H5P_DEFAULT`] wherever a list is expected selects the class
//! defaults.

use std::os::raw::{c_double, c_int, c_void};

use crate::engine::plist::{self, PlistClass, PlistDesc};
use crate::engine::{self, read_dims, Failure, Object};
use crate::h5::{herr_t, hsize_t, size_t};
use crate::h5d::H5D_layout_t;
use crate::h5i::{hid_t, make_id, H5I_type_t, H5I_INVALID_HID};

pub const H5P_DEFAULT: hid_t = 0;

const fn class(serial: i64) -> hid_t {
    make_id(H5I_type_t::H5I_GENPROP_CLS, serial)
}

const fn default_list(serial: i64) -> hid_t {
    make_id(H5I_type_t::H5I_GENPROP_LST, serial)
}

pub const H5P_FILE_CREATE: hid_t = class(1);
pub const H5P_FILE_ACCESS: hid_t = class(2);
pub const H5P_DATASET_CREATE: hid_t = class(3);
pub const H5P_DATASET_ACCESS: hid_t = class(4);
pub const H5P_DATASET_XFER: hid_t = class(5);

pub const H5P_FILE_CREATE_DEFAULT: hid_t = default_list(1);
pub const H5P_FILE_ACCESS_DEFAULT: hid_t = default_list(2);
pub const H5P_DATASET_CREATE_DEFAULT: hid_t = default_list(3);
pub const H5P_DATASET_ACCESS_DEFAULT: hid_t = default_list(4);
pub const H5P_DATASET_XFER_DEFAULT: hid_t = default_list(5);

/// Creates a list of class `cls_id` holding the class defaults.
pub extern "C" fn H5Pcreate(cls_id: hid_t) -> hid_t {
    engine::api("H5Pcreate", H5I_INVALID_HID, |lib| {
        let class = match lib.object(cls_id)? {
            Object::PropClass(class) => *class,
            _ => return Err(Failure::bad_type("not a property list class")),
        };
        Ok(lib.register(Object::PropList(PlistDesc::new(class))))
    })
}

pub extern "C" fn H5Pcopy(plist_id: hid_t) -> hid_t {
    engine::api("H5Pcopy", H5I_INVALID_HID, |lib| {
        let desc = lib.plist_any(plist_id)?.clone();
        Ok(lib.register(Object::PropList(desc)))
    })
}

pub extern "C" fn H5Pclose(plist_id: hid_t) -> herr_t {
    engine::api("H5Pclose", -1, |lib| {
        lib.release(plist_id, Some(H5I_type_t::H5I_GENPROP_LST))?;
        Ok(0)
    })
}

/// Returns the permanent class identifier of a list.
pub extern "C" fn H5Pget_class(plist_id: hid_t) -> hid_t {
    engine::api("H5Pget_class", H5I_INVALID_HID, |lib| {
        Ok(lib.plist_any(plist_id)?.class.class_id())
    })
}

/// Sets chunk dimensions and switches the layout to chunked.
///
/// # Safety
/// `dims` must point to `ndims` values.
pub unsafe extern "C" fn H5Pset_chunk(plist_id: hid_t, ndims: c_int, dims: *const hsize_t) -> herr_t {
    engine::api("H5Pset_chunk", -1, |lib| {
        if ndims <= 0 {
            return Err(Failure::args("chunk rank must be positive"));
        }
        let dims = read_dims(dims, ndims as usize)?;
        lib.plist_mut(plist_id)?.set_chunk(dims)?;
        Ok(0)
    })
}

/// Copies up to `max_ndims` chunk dimensions out. Returns the chunk rank.
///
/// # Safety
/// `dims` must be null or valid for `max_ndims` writes.
pub unsafe extern "C" fn H5Pget_chunk(plist_id: hid_t, max_ndims: c_int, dims: *mut hsize_t) -> c_int {
    engine::api("H5Pget_chunk", -1, |lib| {
        let desc = lib.plist(plist_id, PlistClass::DatasetCreate)?;
        if desc.layout() != H5D_layout_t::H5D_CHUNKED {
            return Err(Failure::bad_type("not a chunked storage layout"));
        }
        let chunk = desc.chunk();
        if !dims.is_null() {
            let n = chunk.len().min(max_ndims.max(0) as usize);
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), dims, n);
        }
        Ok(chunk.len() as c_int)
    })
}

pub extern "C" fn H5Pset_layout(plist_id: hid_t, layout: H5D_layout_t) -> herr_t {
    engine::api("H5Pset_layout", -1, |lib| {
        if layout == H5D_layout_t::H5D_LAYOUT_ERROR {
            return Err(Failure::args("invalid layout"));
        }
        lib.plist_mut(plist_id)?.set_layout(layout)?;
        Ok(0)
    })
}

pub extern "C" fn H5Pget_layout(plist_id: hid_t) -> H5D_layout_t {
    engine::api("H5Pget_layout", H5D_layout_t::H5D_LAYOUT_ERROR, |lib| {
        Ok(lib.plist(plist_id, PlistClass::DatasetCreate)?.layout())
    })
}

/// Sets the user block size of new files: 0 or a power of two of at
/// least 512.
pub extern "C" fn H5Pset_userblock(plist_id: hid_t, size: hsize_t) -> herr_t {
    engine::api("H5Pset_userblock", -1, |lib| {
        let size = usize::try_from(size).map_err(|_| Failure::args("userblock too large"))?;
        let desc = lib.plist_mut(plist_id)?;
        if desc.class != PlistClass::FileCreate {
            return Err(Failure::bad_type("not a file creation property list"));
        }
        desc.set_userblock(size)?;
        Ok(0)
    })
}

/// # Safety
/// `size` must be valid for writes.
pub unsafe extern "C" fn H5Pget_userblock(plist_id: hid_t, size: *mut hsize_t) -> herr_t {
    engine::api("H5Pget_userblock", -1, |lib| {
        let value = lib.plist(plist_id, PlistClass::FileCreate)?.size(plist::USERBLOCK);
        write_out(size, value as hsize_t)
    })
}

pub extern "C" fn H5Pset_sieve_buf_size(plist_id: hid_t, size: size_t) -> herr_t {
    engine::api("H5Pset_sieve_buf_size", -1, |lib| {
        lib.plist_mut(plist_id)?
            .set_size(PlistClass::FileAccess, plist::SIEVE_BUF_SIZE, size)?;
        Ok(0)
    })
}

/// # Safety
/// `size` must be valid for writes.
pub unsafe extern "C" fn H5Pget_sieve_buf_size(plist_id: hid_t, size: *mut size_t) -> herr_t {
    engine::api("H5Pget_sieve_buf_size", -1, |lib| {
        let value = lib
            .plist(plist_id, PlistClass::FileAccess)?
            .get_size(PlistClass::FileAccess, plist::SIEVE_BUF_SIZE)?;
        write_out(size, value)
    })
}

pub extern "C" fn H5Pset_meta_block_size(plist_id: hid_t, size: hsize_t) -> herr_t {
    engine::api("H5Pset_meta_block_size", -1, |lib| {
        let size = usize::try_from(size).map_err(|_| Failure::args("block size too large"))?;
        lib.plist_mut(plist_id)?
            .set_size(PlistClass::FileAccess, plist::META_BLOCK_SIZE, size)?;
        Ok(0)
    })
}

/// # Safety
/// `size` must be valid for writes.
pub unsafe extern "C" fn H5Pget_meta_block_size(plist_id: hid_t, size: *mut hsize_t) -> herr_t {
    engine::api("H5Pget_meta_block_size", -1, |lib| {
        let value = lib
            .plist(plist_id, PlistClass::FileAccess)?
            .get_size(PlistClass::FileAccess, plist::META_BLOCK_SIZE)?;
        write_out(size, value as hsize_t)
    })
}

/// Sets the raw-data chunk cache budget of a dataset access list. Only the
/// byte budget is kept; `rdcc_nslots` and `rdcc_w0` are accepted for
/// interface compatibility.
pub extern "C" fn H5Pset_chunk_cache(
    dapl_id: hid_t,
    _rdcc_nslots: size_t,
    rdcc_nbytes: size_t,
    rdcc_w0: c_double,
) -> herr_t {
    engine::api("H5Pset_chunk_cache", -1, |lib| {
        if !(0.0..=1.0).contains(&rdcc_w0) {
            return Err(Failure::args("preemption policy must be between 0 and 1"));
        }
        lib.plist_mut(dapl_id)?
            .set_size(PlistClass::DatasetAccess, plist::CHUNK_CACHE_NBYTES, rdcc_nbytes)?;
        Ok(0)
    })
}

/// # Safety
/// `rdcc_nbytes` must be null or valid for writes.
pub unsafe extern "C" fn H5Pget_chunk_cache(dapl_id: hid_t, rdcc_nbytes: *mut size_t) -> herr_t {
    engine::api("H5Pget_chunk_cache", -1, |lib| {
        let value = lib
            .plist(dapl_id, PlistClass::DatasetAccess)?
            .get_size(PlistClass::DatasetAccess, plist::CHUNK_CACHE_NBYTES)?;
        write_out(rdcc_nbytes, value)
    })
}

/// Sets the transfer buffer size. Caller-supplied buffers are not used.
pub extern "C" fn H5Pset_buffer(
    plist_id: hid_t,
    size: size_t,
    _tconv: *mut c_void,
    _bkg: *mut c_void,
) -> herr_t {
    engine::api("H5Pset_buffer", -1, |lib| {
        if size == 0 {
            return Err(Failure::args("buffer size must be positive"));
        }
        lib.plist_mut(plist_id)?
            .set_size(PlistClass::DatasetTransfer, plist::BUFFER_SIZE, size)?;
        Ok(0)
    })
}

/// Returns the transfer buffer size, 0 on failure.
pub extern "C" fn H5Pget_buffer(plist_id: hid_t, _tconv: *mut *mut c_void, _bkg: *mut *mut c_void) -> size_t {
    engine::api("H5Pget_buffer", 0, |lib| {
        lib.plist(plist_id, PlistClass::DatasetTransfer)?
            .get_size(PlistClass::DatasetTransfer, plist::BUFFER_SIZE)
    })
}

unsafe fn write_out<T>(ptr: *mut T, value: T) -> engine::Outcome<herr_t> {
    if ptr.is_null() {
        return Err(Failure::args("null output pointer"));
    }
    *ptr = value;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;

    #[test]
    fn defaults_are_immutable() {
        H5Eset_auto(false);
        assert!(H5Pset_sieve_buf_size(H5P_FILE_ACCESS_DEFAULT, 1024) < 0);
        assert!(H5Pclose(H5P_FILE_ACCESS_DEFAULT) < 0);
        let mut size = 0;
        assert_eq!(unsafe { H5Pget_sieve_buf_size(H5P_FILE_ACCESS_DEFAULT, &mut size) }, 0);
        assert_eq!(size, 64 * 1024);
    }

    #[test]
    fn create_copy_and_class() {
        let dcpl = H5Pcreate(H5P_DATASET_CREATE);
        assert_eq!(H5Pget_class(dcpl), H5P_DATASET_CREATE);
        assert_eq!(H5Pget_layout(dcpl), H5D_layout_t::H5D_CONTIGUOUS);

        let chunk = [4u64, 5];
        assert_eq!(unsafe { H5Pset_chunk(dcpl, 2, chunk.as_ptr()) }, 0);
        let copy = H5Pcopy(dcpl);
        assert_eq!(H5Pset_layout(dcpl, H5D_layout_t::H5D_CONTIGUOUS), 0);

        assert_eq!(H5Pget_layout(copy), H5D_layout_t::H5D_CHUNKED);
        let mut out = [0u64; 2];
        assert_eq!(unsafe { H5Pget_chunk(copy, 2, out.as_mut_ptr()) }, 2);
        assert_eq!(out, chunk);
        H5Pclose(copy);
        H5Pclose(dcpl);
    }

    #[test]
    fn setters_check_class() {
        H5Eset_auto(false);
        let fapl = H5Pcreate(H5P_FILE_ACCESS);
        assert!(H5Pset_buffer(fapl, 4096, std::ptr::null_mut(), std::ptr::null_mut()) < 0);
        assert!(H5Pset_userblock(fapl, 512) < 0);
        assert_eq!(H5Pset_meta_block_size(fapl, 4096), 0);
        let mut size = 0;
        assert_eq!(unsafe { H5Pget_meta_block_size(fapl, &mut size) }, 0);
        assert_eq!(size, 4096);
        H5Pclose(fapl);
    }

    #[test]
    fn transfer_buffer_default() {
        let size = H5Pget_buffer(H5P_DEFAULT, std::ptr::null_mut(), std::ptr::null_mut());
        assert_eq!(size, 1024 * 1024);
    }
}
