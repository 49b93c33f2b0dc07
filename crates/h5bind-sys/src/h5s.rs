//! Dataspaces: the shape of a dataset or attribute.

use std::os::raw::c_int;

use crate::engine::space::SpaceDesc;
use crate::engine::{self, read_dims, Failure, Object};
use crate::h5::{herr_t, hsize_t, hssize_t, htri_t};
use crate::h5i::{hid_t, H5I_type_t, H5I_INVALID_HID};

/// Selects the whole extent in transfer calls.
pub const H5S_ALL: hid_t = 0;

/// Marks an axis without an upper bound.
pub const H5S_UNLIMITED: hsize_t = hsize_t::MAX;

/// Highest supported rank.
pub const H5S_MAX_RANK: c_int = 32;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H5S_class_t {
    H5S_NO_CLASS = -1,
    H5S_SCALAR = 0,
    H5S_SIMPLE = 1,
    H5S_NULL = 2,
}

fn class_of(space: &SpaceDesc) -> H5S_class_t {
    match space {
        SpaceDesc::Null => H5S_class_t::H5S_NULL,
        SpaceDesc::Scalar => H5S_class_t::H5S_SCALAR,
        SpaceDesc::Simple { .. } => H5S_class_t::H5S_SIMPLE,
    }
}

unsafe fn simple_desc(rank: c_int, dims: *const hsize_t, maxdims: *const hsize_t) -> engine::Outcome<SpaceDesc> {
    if !(1..=H5S_MAX_RANK).contains(&rank) {
        return Err(Failure::args(format!("invalid rank {rank}")));
    }
    let dims = read_dims(dims, rank as usize)?;
    let maxdims = if maxdims.is_null() {
        None
    } else {
        Some(read_dims(maxdims, rank as usize)?)
    };
    SpaceDesc::simple(dims, maxdims)
}

/// Creates an empty dataspace of the given class. Simple dataspaces start
/// with rank 0 until [`H5Sset_extent_simple`] is called.
pub extern "C" fn H5Screate(ty: H5S_class_t) -> hid_t {
    engine::api("H5Screate", H5I_INVALID_HID, |lib| {
        let space = match ty {
            H5S_class_t::H5S_SCALAR => SpaceDesc::Scalar,
            H5S_class_t::H5S_NULL => SpaceDesc::Null,
            H5S_class_t::H5S_SIMPLE => SpaceDesc::Simple {
                dims: Vec::new(),
                maxdims: Vec::new(),
            },
            H5S_class_t::H5S_NO_CLASS => return Err(Failure::args("invalid dataspace class")),
        };
        Ok(lib.register(Object::Dataspace(space)))
    })
}

/// Creates a simple dataspace. A null `maxdims` means fixed-size.
///
/// # Safety
/// `dims` (and `maxdims` when non-null) must point to `rank` values.
pub unsafe extern "C" fn H5Screate_simple(
    rank: c_int,
    dims: *const hsize_t,
    maxdims: *const hsize_t,
) -> hid_t {
    engine::api("H5Screate_simple", H5I_INVALID_HID, |lib| {
        let space = simple_desc(rank, dims, maxdims)?;
        Ok(lib.register(Object::Dataspace(space)))
    })
}

/// Replaces the extent of a dataspace.
///
/// # Safety
/// As for [`H5Screate_simple`].
pub unsafe extern "C" fn H5Sset_extent_simple(
    space_id: hid_t,
    rank: c_int,
    dims: *const hsize_t,
    maxdims: *const hsize_t,
) -> herr_t {
    engine::api("H5Sset_extent_simple", -1, |lib| {
        let space = simple_desc(rank, dims, maxdims)?;
        *lib.dataspace_mut(space_id)? = space;
        Ok(0)
    })
}

pub extern "C" fn H5Scopy(space_id: hid_t) -> hid_t {
    engine::api("H5Scopy", H5I_INVALID_HID, |lib| {
        let space = lib.dataspace(space_id)?.clone();
        Ok(lib.register(Object::Dataspace(space)))
    })
}

pub extern "C" fn H5Sclose(space_id: hid_t) -> herr_t {
    engine::api("H5Sclose", -1, |lib| {
        lib.release(space_id, Some(H5I_type_t::H5I_DATASPACE))?;
        Ok(0)
    })
}

pub extern "C" fn H5Sget_simple_extent_type(space_id: hid_t) -> H5S_class_t {
    engine::api("H5Sget_simple_extent_type", H5S_class_t::H5S_NO_CLASS, |lib| {
        Ok(class_of(lib.dataspace(space_id)?))
    })
}

pub extern "C" fn H5Sget_simple_extent_ndims(space_id: hid_t) -> c_int {
    engine::api("H5Sget_simple_extent_ndims", -1, |lib| {
        Ok(lib.dataspace(space_id)?.rank() as c_int)
    })
}

/// Copies the current and maximum extents out. Either pointer may be null.
/// Returns the rank.
///
/// # Safety
/// Non-null pointers must be valid for `rank` writes.
pub unsafe extern "C" fn H5Sget_simple_extent_dims(
    space_id: hid_t,
    dims: *mut hsize_t,
    maxdims: *mut hsize_t,
) -> c_int {
    engine::api("H5Sget_simple_extent_dims", -1, |lib| {
        let space = lib.dataspace(space_id)?;
        let rank = space.rank();
        if !dims.is_null() {
            std::ptr::copy_nonoverlapping(space.dims().as_ptr(), dims, rank);
        }
        if !maxdims.is_null() {
            std::ptr::copy_nonoverlapping(space.maxdims().as_ptr(), maxdims, rank);
        }
        Ok(rank as c_int)
    })
}

pub extern "C" fn H5Sget_simple_extent_npoints(space_id: hid_t) -> hssize_t {
    engine::api("H5Sget_simple_extent_npoints", -1, |lib| {
        Ok(lib.dataspace(space_id)?.npoints() as hssize_t)
    })
}

/// Compares two extents, including their maxima.
pub extern "C" fn H5Sextent_equal(space1_id: hid_t, space2_id: hid_t) -> htri_t {
    engine::api("H5Sextent_equal", -1, |lib| {
        let equal = lib.dataspace(space1_id)? == lib.dataspace(space2_id)?;
        Ok(htri_t::from(equal))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;

    #[test]
    fn simple_extent_queries() {
        let dims = [20u64, 5];
        let max = [40u64, H5S_UNLIMITED];
        let space = unsafe { H5Screate_simple(2, dims.as_ptr(), max.as_ptr()) };
        assert!(space > 0);
        assert_eq!(H5Sget_simple_extent_type(space), H5S_class_t::H5S_SIMPLE);
        assert_eq!(H5Sget_simple_extent_ndims(space), 2);
        assert_eq!(H5Sget_simple_extent_npoints(space), 100);

        let (mut cur, mut mx) = ([0u64; 2], [0u64; 2]);
        let rank = unsafe { H5Sget_simple_extent_dims(space, cur.as_mut_ptr(), mx.as_mut_ptr()) };
        assert_eq!(rank, 2);
        assert_eq!(cur, dims);
        assert_eq!(mx, max);
        assert_eq!(H5Sclose(space), 0);
    }

    #[test]
    fn current_above_max_fails() {
        H5Eset_auto(false);
        let dims = [5u64];
        let max = [4u64];
        let space = unsafe { H5Screate_simple(1, dims.as_ptr(), max.as_ptr()) };
        assert_eq!(space, H5I_INVALID_HID);
        assert!(crate::h5e::H5Eget_num() > 0);
    }

    #[test]
    fn copies_are_independent() {
        let dims = [3u64];
        let space = unsafe { H5Screate_simple(1, dims.as_ptr(), std::ptr::null()) };
        let copy = H5Scopy(space);
        assert_ne!(space, copy);
        assert_eq!(H5Sextent_equal(space, copy), 1);

        let grown = [6u64];
        assert_eq!(unsafe { H5Sset_extent_simple(copy, 1, grown.as_ptr(), std::ptr::null()) }, 0);
        assert_eq!(H5Sextent_equal(space, copy), 0);
        assert_eq!(H5Sget_simple_extent_npoints(space), 3);
        H5Sclose(space);
        H5Sclose(copy);
    }

    #[test]
    fn close_checks_kind() {
        H5Eset_auto(false);
        assert!(H5Sclose(crate::h5t::H5T_NATIVE_INT8) < 0);
        let scalar = H5Screate(H5S_class_t::H5S_SCALAR);
        assert_eq!(H5Sget_simple_extent_npoints(scalar), 1);
        assert_eq!(H5Sget_simple_extent_ndims(scalar), 0);
        H5Sclose(scalar);
    }
}
