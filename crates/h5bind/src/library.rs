//! Process-wide queries about the native library.

use std::os::raw::c_uint;

use h5bind_sys::h5::{hsize_t, H5get_libversion, H5is_library_threadsafe};
use h5bind_sys::h5i::{H5I_type_t, H5Inmembers};

use crate::error::Result;
use crate::sync::sync;

/// Native library version as `(major, minor, release)`.
pub fn library_version() -> Result<(u32, u32, u32)> {
    let (mut major, mut minor, mut release): (c_uint, c_uint, c_uint) = (0, 0, 0);
    h5try!(H5get_libversion(&mut major, &mut minor, &mut release));
    Ok((major, minor, release))
}

/// Whether the native library serializes concurrent callers itself.
pub fn is_threadsafe() -> Result<bool> {
    let mut threadsafe = false;
    h5try!(H5is_library_threadsafe(&mut threadsafe));
    Ok(threadsafe)
}

/// Live handle counts across the process, by kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleCounts {
    pub files: usize,
    pub groups: usize,
    pub datasets: usize,
    pub attributes: usize,
    pub datatypes: usize,
    pub dataspaces: usize,
    pub property_lists: usize,
}

impl HandleCounts {
    pub fn total(&self) -> usize {
        self.files
            + self.groups
            + self.datasets
            + self.attributes
            + self.datatypes
            + self.dataspaces
            + self.property_lists
    }
}

fn count(kind: H5I_type_t) -> Result<usize> {
    let mut members: hsize_t = 0;
    h5try!(H5Inmembers(kind, &mut members));
    Ok(members as usize)
}

/// Counts the caller-owned handles currently open in this process.
/// Library-owned handles are not included.
pub fn live_handles() -> Result<HandleCounts> {
    sync(|| {
        Ok(HandleCounts {
            files: count(H5I_type_t::H5I_FILE)?,
            groups: count(H5I_type_t::H5I_GROUP)?,
            datasets: count(H5I_type_t::H5I_DATASET)?,
            attributes: count(H5I_type_t::H5I_ATTR)?,
            datatypes: count(H5I_type_t::H5I_DATATYPE)?,
            dataspaces: count(H5I_type_t::H5I_DATASPACE)?,
            property_lists: count(H5I_type_t::H5I_GENPROP_LST)?,
        })
    })
}
