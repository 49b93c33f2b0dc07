//! Property lists: per-operation configuration objects.
//!
//! Each class has one library-owned default list, reachable through
//! [`PropertyList::default_for`]. Defaults are shared immutable singletons:
//! closing them does nothing and every setter on them fails.

use std::fmt;
use std::sync::OnceLock;

use h5bind_sys::h5::hsize_t;
use h5bind_sys::h5d::H5D_layout_t;
use h5bind_sys::h5i::hid_t;
use h5bind_sys::h5p::{
    H5Pcopy, H5Pcreate, H5Pget_buffer, H5Pget_chunk, H5Pget_chunk_cache, H5Pget_class,
    H5Pget_layout, H5Pget_meta_block_size, H5Pget_sieve_buf_size, H5Pget_userblock,
    H5Pset_buffer, H5Pset_chunk, H5Pset_chunk_cache, H5Pset_layout, H5Pset_meta_block_size,
    H5Pset_sieve_buf_size, H5Pset_userblock, H5P_DATASET_ACCESS, H5P_DATASET_ACCESS_DEFAULT,
    H5P_DATASET_CREATE, H5P_DATASET_CREATE_DEFAULT, H5P_DATASET_XFER,
    H5P_DATASET_XFER_DEFAULT, H5P_FILE_ACCESS, H5P_FILE_ACCESS_DEFAULT, H5P_FILE_CREATE,
    H5P_FILE_CREATE_DEFAULT,
};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::object::{impl_class, ObjectClass};
use crate::sync::sync;

/// Property list classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyListClass {
    FileCreate,
    FileAccess,
    DatasetCreate,
    DatasetAccess,
    DatasetTransfer,
}

impl PropertyListClass {
    pub const ALL: [PropertyListClass; 5] = [
        PropertyListClass::FileCreate,
        PropertyListClass::FileAccess,
        PropertyListClass::DatasetCreate,
        PropertyListClass::DatasetAccess,
        PropertyListClass::DatasetTransfer,
    ];

    fn class_id(self) -> hid_t {
        match self {
            PropertyListClass::FileCreate => H5P_FILE_CREATE,
            PropertyListClass::FileAccess => H5P_FILE_ACCESS,
            PropertyListClass::DatasetCreate => H5P_DATASET_CREATE,
            PropertyListClass::DatasetAccess => H5P_DATASET_ACCESS,
            PropertyListClass::DatasetTransfer => H5P_DATASET_XFER,
        }
    }

    fn default_id(self) -> hid_t {
        match self {
            PropertyListClass::FileCreate => H5P_FILE_CREATE_DEFAULT,
            PropertyListClass::FileAccess => H5P_FILE_ACCESS_DEFAULT,
            PropertyListClass::DatasetCreate => H5P_DATASET_CREATE_DEFAULT,
            PropertyListClass::DatasetAccess => H5P_DATASET_ACCESS_DEFAULT,
            PropertyListClass::DatasetTransfer => H5P_DATASET_XFER_DEFAULT,
        }
    }

    fn from_class_id(id: hid_t) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.class_id() == id)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PropertyListClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyListClass::FileCreate => "file create",
            PropertyListClass::FileAccess => "file access",
            PropertyListClass::DatasetCreate => "dataset create",
            PropertyListClass::DatasetAccess => "dataset access",
            PropertyListClass::DatasetTransfer => "dataset transfer",
        })
    }
}

/// Storage layout of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    Compact,
    Contiguous,
    /// Required for datasets that change extent.
    Chunked,
}

impl Layout {
    fn to_native(self) -> H5D_layout_t {
        match self {
            Layout::Compact => H5D_layout_t::H5D_COMPACT,
            Layout::Contiguous => H5D_layout_t::H5D_CONTIGUOUS,
            Layout::Chunked => H5D_layout_t::H5D_CHUNKED,
        }
    }

    fn from_native(layout: H5D_layout_t) -> Result<Self> {
        match layout {
            H5D_layout_t::H5D_COMPACT => Ok(Layout::Compact),
            H5D_layout_t::H5D_CONTIGUOUS => Ok(Layout::Contiguous),
            H5D_layout_t::H5D_CHUNKED => Ok(Layout::Chunked),
            H5D_layout_t::H5D_LAYOUT_ERROR => {
                Err(Error::UnsupportedOperation("unknown storage layout".into()))
            }
        }
    }
}

/// A property list of one class.
pub struct PropertyList {
    handle: Handle,
}

impl_class!(PropertyList, "property list", H5I_GENPROP_LST);

impl PropertyList {
    /// Creates a list holding the defaults of `class`.
    pub fn new(class: PropertyListClass) -> Result<Self> {
        Self::from_id(h5try!(H5Pcreate(class.class_id())))
    }

    /// The library-owned default list of `class`.
    pub fn default_for(class: PropertyListClass) -> &'static PropertyList {
        static DEFAULTS: OnceLock<[PropertyList; 5]> = OnceLock::new();
        let defaults = DEFAULTS.get_or_init(|| {
            PropertyListClass::ALL.map(|class| PropertyList {
                handle: Handle::permanent(class.default_id()),
            })
        });
        &defaults[class.index()]
    }

    /// Whether this is one of the shared default lists.
    pub fn is_default(&self) -> bool {
        !self.handle.is_owned()
    }

    pub fn class(&self) -> Result<PropertyListClass> {
        let id = self.id()?;
        let class_id = h5try!(H5Pget_class(id));
        PropertyListClass::from_class_id(class_id)
            .ok_or_else(|| Error::UnsupportedOperation(format!("unknown property list class {class_id:#x}")))
    }

    /// Independent deep duplicate, always owned even when copying a default.
    pub fn copy(&self) -> Result<Self> {
        let id = self.id()?;
        Self::from_id(h5try!(H5Pcopy(id)))
    }

    /// Identifier for a setter: fails on defaults and on lists of the
    /// wrong class.
    fn mutable_id(&self, class: PropertyListClass, setting: &str) -> Result<hid_t> {
        if self.is_default() {
            return Err(Error::UnsupportedOperation(format!(
                "cannot set {setting} on the default {} list",
                class
            )));
        }
        self.expect_class(class, setting)
    }

    fn expect_class(&self, class: PropertyListClass, setting: &str) -> Result<hid_t> {
        let id = self.id()?;
        let actual = self.class()?;
        if actual != class {
            return Err(Error::UnsupportedOperation(format!(
                "{setting} belongs to {class} lists, not {actual} lists"
            )));
        }
        Ok(id)
    }

    // ---- dataset create ----

    /// Sets chunk dimensions and switches the layout to chunked. The chunk
    /// rank is checked against the dataspace when a dataset is created.
    pub fn set_chunk(&self, dims: &[usize]) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::DatasetCreate, "chunk")?;
        if dims.is_empty() {
            return Err(Error::RangeError("chunk needs at least one dimension".into()));
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(Error::RangeError(format!("chunk dimension {axis} is zero")));
        }
        let dims: Vec<hsize_t> = dims.iter().map(|&d| d as hsize_t).collect();
        h5try!(H5Pset_chunk(id, dims.len() as i32, dims.as_ptr()));
        Ok(())
    }

    /// Chunk dimensions, or `None` when the layout is not chunked.
    pub fn chunk(&self) -> Result<Option<Vec<usize>>> {
        if self.layout()? != Layout::Chunked {
            return Ok(None);
        }
        let id = self.id()?;
        sync(|| {
            let rank = h5try!(H5Pget_chunk(id, 0, std::ptr::null_mut()));
            let mut dims = vec![0 as hsize_t; rank as usize];
            h5try!(H5Pget_chunk(id, rank, dims.as_mut_ptr()));
            Ok(Some(dims.into_iter().map(|d| d as usize).collect()))
        })
    }

    pub fn set_layout(&self, layout: Layout) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::DatasetCreate, "layout")?;
        h5try!(H5Pset_layout(id, layout.to_native()));
        Ok(())
    }

    pub fn layout(&self) -> Result<Layout> {
        let id = self.expect_class(PropertyListClass::DatasetCreate, "layout")?;
        Layout::from_native(h5try!(H5Pget_layout(id)))
    }

    // ---- file create ----

    /// Bytes reserved at the start of new files: 0 or a power of two of at
    /// least 512.
    pub fn set_userblock(&self, size: u64) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::FileCreate, "userblock")?;
        if size != 0 && (size < 512 || !size.is_power_of_two()) {
            return Err(Error::RangeError(format!(
                "userblock size {size} is not 0 or a power of two of at least 512"
            )));
        }
        h5try!(H5Pset_userblock(id, size));
        Ok(())
    }

    pub fn userblock(&self) -> Result<u64> {
        let id = self.expect_class(PropertyListClass::FileCreate, "userblock")?;
        let mut size: hsize_t = 0;
        h5try!(H5Pget_userblock(id, &mut size));
        Ok(size)
    }

    // ---- file access ----

    pub fn set_sieve_buf_size(&self, size: usize) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::FileAccess, "sieve buffer size")?;
        h5try!(H5Pset_sieve_buf_size(id, size));
        Ok(())
    }

    pub fn sieve_buf_size(&self) -> Result<usize> {
        let id = self.expect_class(PropertyListClass::FileAccess, "sieve buffer size")?;
        let mut size = 0usize;
        h5try!(H5Pget_sieve_buf_size(id, &mut size));
        Ok(size)
    }

    pub fn set_meta_block_size(&self, size: u64) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::FileAccess, "metadata block size")?;
        h5try!(H5Pset_meta_block_size(id, size));
        Ok(())
    }

    pub fn meta_block_size(&self) -> Result<u64> {
        let id = self.expect_class(PropertyListClass::FileAccess, "metadata block size")?;
        let mut size: hsize_t = 0;
        h5try!(H5Pget_meta_block_size(id, &mut size));
        Ok(size)
    }

    // ---- dataset access ----

    /// Byte budget of the chunk cache.
    pub fn set_chunk_cache(&self, nbytes: usize) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::DatasetAccess, "chunk cache")?;
        h5try!(H5Pset_chunk_cache(id, 0, nbytes, 0.75));
        Ok(())
    }

    pub fn chunk_cache(&self) -> Result<usize> {
        let id = self.expect_class(PropertyListClass::DatasetAccess, "chunk cache")?;
        let mut nbytes = 0usize;
        h5try!(H5Pget_chunk_cache(id, &mut nbytes));
        Ok(nbytes)
    }

    // ---- dataset transfer ----

    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        let id = self.mutable_id(PropertyListClass::DatasetTransfer, "buffer size")?;
        if size == 0 {
            return Err(Error::RangeError("transfer buffer size must be positive".into()));
        }
        h5try!(H5Pset_buffer(id, size, std::ptr::null_mut(), std::ptr::null_mut()));
        Ok(())
    }

    pub fn buffer_size(&self) -> Result<usize> {
        let id = self.expect_class(PropertyListClass::DatasetTransfer, "buffer size")?;
        Ok(h5try!(H5Pget_buffer(id, std::ptr::null_mut(), std::ptr::null_mut())))
    }
}
