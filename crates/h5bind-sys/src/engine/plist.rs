//! Property list classes and their settings.

use std::collections::BTreeMap;

use super::{Failure, Outcome};
use crate::h5d::H5D_layout_t;
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::hid_t;
use crate::h5p;

pub(crate) const USERBLOCK: &str = "userblock";
pub(crate) const SIEVE_BUF_SIZE: &str = "sieve_buf_size";
pub(crate) const META_BLOCK_SIZE: &str = "meta_block_size";
pub(crate) const LAYOUT: &str = "layout";
pub(crate) const CHUNK: &str = "chunk";
pub(crate) const CHUNK_CACHE_NBYTES: &str = "chunk_cache_nbytes";
pub(crate) const BUFFER_SIZE: &str = "buffer_size";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlistClass {
    FileCreate,
    FileAccess,
    DatasetCreate,
    DatasetAccess,
    DatasetTransfer,
}

impl PlistClass {
    pub(crate) const ALL: [PlistClass; 5] = [
        PlistClass::FileCreate,
        PlistClass::FileAccess,
        PlistClass::DatasetCreate,
        PlistClass::DatasetAccess,
        PlistClass::DatasetTransfer,
    ];

    pub(crate) fn class_id(self) -> hid_t {
        match self {
            PlistClass::FileCreate => h5p::H5P_FILE_CREATE,
            PlistClass::FileAccess => h5p::H5P_FILE_ACCESS,
            PlistClass::DatasetCreate => h5p::H5P_DATASET_CREATE,
            PlistClass::DatasetAccess => h5p::H5P_DATASET_ACCESS,
            PlistClass::DatasetTransfer => h5p::H5P_DATASET_XFER,
        }
    }

    pub(crate) fn default_list_id(self) -> hid_t {
        match self {
            PlistClass::FileCreate => h5p::H5P_FILE_CREATE_DEFAULT,
            PlistClass::FileAccess => h5p::H5P_FILE_ACCESS_DEFAULT,
            PlistClass::DatasetCreate => h5p::H5P_DATASET_CREATE_DEFAULT,
            PlistClass::DatasetAccess => h5p::H5P_DATASET_ACCESS_DEFAULT,
            PlistClass::DatasetTransfer => h5p::H5P_DATASET_XFER_DEFAULT,
        }
    }

    pub(crate) fn from_class_id(id: hid_t) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.class_id() == id)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            PlistClass::FileCreate => "file create",
            PlistClass::FileAccess => "file access",
            PlistClass::DatasetCreate => "dataset create",
            PlistClass::DatasetAccess => "dataset access",
            PlistClass::DatasetTransfer => "dataset transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropValue {
    Size(usize),
    Layout(H5D_layout_t),
    Dims(Vec<u64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlistDesc {
    pub class: PlistClass,
    props: BTreeMap<&'static str, PropValue>,
}

impl PlistDesc {
    /// A list of `class` holding that class's default settings.
    pub(crate) fn new(class: PlistClass) -> Self {
        let mut props = BTreeMap::new();
        match class {
            PlistClass::FileCreate => {
                props.insert(USERBLOCK, PropValue::Size(0));
            }
            PlistClass::FileAccess => {
                props.insert(SIEVE_BUF_SIZE, PropValue::Size(64 * 1024));
                props.insert(META_BLOCK_SIZE, PropValue::Size(2048));
            }
            PlistClass::DatasetCreate => {
                props.insert(LAYOUT, PropValue::Layout(H5D_layout_t::H5D_CONTIGUOUS));
                props.insert(CHUNK, PropValue::Dims(Vec::new()));
            }
            PlistClass::DatasetAccess => {
                props.insert(CHUNK_CACHE_NBYTES, PropValue::Size(1024 * 1024));
            }
            PlistClass::DatasetTransfer => {
                props.insert(BUFFER_SIZE, PropValue::Size(1024 * 1024));
            }
        }
        Self { class, props }
    }

    fn expect_class(&self, class: PlistClass) -> Outcome<()> {
        if self.class == class {
            Ok(())
        } else {
            Err(Failure::bad_type(format!(
                "property is not defined for {} lists",
                self.class.name()
            )))
        }
    }

    /// Reads a size-valued setting, 0 when absent.
    pub(crate) fn size(&self, name: &str) -> usize {
        match self.props.get(name) {
            Some(PropValue::Size(v)) => *v,
            _ => 0,
        }
    }

    pub(crate) fn get_size(&self, class: PlistClass, name: &'static str) -> Outcome<usize> {
        self.expect_class(class)?;
        Ok(self.size(name))
    }

    pub(crate) fn set_size(&mut self, class: PlistClass, name: &'static str, value: usize) -> Outcome<()> {
        self.expect_class(class)?;
        self.props.insert(name, PropValue::Size(value));
        Ok(())
    }

    pub(crate) fn set_userblock(&mut self, size: usize) -> Outcome<()> {
        if size != 0 && (size < 512 || !size.is_power_of_two()) {
            return Err(Failure::new(
                H5E_major_t::H5E_PLIST,
                H5E_minor_t::H5E_BADVALUE,
                format!("userblock size {size} must be 0 or a power of two of at least 512"),
            ));
        }
        self.set_size(PlistClass::FileCreate, USERBLOCK, size)
    }

    pub(crate) fn layout(&self) -> H5D_layout_t {
        match self.props.get(LAYOUT) {
            Some(PropValue::Layout(layout)) => *layout,
            _ => H5D_layout_t::H5D_CONTIGUOUS,
        }
    }

    pub(crate) fn set_layout(&mut self, layout: H5D_layout_t) -> Outcome<()> {
        self.expect_class(PlistClass::DatasetCreate)?;
        self.props.insert(LAYOUT, PropValue::Layout(layout));
        Ok(())
    }

    pub(crate) fn chunk(&self) -> &[u64] {
        match self.props.get(CHUNK) {
            Some(PropValue::Dims(dims)) => dims,
            _ => &[],
        }
    }

    /// Stores chunk dimensions and switches the layout to chunked.
    pub(crate) fn set_chunk(&mut self, dims: Vec<u64>) -> Outcome<()> {
        self.expect_class(PlistClass::DatasetCreate)?;
        if dims.is_empty() {
            return Err(Failure::args("chunk rank must be at least 1"));
        }
        if dims.contains(&0) {
            return Err(Failure::new(
                H5E_major_t::H5E_ARGS,
                H5E_minor_t::H5E_BADRANGE,
                "all chunk dimensions must be positive",
            ));
        }
        self.props.insert(CHUNK, PropValue::Dims(dims));
        self.props.insert(LAYOUT, PropValue::Layout(H5D_layout_t::H5D_CHUNKED));
        Ok(())
    }
}
