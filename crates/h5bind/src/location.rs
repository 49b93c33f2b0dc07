//! Behaviour shared by objects that live at a path inside a file.
//!
//! [`Location`] covers files, groups and datasets: they have a name, belong
//! to a file and carry attributes. [`Container`] adds the tree operations
//! of files and groups.

use std::os::raw::c_char;

use h5bind_sys::h5::hsize_t;
use h5bind_sys::h5a::{
    H5Acreate2, H5Adelete, H5Aexists, H5Aget_name_by_idx, H5Aget_num_attrs, H5Aopen,
};
use h5bind_sys::h5d::{H5Dcreate2, H5Dopen2};
use h5bind_sys::h5g::{H5G_info_t, H5Gcreate2, H5Gget_info, H5Gopen2};
use h5bind_sys::h5i::{H5Iget_file_id, H5Iget_name};
use h5bind_sys::h5l::{H5Ldelete, H5Lexists, H5Lget_name_by_idx};
use h5bind_sys::h5p::H5P_DEFAULT;

use crate::attribute::Attribute;
use crate::dataset::Dataset;
use crate::dataspace::{Dataspace, Extents};
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::file::File;
use crate::group::Group;
use crate::object::ObjectClass;
use crate::plist::{PropertyList, PropertyListClass};
use crate::sync::sync;
use crate::types::H5Type;
use crate::util::{ensure_writable, get_h5_str, is_read_only, to_cstring};

/// An object addressable by path: a file, group or dataset.
pub trait Location: ObjectClass {
    /// Absolute path of the object inside its file.
    fn name(&self) -> Result<String> {
        let id = self.id()?;
        get_h5_str(|buf, size| unsafe { H5Iget_name(id, buf, size) })
    }

    /// A new handle to the file holding this object.
    fn file(&self) -> Result<File> {
        let id = self.id()?;
        File::from_id(h5try!(H5Iget_file_id(id)))
    }

    fn is_read_only(&self) -> Result<bool> {
        is_read_only(self.id()?)
    }

    /// Creates attribute `name` with the given element type and shape.
    fn create_attr(&self, name: &str, dtype: &Datatype, space: &Dataspace) -> Result<Attribute> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        ensure_writable(id, "create attribute")?;
        let (type_id, space_id) = (dtype.id()?, space.id()?);
        sync(|| {
            if h5try!(H5Aexists(id, c_name.as_ptr())) > 0 {
                return Err(Error::AlreadyExists(format!("attribute '{name}'")));
            }
            let attr = Attribute::from_id(h5try!(H5Acreate2(
                id,
                c_name.as_ptr(),
                type_id,
                space_id,
                H5P_DEFAULT,
                H5P_DEFAULT
            )))?;
            log::debug!("created attribute '{name}' on {:?}", self.handle());
            Ok(attr)
        })
    }

    /// Creates attribute `name` holding values of `T`.
    fn new_attr<T: H5Type>(&self, name: &str, extents: impl Into<Extents>) -> Result<Attribute> {
        let dtype = Datatype::from_type::<T>()?;
        let space = Dataspace::try_new(extents)?;
        self.create_attr(name, &dtype, &space)
    }

    fn attr(&self, name: &str) -> Result<Attribute> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        Attribute::from_id(h5try!(H5Aopen(id, c_name.as_ptr(), H5P_DEFAULT)))
    }

    fn attr_exists(&self, name: &str) -> Result<bool> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        Ok(h5try!(H5Aexists(id, c_name.as_ptr())) > 0)
    }

    /// Attribute names in name order.
    fn attr_names(&self) -> Result<Vec<String>> {
        let id = self.id()?;
        sync(|| {
            let count = h5try!(H5Aget_num_attrs(id)) as hsize_t;
            (0..count)
                .map(|idx| {
                    get_h5_str(|buf: *mut c_char, size| unsafe {
                        H5Aget_name_by_idx(id, idx, buf, size)
                    })
                })
                .collect()
        })
    }

    fn delete_attr(&self, name: &str) -> Result<()> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        ensure_writable(id, "delete attribute")?;
        h5try!(H5Adelete(id, c_name.as_ptr()));
        Ok(())
    }
}

/// A location holding named links: a file (its root group) or a group.
///
/// Names may be `/`-separated paths, relative to this container or
/// absolute. Intermediate groups must already exist.
pub trait Container: Location {
    fn create_group(&self, name: &str) -> Result<Group> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        ensure_writable(id, "create group")?;
        let group = Group::from_id(h5try!(H5Gcreate2(
            id,
            c_name.as_ptr(),
            H5P_DEFAULT,
            H5P_DEFAULT,
            H5P_DEFAULT
        )))?;
        log::debug!("created group '{name}'");
        Ok(group)
    }

    fn group(&self, name: &str) -> Result<Group> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        Group::from_id(h5try!(H5Gopen2(id, c_name.as_ptr(), H5P_DEFAULT)))
    }

    /// Creates dataset `name`. Without `dcpl` the dataset is contiguous.
    ///
    /// Nothing is acquired when a precondition fails: the name must be free,
    /// the file writable, `dcpl` of the dataset-create class and its chunk
    /// rank, if any, equal to the dataspace rank.
    fn create_dataset(
        &self,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: Option<&PropertyList>,
    ) -> Result<Dataset> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        ensure_writable(id, "create dataset")?;
        if self.link_exists(name)? {
            return Err(Error::AlreadyExists(format!("dataset '{name}'")));
        }
        let dcpl = dcpl.unwrap_or(PropertyList::default_for(PropertyListClass::DatasetCreate));
        if dcpl.class()? != PropertyListClass::DatasetCreate {
            return Err(Error::UnsupportedOperation(format!(
                "dataset creation needs a dataset create list, got a {} list",
                dcpl.class()?
            )));
        }
        if let Some(chunk) = dcpl.chunk()? {
            let rank = space.rank()?;
            if chunk.len() != rank {
                return Err(Error::DimensionMismatch(format!(
                    "chunk has rank {}, dataspace has rank {rank}",
                    chunk.len()
                )));
            }
        }
        let (type_id, space_id, dcpl_id) = (dtype.id()?, space.id()?, dcpl.id()?);
        let dataset = Dataset::from_id(h5try!(H5Dcreate2(
            id,
            c_name.as_ptr(),
            type_id,
            space_id,
            H5P_DEFAULT,
            dcpl_id,
            H5P_DEFAULT
        )))?;
        log::debug!("created dataset '{name}'");
        Ok(dataset)
    }

    /// Creates a contiguous dataset `name` of `T` elements.
    fn new_dataset<T: H5Type>(&self, name: &str, extents: impl Into<Extents>) -> Result<Dataset> {
        let dtype = Datatype::from_type::<T>()?;
        let space = Dataspace::try_new(extents)?;
        self.create_dataset(name, &dtype, &space, None)
    }

    fn dataset(&self, name: &str) -> Result<Dataset> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        Dataset::from_id(h5try!(H5Dopen2(id, c_name.as_ptr(), H5P_DEFAULT)))
    }

    /// Whether `name` resolves. Missing intermediate groups count as absent.
    fn link_exists(&self, name: &str) -> Result<bool> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        Ok(h5try!(H5Lexists(id, c_name.as_ptr(), H5P_DEFAULT)) > 0)
    }

    /// Number of direct members.
    fn len(&self) -> Result<usize> {
        let id = self.id()?;
        let mut info = H5G_info_t::default();
        h5try!(H5Gget_info(id, &mut info));
        Ok(info.nlinks as usize)
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Names of direct members in name order.
    fn member_names(&self) -> Result<Vec<String>> {
        let id = self.id()?;
        sync(|| {
            let count = self.len()? as hsize_t;
            (0..count)
                .map(|idx| {
                    get_h5_str(|buf, size| unsafe {
                        H5Lget_name_by_idx(id, c".".as_ptr(), idx, buf, size, H5P_DEFAULT)
                    })
                })
                .collect()
        })
    }

    /// Removes the link `name`. Open handles to the target stay usable.
    fn unlink(&self, name: &str) -> Result<()> {
        let id = self.id()?;
        let c_name = to_cstring(name)?;
        ensure_writable(id, "unlink")?;
        h5try!(H5Ldelete(id, c_name.as_ptr(), H5P_DEFAULT));
        log::debug!("unlinked '{name}'");
        Ok(())
    }
}
