//! Files: the top-level container.

use std::fmt;
use std::os::raw::c_uint;
use std::path::{Path, PathBuf};

use h5bind_sys::h5f::{
    H5Fcreate, H5Fflush, H5Fget_name, H5Fget_obj_count, H5Fopen, H5F_scope_t, H5F_ACC_EXCL,
    H5F_ACC_RDONLY, H5F_ACC_RDWR, H5F_ACC_TRUNC, H5F_OBJ_ALL, H5F_OBJ_FILE,
};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::location::{Container, Location};
use crate::object::{impl_class, ObjectClass};
use crate::plist::{PropertyList, PropertyListClass};
use crate::util::{get_h5_str, to_cstring};

/// How a file is opened. Each mode maps onto one native access flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open an existing file read-only.
    Read,
    /// Open an existing file read-write.
    ReadWrite,
    /// Create a file, truncating any existing one.
    Create,
    /// Create a file, failing if it exists.
    CreateExcl,
    /// Open read-write if the file exists, otherwise create it.
    Append,
}

impl OpenMode {
    fn creates(self) -> bool {
        matches!(self, OpenMode::Create | OpenMode::CreateExcl)
    }

    fn flags(self) -> c_uint {
        match self {
            OpenMode::Read => H5F_ACC_RDONLY,
            OpenMode::ReadWrite | OpenMode::Append => H5F_ACC_RDWR,
            OpenMode::Create => H5F_ACC_TRUNC,
            OpenMode::CreateExcl => H5F_ACC_EXCL,
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "read",
            OpenMode::ReadWrite => "read-write",
            OpenMode::Create => "create",
            OpenMode::CreateExcl => "exclusive create",
            OpenMode::Append => "append",
        })
    }
}

/// An open file. As a [`Container`] it acts as its root group.
pub struct File {
    handle: Handle,
}

impl_class!(File, "file", H5I_FILE);

impl Location for File {}

impl Container for File {}

fn check_plist(plist: &PropertyList, class: PropertyListClass) -> Result<()> {
    let actual = plist.class()?;
    if actual != class {
        return Err(Error::UnsupportedOperation(format!(
            "expected a {class} list, got a {actual} list"
        )));
    }
    Ok(())
}

impl File {
    /// Opens an existing file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenMode::Read, None, None)
    }

    /// Opens an existing file read-write.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenMode::ReadWrite, None, None)
    }

    /// Creates a file, truncating it if it exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenMode::Create, None, None)
    }

    /// Creates a file, failing with `AlreadyExists` if it exists.
    pub fn create_excl<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenMode::CreateExcl, None, None)
    }

    /// Opens a file read-write, creating it first if needed.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenMode::Append, None, None)
    }

    /// Opens or creates a file with explicit property lists. A creation
    /// list only applies to modes that create a file.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        fcpl: Option<&PropertyList>,
        fapl: Option<&PropertyList>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mode = match mode {
            OpenMode::Append if !path.exists() => OpenMode::Create,
            mode => mode,
        };
        let name = path
            .to_str()
            .ok_or_else(|| Error::InvalidName(path.to_string_lossy().into_owned()))?;
        let c_name = to_cstring(name)?;

        let fapl = fapl.unwrap_or(PropertyList::default_for(PropertyListClass::FileAccess));
        check_plist(fapl, PropertyListClass::FileAccess)?;
        let fapl_id = fapl.id()?;

        let id = if mode.creates() {
            let fcpl = fcpl.unwrap_or(PropertyList::default_for(PropertyListClass::FileCreate));
            check_plist(fcpl, PropertyListClass::FileCreate)?;
            let fcpl_id = fcpl.id()?;
            h5try!(H5Fcreate(c_name.as_ptr(), mode.flags(), fcpl_id, fapl_id))
        } else {
            if fcpl.is_some() {
                return Err(Error::UnsupportedOperation(format!(
                    "a file create list does not apply in {mode} mode"
                )));
            }
            h5try!(H5Fopen(c_name.as_ptr(), mode.flags(), fapl_id))
        };
        let file = Self::from_id(id)?;
        log::debug!("opened '{}' in {mode} mode as {:?}", path.display(), file.handle);
        Ok(file)
    }

    /// Writes the file out.
    pub fn flush(&self) -> Result<()> {
        let id = self.id()?;
        h5try!(H5Fflush(id, H5F_scope_t::H5F_SCOPE_LOCAL));
        Ok(())
    }

    /// Absolute path of the file on disk.
    pub fn filename(&self) -> Result<PathBuf> {
        let id = self.id()?;
        get_h5_str(|buf, size| unsafe { H5Fget_name(id, buf, size) }).map(PathBuf::from)
    }

    /// Number of open handles attached to this file, file handles included.
    pub fn open_object_count(&self) -> Result<usize> {
        let id = self.id()?;
        Ok(h5try!(H5Fget_obj_count(id, H5F_OBJ_ALL)) as usize)
    }

    /// Releases this file handle. Once the last file handle goes, the file
    /// is written out and every handle still open inside it becomes stale.
    pub fn close(&self) -> Result<()> {
        if let Ok(id) = self.id() {
            match h5call!(H5Fget_obj_count(id, H5F_OBJ_ALL & !H5F_OBJ_FILE)) {
                Ok(children) if children > 0 => {
                    log::warn!("closing {:?} with {children} object(s) still open", self.handle);
                }
                Ok(_) => {}
                Err(err) => log::warn!("unable to count objects open in {:?}: {err}", self.handle),
            }
            log::debug!("closing {:?}", self.handle);
        }
        self.handle.close()
    }
}
