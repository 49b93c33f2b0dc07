//! Whole-extent transfers shared by datasets and attributes.
//!
//! Every transfer is one native call moving all elements of the target.
//! The host layout must match the stored datatype exactly; no conversion
//! takes place.

use std::os::raw::c_void;

use h5bind_sys::h5a::{H5Aget_space, H5Aget_type, H5Aread, H5Awrite};
use h5bind_sys::h5d::{H5Dget_space, H5Dget_type, H5Dread, H5Dwrite};
use h5bind_sys::h5i::hid_t;
use h5bind_sys::h5p::H5P_DEFAULT;
use h5bind_sys::h5s::H5S_ALL;

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::object::ObjectClass;
use crate::sync::sync;
use crate::types::{short_type_name, H5Type, TypeDescriptor};
use crate::util::ensure_writable;

#[derive(Clone, Copy, Debug)]
pub(crate) enum Target {
    Dataset(hid_t),
    Attribute(hid_t),
}

impl Target {
    fn id(self) -> hid_t {
        match self {
            Target::Dataset(id) | Target::Attribute(id) => id,
        }
    }

    pub(crate) fn space(self) -> Result<Dataspace> {
        Dataspace::from_id(match self {
            Target::Dataset(id) => h5try!(H5Dget_space(id)),
            Target::Attribute(id) => h5try!(H5Aget_space(id)),
        })
    }

    pub(crate) fn dtype(self) -> Result<Datatype> {
        Datatype::from_id(match self {
            Target::Dataset(id) => h5try!(H5Dget_type(id)),
            Target::Attribute(id) => h5try!(H5Aget_type(id)),
        })
    }

    /// # Safety
    /// `buf` must hold one element of `mem_type` per point of the target.
    unsafe fn write_buf(self, mem_type: hid_t, buf: *const c_void) -> Result<()> {
        match self {
            Target::Dataset(id) => {
                h5try!(H5Dwrite(id, mem_type, H5S_ALL, H5S_ALL, H5P_DEFAULT, buf));
            }
            Target::Attribute(id) => {
                h5try!(H5Awrite(id, mem_type, buf));
            }
        }
        Ok(())
    }

    /// # Safety
    /// `buf` must have room for one element of `mem_type` per point.
    unsafe fn read_buf(self, mem_type: hid_t, buf: *mut c_void) -> Result<()> {
        match self {
            Target::Dataset(id) => {
                h5try!(H5Dread(id, mem_type, H5S_ALL, H5S_ALL, H5P_DEFAULT, buf));
            }
            Target::Attribute(id) => {
                h5try!(H5Aread(id, mem_type, buf));
            }
        }
        Ok(())
    }

    /// Memory datatype for `descriptor`, checked against the stored type.
    fn negotiate(self, descriptor: &TypeDescriptor, mem: Datatype, path: &str) -> Result<Datatype> {
        let stored = self.dtype()?;
        if !mem.same_layout(&stored)? {
            let stored = stored
                .to_descriptor()
                .map_or_else(|_| "an unrepresentable type".to_string(), |d| d.to_string());
            return Err(Error::unsupported_type(
                path,
                format!("host layout {descriptor} does not match stored type {stored}"),
            ));
        }
        Ok(mem)
    }

    fn mem_type<T: H5Type>(self) -> Result<Datatype> {
        let descriptor = T::type_descriptor();
        let mem = Datatype::from_type::<T>()?;
        self.negotiate(&descriptor, mem, short_type_name::<T>())
    }

    fn element_count(self) -> Result<usize> {
        self.space()?.size()
    }

    pub(crate) fn write<T: H5Type>(self, data: &[T]) -> Result<()> {
        let id = self.id();
        ensure_writable(id, "write")?;
        sync(|| {
            let mem = self.mem_type::<T>()?;
            let expected = self.element_count()?;
            if data.len() != expected {
                return Err(Error::SizeMismatch {
                    expected,
                    actual: data.len(),
                });
            }
            let mem_id = mem.id()?;
            unsafe { self.write_buf(mem_id, data.as_ptr().cast()) }
        })
    }

    pub(crate) fn read<T: H5Type>(self) -> Result<Vec<T>> {
        sync(|| {
            let mem = self.mem_type::<T>()?;
            let count = self.element_count()?;
            let mem_id = mem.id()?;
            let mut out: Vec<T> = Vec::with_capacity(count);
            unsafe {
                self.read_buf(mem_id, out.as_mut_ptr().cast())?;
                out.set_len(count);
            }
            Ok(out)
        })
    }

    /// Reads into the front of `buf` and returns the number of elements
    /// written. Elements past that are left untouched.
    pub(crate) fn read_into<T: H5Type>(self, buf: &mut [T]) -> Result<usize> {
        sync(|| {
            let count = self.element_count()?;
            if buf.len() < count {
                return Err(Error::SizeMismatch {
                    expected: count,
                    actual: buf.len(),
                });
            }
            // Assigning drops the previous values, which may own strings.
            for (slot, value) in buf.iter_mut().zip(self.read::<T>()?) {
                *slot = value;
            }
            Ok(count)
        })
    }

    pub(crate) fn read_scalar<T: H5Type>(self) -> Result<T> {
        let space = self.space()?;
        if !space.is_scalar()? {
            return Err(Error::DimensionMismatch(format!(
                "expected a scalar, found shape {:?}",
                space.shape()?
            )));
        }
        self.read::<T>()?
            .pop()
            .ok_or_else(|| Error::SizeMismatch { expected: 1, actual: 0 })
    }

    pub(crate) fn write_scalar<T: H5Type>(self, value: &T) -> Result<()> {
        let space = self.space()?;
        if !space.is_scalar()? {
            return Err(Error::DimensionMismatch(format!(
                "expected a scalar, found shape {:?}",
                space.shape()?
            )));
        }
        self.write(std::slice::from_ref(value))
    }

    /// Writes bytes laid out per a caller-described `descriptor`.
    pub(crate) fn write_raw(self, descriptor: &TypeDescriptor, bytes: &[u8]) -> Result<()> {
        let id = self.id();
        ensure_writable(id, "write")?;
        check_raw(descriptor)?;
        sync(|| {
            let mem = Datatype::from_descriptor(descriptor)?;
            let mem = self.negotiate(descriptor, mem, "value")?;
            let expected = self.element_count()? * descriptor.size();
            if bytes.len() != expected {
                return Err(Error::SizeMismatch {
                    expected,
                    actual: bytes.len(),
                });
            }
            let mem_id = mem.id()?;
            unsafe { self.write_buf(mem_id, bytes.as_ptr().cast()) }
        })
    }

    pub(crate) fn read_raw(self, descriptor: &TypeDescriptor) -> Result<Vec<u8>> {
        check_raw(descriptor)?;
        sync(|| {
            let mem = Datatype::from_descriptor(descriptor)?;
            let mem = self.negotiate(descriptor, mem, "value")?;
            let mut out = vec![0u8; self.element_count()? * descriptor.size()];
            let mem_id = mem.id()?;
            unsafe { self.read_buf(mem_id, out.as_mut_ptr().cast())? };
            Ok(out)
        })
    }
}

fn check_raw(descriptor: &TypeDescriptor) -> Result<()> {
    if descriptor.is_variable() {
        return Err(Error::unsupported_type(
            "value",
            "variable-length text cannot be transferred as raw bytes",
        ));
    }
    Ok(())
}
