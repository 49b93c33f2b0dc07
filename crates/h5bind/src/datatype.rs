//! Native datatypes built from, and reflected back into, type descriptors.

use std::ffi::CStr;
use std::os::raw::c_uint;

use h5bind_sys::h5::{hsize_t, H5free_memory};
use h5bind_sys::h5t::{
    H5T_class_t, H5T_cset_t, H5T_sign_t, H5T_str_t, H5Tarray_create2, H5Tcopy, H5Tcreate,
    H5Tequal, H5Tget_array_dims2, H5Tget_array_ndims, H5Tget_class, H5Tget_cset,
    H5Tget_member_name, H5Tget_member_offset, H5Tget_member_type, H5Tget_nmembers,
    H5Tget_sign, H5Tget_size, H5Tget_super, H5Tinsert, H5Tis_variable_str, H5Tset_cset,
    H5Tset_size, H5Tset_strpad, H5T_C_S1, H5T_NATIVE_B8, H5T_NATIVE_DOUBLE, H5T_NATIVE_FLOAT,
    H5T_NATIVE_INT16, H5T_NATIVE_INT32, H5T_NATIVE_INT64, H5T_NATIVE_INT8, H5T_NATIVE_UINT16,
    H5T_NATIVE_UINT32, H5T_NATIVE_UINT64, H5T_NATIVE_UINT8, H5T_VARIABLE,
};

use crate::error::{h5check_offset, Error, Result};
use crate::handle::Handle;
use crate::object::{impl_class, ObjectClass};
use crate::sync::sync;
use crate::types::{
    short_type_name, CompoundField, CompoundType, FloatSize, H5Type, IntSize, TypeDescriptor,
};
use crate::util::to_cstring;

/// Broad class of a native datatype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Integer,
    Float,
    Bitfield,
    String,
    Array,
    Compound,
}

/// A native datatype.
pub struct Datatype {
    handle: Handle,
}

impl_class!(Datatype, "datatype", H5I_DATATYPE);

fn int_type(size: IntSize, signed: bool) -> i64 {
    match (size, signed) {
        (IntSize::U1, true) => H5T_NATIVE_INT8,
        (IntSize::U2, true) => H5T_NATIVE_INT16,
        (IntSize::U4, true) => H5T_NATIVE_INT32,
        (IntSize::U8, true) => H5T_NATIVE_INT64,
        (IntSize::U1, false) => H5T_NATIVE_UINT8,
        (IntSize::U2, false) => H5T_NATIVE_UINT16,
        (IntSize::U4, false) => H5T_NATIVE_UINT32,
        (IntSize::U8, false) => H5T_NATIVE_UINT64,
    }
}

impl Datatype {
    /// Builds the native datatype for `T`.
    pub fn from_type<T: H5Type>() -> Result<Self> {
        let descriptor = T::type_descriptor();
        descriptor.validate(short_type_name::<T>())?;
        sync(|| Self::build(&descriptor))
    }

    /// Builds a native datatype from a caller-supplied descriptor.
    pub fn from_descriptor(descriptor: &TypeDescriptor) -> Result<Self> {
        descriptor.validate("value")?;
        sync(|| Self::build(descriptor))
    }

    fn copy_of(id: i64) -> Result<Self> {
        Self::from_id(h5try!(H5Tcopy(id)))
    }

    fn text(size: usize, cset: H5T_cset_t) -> Result<Self> {
        let datatype = Self::copy_of(H5T_C_S1)?;
        let id = datatype.id()?;
        h5try!(H5Tset_size(id, size));
        h5try!(H5Tset_cset(id, cset));
        if size != H5T_VARIABLE {
            h5try!(H5Tset_strpad(id, H5T_str_t::H5T_STR_NULLPAD));
        }
        Ok(datatype)
    }

    fn build(descriptor: &TypeDescriptor) -> Result<Self> {
        match descriptor {
            TypeDescriptor::Integer(size) => Self::copy_of(int_type(*size, true)),
            TypeDescriptor::Unsigned(size) => Self::copy_of(int_type(*size, false)),
            TypeDescriptor::Float(FloatSize::U4) => Self::copy_of(H5T_NATIVE_FLOAT),
            TypeDescriptor::Float(FloatSize::U8) => Self::copy_of(H5T_NATIVE_DOUBLE),
            TypeDescriptor::Boolean => Self::copy_of(H5T_NATIVE_B8),
            TypeDescriptor::FixedAscii(size) => Self::text(*size, H5T_cset_t::H5T_CSET_ASCII),
            TypeDescriptor::FixedUnicode(size) => Self::text(*size, H5T_cset_t::H5T_CSET_UTF8),
            TypeDescriptor::VarLenUnicode => Self::text(H5T_VARIABLE, H5T_cset_t::H5T_CSET_UTF8),
            TypeDescriptor::FixedArray(base, dims) => {
                let base = Self::build(base)?;
                let dims: Vec<hsize_t> = dims.iter().map(|&d| d as hsize_t).collect();
                let base_id = base.id()?;
                Self::from_id(h5try!(H5Tarray_create2(
                    base_id,
                    dims.len() as c_uint,
                    dims.as_ptr()
                )))
            }
            TypeDescriptor::Compound(compound) => {
                let datatype =
                    Self::from_id(h5try!(H5Tcreate(H5T_class_t::H5T_COMPOUND, compound.size)))?;
                let id = datatype.id()?;
                for field in &compound.fields {
                    let member = Self::build(&field.ty)?;
                    let name = to_cstring(&field.name)?;
                    let member_id = member.id()?;
                    h5try!(H5Tinsert(id, name.as_ptr(), field.offset, member_id));
                }
                Ok(datatype)
            }
        }
    }

    /// Element size in bytes.
    pub fn size(&self) -> Result<usize> {
        let id = self.id()?;
        Ok(h5try!(H5Tget_size(id)))
    }

    pub fn class(&self) -> Result<TypeClass> {
        let id = self.id()?;
        sync(|| class_of(id))
    }

    /// Whether both types describe the same layout.
    pub fn same_layout(&self, other: &Datatype) -> Result<bool> {
        let (a, b) = (self.id()?, other.id()?);
        Ok(h5try!(H5Tequal(a, b)) > 0)
    }

    /// Whether this type has exactly the layout `T` reflects to.
    pub fn descriptor_matches<T: H5Type>(&self) -> Result<bool> {
        self.same_layout(&Self::from_type::<T>()?)
    }

    /// Reflects the native type back into a descriptor.
    pub fn to_descriptor(&self) -> Result<TypeDescriptor> {
        let id = self.id()?;
        sync(|| reflect(id, "value"))
    }
}

fn class_of(id: i64) -> Result<TypeClass> {
    match h5try!(H5Tget_class(id)) {
        H5T_class_t::H5T_INTEGER => Ok(TypeClass::Integer),
        H5T_class_t::H5T_FLOAT => Ok(TypeClass::Float),
        H5T_class_t::H5T_BITFIELD => Ok(TypeClass::Bitfield),
        H5T_class_t::H5T_STRING => Ok(TypeClass::String),
        H5T_class_t::H5T_ARRAY => Ok(TypeClass::Array),
        H5T_class_t::H5T_COMPOUND => Ok(TypeClass::Compound),
        other => Err(Error::unsupported_type("value", format!("datatype class {other:?}"))),
    }
}

fn reflect(id: i64, path: &str) -> Result<TypeDescriptor> {
    let size = h5try!(H5Tget_size(id));
    match class_of(id)? {
        TypeClass::Integer => {
            let int = IntSize::from_int(size)
                .ok_or_else(|| Error::unsupported_type(path, format!("{size}-byte integer")))?;
            match h5try!(H5Tget_sign(id)) {
                H5T_sign_t::H5T_SGN_NONE => Ok(TypeDescriptor::Unsigned(int)),
                _ => Ok(TypeDescriptor::Integer(int)),
            }
        }
        TypeClass::Float => FloatSize::from_int(size)
            .map(TypeDescriptor::Float)
            .ok_or_else(|| Error::unsupported_type(path, format!("{size}-byte float"))),
        TypeClass::Bitfield if size == 1 => Ok(TypeDescriptor::Boolean),
        TypeClass::Bitfield => Err(Error::unsupported_type(path, format!("{size}-byte bitfield"))),
        TypeClass::String => {
            let cset = h5try!(H5Tget_cset(id));
            let variable = h5try!(H5Tis_variable_str(id)) > 0;
            match (variable, cset) {
                (true, H5T_cset_t::H5T_CSET_UTF8) => Ok(TypeDescriptor::VarLenUnicode),
                (true, _) => Err(Error::unsupported_type(path, "variable-length ASCII text")),
                (false, H5T_cset_t::H5T_CSET_UTF8) => Ok(TypeDescriptor::FixedUnicode(size)),
                (false, _) => Ok(TypeDescriptor::FixedAscii(size)),
            }
        }
        TypeClass::Array => {
            let rank = h5try!(H5Tget_array_ndims(id)) as usize;
            let mut dims = vec![0 as hsize_t; rank];
            h5try!(H5Tget_array_dims2(id, dims.as_mut_ptr()));
            let base = Datatype::from_id(h5try!(H5Tget_super(id)))?;
            let base_id = base.id()?;
            let base = reflect(base_id, &format!("{path}[]"))?;
            Ok(TypeDescriptor::FixedArray(
                Box::new(base),
                dims.into_iter().map(|d| d as usize).collect(),
            ))
        }
        TypeClass::Compound => {
            let count = h5try!(H5Tget_nmembers(id)) as c_uint;
            let mut fields = Vec::with_capacity(count as usize);
            for idx in 0..count {
                let name = member_name(id, idx)?;
                let offset = sync(|| h5check_offset(H5Tget_member_offset(id, idx)))?;
                let member = Datatype::from_id(h5try!(H5Tget_member_type(id, idx)))?;
                let member_id = member.id()?;
                let ty = reflect(member_id, &format!("{path}.{name}"))?;
                fields.push(CompoundField::new(name, ty, offset));
            }
            Ok(TypeDescriptor::Compound(CompoundType { fields, size }))
        }
    }
}

fn member_name(id: i64, idx: c_uint) -> Result<String> {
    let ptr = h5try!(H5Tget_member_name(id, idx));
    let name = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    h5try!(H5free_memory(ptr.cast()));
    Ok(name)
}
