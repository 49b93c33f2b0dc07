//! Host-side type reflection.
//!
//! [`TypeDescriptor`] describes the byte layout of one element: atomic
//! numbers, fixed arrays, fixed and variable-length text, and compounds
//! with named, offset-located fields. [`H5Type`] ties a Rust type to its
//! descriptor; it is implemented here for primitives, arrays and the string
//! types of this module, and derived for structs with `#[derive(H5Type)]`.

use std::collections::HashSet;
use std::ffi::CStr;
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::os::raw::c_char;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Width of an integer in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntSize {
    U1 = 1,
    U2 = 2,
    U4 = 4,
    U8 = 8,
}

impl IntSize {
    pub fn from_int(size: usize) -> Option<Self> {
        match size {
            1 => Some(IntSize::U1),
            2 => Some(IntSize::U2),
            4 => Some(IntSize::U4),
            8 => Some(IntSize::U8),
            _ => None,
        }
    }
}

/// Width of a float in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatSize {
    U4 = 4,
    U8 = 8,
}

impl FloatSize {
    pub fn from_int(size: usize) -> Option<Self> {
        match size {
            4 => Some(FloatSize::U4),
            8 => Some(FloatSize::U8),
            _ => None,
        }
    }
}

/// One named member of a compound type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundField {
    pub name: String,
    pub ty: TypeDescriptor,
    pub offset: usize,
}

impl CompoundField {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor, offset: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            offset,
        }
    }

    /// Looks up a field by name. Fields are searched in declaration order.
    pub fn find<'a>(fields: &'a [CompoundField], name: &str) -> Option<&'a CompoundField> {
        fields.iter().find(|f| f.name == name)
    }
}

/// A record of named fields. `size` includes trailing padding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundType {
    pub fields: Vec<CompoundField>,
    pub size: usize,
}

impl CompoundType {
    pub fn field(&self, name: &str) -> Option<&CompoundField> {
        CompoundField::find(&self.fields, name)
    }

    /// Fields sorted by offset.
    pub fn ordered(&self) -> Vec<&CompoundField> {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.offset);
        fields
    }
}

/// Layout of one element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Integer(IntSize),
    Unsigned(IntSize),
    Float(FloatSize),
    /// One byte, 0 or 1.
    Boolean,
    /// Element type and dimensions, outermost first.
    FixedArray(Box<TypeDescriptor>, Vec<usize>),
    /// Inline ASCII text of the given byte capacity.
    FixedAscii(usize),
    /// Inline UTF-8 text of the given byte capacity.
    FixedUnicode(usize),
    /// Pointer to a NUL-terminated UTF-8 string.
    VarLenUnicode,
    Compound(CompoundType),
}

impl TypeDescriptor {
    /// Element size in bytes.
    pub fn size(&self) -> usize {
        match self {
            TypeDescriptor::Integer(size) | TypeDescriptor::Unsigned(size) => *size as usize,
            TypeDescriptor::Float(size) => *size as usize,
            TypeDescriptor::Boolean => 1,
            TypeDescriptor::FixedArray(base, dims) => base.size() * dims.iter().product::<usize>(),
            TypeDescriptor::FixedAscii(len) | TypeDescriptor::FixedUnicode(len) => *len,
            TypeDescriptor::VarLenUnicode => mem::size_of::<*const c_char>(),
            TypeDescriptor::Compound(compound) => compound.size,
        }
    }

    /// Whether any part of the element is a pointer to separately
    /// allocated memory.
    pub fn is_variable(&self) -> bool {
        match self {
            TypeDescriptor::VarLenUnicode => true,
            TypeDescriptor::FixedArray(base, _) => base.is_variable(),
            TypeDescriptor::Compound(compound) => compound.fields.iter().any(|f| f.ty.is_variable()),
            _ => false,
        }
    }

    /// Checks that the descriptor can be built natively. `root` names the
    /// described type and prefixes the field path of any error.
    pub fn validate(&self, root: &str) -> Result<()> {
        match self {
            TypeDescriptor::FixedArray(base, dims) => {
                if dims.is_empty() {
                    return Err(Error::unsupported_type(root, "array without dimensions"));
                }
                if dims.len() > h5bind_sys::h5t::H5T_ARRAY_MAX_RANK as usize {
                    return Err(Error::unsupported_type(
                        root,
                        format!("array rank {} is too high", dims.len()),
                    ));
                }
                if dims.contains(&0) {
                    return Err(Error::unsupported_type(root, "zero-sized array dimension"));
                }
                base.validate(&format!("{root}[]"))
            }
            TypeDescriptor::FixedAscii(0) | TypeDescriptor::FixedUnicode(0) => {
                Err(Error::unsupported_type(root, "fixed-size text of length zero"))
            }
            TypeDescriptor::Compound(compound) => validate_compound(compound, root),
            _ => Ok(()),
        }
    }
}

fn validate_compound(compound: &CompoundType, root: &str) -> Result<()> {
    if compound.fields.is_empty() {
        return Err(Error::unsupported_type(root, "compound without fields"));
    }
    let mut names = HashSet::new();
    for field in &compound.fields {
        let path = format!("{root}.{}", field.name);
        if field.name.is_empty() || field.name.contains('\0') {
            return Err(Error::unsupported_type(path, "invalid field name"));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::unsupported_type(path, "duplicate field name"));
        }
        field.ty.validate(&path)?;
        if field.offset + field.ty.size() > compound.size {
            return Err(Error::unsupported_type(
                path,
                format!(
                    "field ends at byte {} past the compound size {}",
                    field.offset + field.ty.size(),
                    compound.size
                ),
            ));
        }
    }
    let ordered = compound.ordered();
    for pair in ordered.windows(2) {
        if pair[0].offset + pair[0].ty.size() > pair[1].offset {
            return Err(Error::unsupported_type(
                format!("{root}.{}", pair[1].name),
                format!("field overlaps `{}`", pair[0].name),
            ));
        }
    }
    Ok(())
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Integer(size) => write!(f, "i{}", *size as usize * 8),
            TypeDescriptor::Unsigned(size) => write!(f, "u{}", *size as usize * 8),
            TypeDescriptor::Float(size) => write!(f, "f{}", *size as usize * 8),
            TypeDescriptor::Boolean => f.write_str("bool"),
            TypeDescriptor::FixedArray(base, dims) => {
                write!(f, "[{base}; ")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str("x")?;
                    }
                    write!(f, "{dim}")?;
                }
                f.write_str("]")
            }
            TypeDescriptor::FixedAscii(len) => write!(f, "string, ascii, {len} bytes"),
            TypeDescriptor::FixedUnicode(len) => write!(f, "string, utf8, {len} bytes"),
            TypeDescriptor::VarLenUnicode => f.write_str("string, utf8, variable"),
            TypeDescriptor::Compound(compound) => {
                write!(f, "compound ({} bytes) {{", compound.size)?;
                for (i, field) in compound.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {} @{}: {}", field.name, field.offset, field.ty)?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// A Rust type with a known element layout.
///
/// # Safety
///
/// `type_descriptor()` must describe the in-memory layout of `Self`
/// exactly: every byte it marks as data is initialized, the sizes and
/// offsets are those the compiler uses, and any value the native library
/// may write according to the descriptor is a valid `Self`.
pub unsafe trait H5Type: 'static {
    fn type_descriptor() -> TypeDescriptor;
}

macro_rules! impl_h5type {
    ($ty:ty, $variant:ident, $size:expr) => {
        unsafe impl H5Type for $ty {
            #[inline]
            fn type_descriptor() -> TypeDescriptor {
                TypeDescriptor::$variant($size)
            }
        }
    };
}

impl_h5type!(i8, Integer, IntSize::U1);
impl_h5type!(i16, Integer, IntSize::U2);
impl_h5type!(i32, Integer, IntSize::U4);
impl_h5type!(i64, Integer, IntSize::U8);
impl_h5type!(u8, Unsigned, IntSize::U1);
impl_h5type!(u16, Unsigned, IntSize::U2);
impl_h5type!(u32, Unsigned, IntSize::U4);
impl_h5type!(u64, Unsigned, IntSize::U8);
impl_h5type!(f32, Float, FloatSize::U4);
impl_h5type!(f64, Float, FloatSize::U8);

#[cfg(target_pointer_width = "32")]
impl_h5type!(isize, Integer, IntSize::U4);
#[cfg(target_pointer_width = "32")]
impl_h5type!(usize, Unsigned, IntSize::U4);
#[cfg(target_pointer_width = "64")]
impl_h5type!(isize, Integer, IntSize::U8);
#[cfg(target_pointer_width = "64")]
impl_h5type!(usize, Unsigned, IntSize::U8);

unsafe impl H5Type for bool {
    #[inline]
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Boolean
    }
}

/// Nested arrays collapse into one multi-dimensional array type.
unsafe impl<T: H5Type, const N: usize> H5Type for [T; N] {
    fn type_descriptor() -> TypeDescriptor {
        match T::type_descriptor() {
            TypeDescriptor::FixedArray(base, inner) => {
                let mut dims = Vec::with_capacity(inner.len() + 1);
                dims.push(N);
                dims.extend(inner);
                TypeDescriptor::FixedArray(base, dims)
            }
            base => TypeDescriptor::FixedArray(Box::new(base), vec![N]),
        }
    }
}

/// Errors converting Rust strings into the string types of this module.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StringError {
    #[error("string of {len} bytes exceeds the capacity of {capacity} bytes")]
    TooLong { len: usize, capacity: usize },
    #[error("string contains non-ASCII characters")]
    NonAscii,
    #[error("string contains an interior NUL byte")]
    InteriorNul,
}

/// Content of a NUL-padded buffer, up to the first NUL.
fn trimmed(buf: &[u8]) -> &[u8] {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..len]
}

fn fill<const N: usize>(bytes: &[u8]) -> Result<[u8; N], StringError> {
    if bytes.len() > N {
        return Err(StringError::TooLong {
            len: bytes.len(),
            capacity: N,
        });
    }
    if bytes.contains(&0) {
        return Err(StringError::InteriorNul);
    }
    let mut buf = [0u8; N];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

macro_rules! fixed_string {
    ($name:ident, $variant:ident) => {
        impl<const N: usize> $name<N> {
            pub const fn capacity() -> usize {
                N
            }

            pub fn len(&self) -> usize {
                trimmed(&self.buf).len()
            }

            pub fn is_empty(&self) -> bool {
                self.buf.first().map_or(true, |&b| b == 0)
            }

            pub fn as_bytes(&self) -> &[u8] {
                trimmed(&self.buf)
            }
        }

        impl<const N: usize> Default for $name<N> {
            fn default() -> Self {
                Self { buf: [0; N] }
            }
        }

        impl<const N: usize> Deref for $name<N> {
            type Target = str;

            fn deref(&self) -> &str {
                self.as_str()
            }
        }

        impl<const N: usize> PartialEq<str> for $name<N> {
            fn eq(&self, other: &str) -> bool {
                self.as_str() == other
            }
        }

        impl<const N: usize> PartialEq<&str> for $name<N> {
            fn eq(&self, other: &&str) -> bool {
                self.as_str() == *other
            }
        }

        impl<const N: usize> fmt::Debug for $name<N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self.as_str(), f)
            }
        }

        impl<const N: usize> fmt::Display for $name<N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl<const N: usize> FromStr for $name<N> {
            type Err = StringError;

            fn from_str(s: &str) -> Result<Self, StringError> {
                Self::try_from_str(s)
            }
        }

        unsafe impl<const N: usize> H5Type for $name<N> {
            fn type_descriptor() -> TypeDescriptor {
                TypeDescriptor::$variant(N)
            }
        }
    };
}

/// Inline ASCII text of at most `N` bytes, NUL-padded.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedAscii<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> FixedAscii<N> {
    pub fn try_from_str(s: &str) -> Result<Self, StringError> {
        if !s.is_ascii() {
            return Err(StringError::NonAscii);
        }
        Ok(Self { buf: fill(s.as_bytes())? })
    }

    pub fn as_str(&self) -> &str {
        // Bytes past 0x7f only come from foreign writers.
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) if s.is_ascii() => s,
            _ => "",
        }
    }
}

fixed_string!(FixedAscii, FixedAscii);

/// Inline UTF-8 text of at most `N` bytes, NUL-padded.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedUnicode<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> FixedUnicode<N> {
    pub fn try_from_str(s: &str) -> Result<Self, StringError> {
        Ok(Self { buf: fill(s.as_bytes())? })
    }

    /// The text, cut at the last complete character if the stored bytes
    /// are not valid UTF-8.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

fixed_string!(FixedUnicode, FixedUnicode);

/// Owned variable-length UTF-8 string.
///
/// Stored as a single pointer to a NUL-terminated buffer allocated with the
/// C allocator, which is the element layout the native library reads and
/// writes. A null pointer is the empty string.
#[repr(transparent)]
pub struct VarLenUnicode {
    ptr: *mut c_char,
}

// The buffer is uniquely owned and never mutated through a shared reference.
unsafe impl Send for VarLenUnicode {}
unsafe impl Sync for VarLenUnicode {}

impl VarLenUnicode {
    pub fn new() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    pub fn try_from_str(s: &str) -> Result<Self, StringError> {
        if s.as_bytes().contains(&0) {
            return Err(StringError::InteriorNul);
        }
        if s.is_empty() {
            return Ok(Self::new());
        }
        let layout = std::alloc::Layout::array::<u8>(s.len() + 1).map_err(|_| StringError::TooLong {
            len: s.len(),
            capacity: isize::MAX as usize,
        })?;
        unsafe {
            let ptr = libc::malloc(layout.size()) as *mut u8;
            if ptr.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr, s.len());
            *ptr.add(s.len()) = 0;
            Ok(Self { ptr: ptr.cast() })
        }
    }

    pub fn as_str(&self) -> &str {
        if self.ptr.is_null() {
            return "";
        }
        let bytes = unsafe { CStr::from_ptr(self.ptr) }.to_bytes();
        match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl Default for VarLenUnicode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VarLenUnicode {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { libc::free(self.ptr.cast()) };
        }
    }
}

impl Clone for VarLenUnicode {
    fn clone(&self) -> Self {
        // Cannot fail: the content has no interior NUL.
        Self::try_from_str(self.as_str()).unwrap_or_default()
    }
}

impl Deref for VarLenUnicode {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for VarLenUnicode {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for VarLenUnicode {}

impl PartialEq<str> for VarLenUnicode {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for VarLenUnicode {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for VarLenUnicode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for VarLenUnicode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarLenUnicode {
    type Err = StringError;

    fn from_str(s: &str) -> Result<Self, StringError> {
        Self::try_from_str(s)
    }
}

unsafe impl H5Type for VarLenUnicode {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::VarLenUnicode
    }
}

/// Builds a compound descriptor from an explicit schema.
///
/// Fields are placed either at explicit offsets ([`field_at`]) or packed
/// after the previous field ([`field`]). [`finish`] validates the result.
///
/// [`field_at`]: CompoundBuilder::field_at
/// [`field`]: CompoundBuilder::field
/// [`finish`]: CompoundBuilder::finish
#[derive(Clone, Debug)]
pub struct CompoundBuilder {
    name: String,
    fields: Vec<CompoundField>,
    size: Option<usize>,
    cursor: usize,
}

impl CompoundBuilder {
    /// `name` labels the type in validation errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            size: None,
            cursor: 0,
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let offset = self.cursor;
        self.cursor += ty.size();
        self.fields.push(CompoundField::new(name, ty, offset));
        self
    }

    pub fn field_at(mut self, name: impl Into<String>, ty: TypeDescriptor, offset: usize) -> Self {
        self.cursor = self.cursor.max(offset + ty.size());
        self.fields.push(CompoundField::new(name, ty, offset));
        self
    }

    pub fn field_of<T: H5Type>(self, name: impl Into<String>) -> Self {
        self.field(name, T::type_descriptor())
    }

    /// Total size including trailing padding. Defaults to the end of the
    /// last field.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn finish(self) -> Result<TypeDescriptor> {
        let descriptor = TypeDescriptor::Compound(CompoundType {
            size: self.size.unwrap_or(self.cursor),
            fields: self.fields,
        });
        descriptor.validate(&self.name)?;
        Ok(descriptor)
    }
}

/// Short name of a Rust type, used as the root of field paths.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_descriptors() {
        assert_eq!(i16::type_descriptor(), TypeDescriptor::Integer(IntSize::U2));
        assert_eq!(u64::type_descriptor(), TypeDescriptor::Unsigned(IntSize::U8));
        assert_eq!(f32::type_descriptor(), TypeDescriptor::Float(FloatSize::U4));
        assert_eq!(bool::type_descriptor(), TypeDescriptor::Boolean);
        assert_eq!(usize::type_descriptor().size(), mem::size_of::<usize>());
    }

    #[test]
    fn nested_arrays_collapse() {
        let td = <[[u16; 3]; 2]>::type_descriptor();
        assert_eq!(
            td,
            TypeDescriptor::FixedArray(Box::new(TypeDescriptor::Unsigned(IntSize::U2)), vec![2, 3])
        );
        assert_eq!(td.size(), 12);
        assert_eq!(td.to_string(), "[u16; 2x3]");
    }

    #[test]
    fn string_descriptors() {
        assert_eq!(FixedAscii::<8>::type_descriptor(), TypeDescriptor::FixedAscii(8));
        assert_eq!(FixedUnicode::<5>::type_descriptor().size(), 5);
        let vl = VarLenUnicode::type_descriptor();
        assert_eq!(vl.size(), mem::size_of::<VarLenUnicode>());
        assert!(vl.is_variable());
        assert!(<[VarLenUnicode; 2]>::type_descriptor().is_variable());
    }

    #[test]
    fn fixed_ascii() {
        let s = FixedAscii::<6>::try_from_str("abc").unwrap();
        assert_eq!(s.as_str(), "abc");
        assert_eq!(s.len(), 3);
        assert_eq!(s, "abc");
        assert_eq!(FixedAscii::<6>::capacity(), 6);
        assert!(FixedAscii::<2>::default().is_empty());
        assert_eq!(
            FixedAscii::<2>::try_from_str("abc"),
            Err(StringError::TooLong { len: 3, capacity: 2 })
        );
        assert_eq!(FixedAscii::<8>::try_from_str("h\u{e9}"), Err(StringError::NonAscii));
        assert_eq!(FixedAscii::<8>::try_from_str("a\0b"), Err(StringError::InteriorNul));
        let full = FixedAscii::<3>::try_from_str("xyz").unwrap();
        assert_eq!(full.as_str(), "xyz");
    }

    #[test]
    fn fixed_unicode() {
        let s: FixedUnicode<8> = "d\u{e9}j\u{e0}".parse().unwrap();
        assert_eq!(s.as_str(), "d\u{e9}j\u{e0}");
        assert_eq!(s.len(), 6);
        assert_eq!(format!("{s:?}"), "\"d\u{e9}j\u{e0}\"");
        let mut cut = s;
        cut.buf[5] = 0xff;
        assert_eq!(cut.as_str(), "d\u{e9}j");
    }

    #[test]
    fn var_len_unicode() {
        let s = VarLenUnicode::try_from_str("h\u{e9}llo").unwrap();
        assert_eq!(&*s, "h\u{e9}llo");
        let copy = s.clone();
        assert_eq!(copy, s);
        assert_ne!(copy.ptr, s.ptr);
        assert!(VarLenUnicode::try_from_str("").unwrap().ptr.is_null());
        assert_eq!(VarLenUnicode::new().as_str(), "");
        assert_eq!(
            VarLenUnicode::try_from_str("a\0").unwrap_err(),
            StringError::InteriorNul
        );
    }

    #[test]
    fn builder_packs_fields() {
        let td = CompoundBuilder::new("Packed")
            .field_of::<u8>("tag")
            .field_of::<f64>("value")
            .finish()
            .unwrap();
        let TypeDescriptor::Compound(compound) = &td else {
            panic!("not a compound: {td}");
        };
        assert_eq!(compound.size, 9);
        assert_eq!(compound.field("value").unwrap().offset, 1);
    }

    #[test]
    fn validation_names_the_field_path() {
        let samples = TypeDescriptor::FixedArray(Box::new(TypeDescriptor::FixedAscii(0)), vec![4]);
        let err = CompoundBuilder::new("Reading")
            .field_of::<u32>("id")
            .field("samples", samples)
            .finish()
            .unwrap_err();
        match err {
            Error::UnsupportedType { path, .. } => assert_eq!(path, "Reading.samples[]"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_bad_layouts() {
        let overlap = CompoundBuilder::new("T")
            .field_at("a", TypeDescriptor::Integer(IntSize::U4), 0)
            .field_at("b", TypeDescriptor::Integer(IntSize::U4), 2)
            .finish();
        assert!(matches!(overlap, Err(Error::UnsupportedType { path, .. }) if path == "T.b"));

        let duplicate = CompoundBuilder::new("T")
            .field_of::<u8>("a")
            .field_of::<u8>("a")
            .finish();
        assert!(matches!(duplicate, Err(Error::UnsupportedType { .. })));

        let short = CompoundBuilder::new("T").field_of::<u64>("a").size(4).finish();
        assert!(matches!(short, Err(Error::UnsupportedType { path, .. }) if path == "T.a"));

        let empty = CompoundBuilder::new("T").finish();
        assert!(matches!(empty, Err(Error::UnsupportedType { path, .. }) if path == "T"));
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name::<FixedAscii<4>>(), "FixedAscii");
        assert_eq!(short_type_name::<u8>(), "u8");
    }
}
