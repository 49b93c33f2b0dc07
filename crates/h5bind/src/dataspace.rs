//! Dataspaces: rank, current extents and maximum extents.

use std::fmt;

use h5bind_sys::h5::hsize_t;
use h5bind_sys::h5s::{
    H5S_class_t, H5Scopy, H5Screate, H5Screate_simple, H5Sextent_equal,
    H5Sget_simple_extent_dims, H5Sget_simple_extent_ndims, H5Sget_simple_extent_npoints,
    H5Sget_simple_extent_type, H5Sset_extent_simple, H5S_MAX_RANK, H5S_UNLIMITED,
};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::object::{impl_class, ObjectClass};
use crate::sync::sync;

/// One axis of a simple dataspace: its current size and optional maximum.
/// A `max` of `None` means the axis is unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Extent {
    pub dim: usize,
    pub max: Option<usize>,
}

impl Extent {
    pub fn new(dim: usize, max: Option<usize>) -> Self {
        Self { dim, max }
    }

    pub fn fixed(dim: usize) -> Self {
        Self { dim, max: Some(dim) }
    }

    pub fn resizable(dim: usize) -> Self {
        Self { dim, max: None }
    }

    pub fn is_fixed(&self) -> bool {
        self.max == Some(self.dim)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max.is_none()
    }

    /// Whether `dim` fits under the maximum.
    pub fn is_valid(&self) -> bool {
        self.max.map_or(true, |max| self.dim <= max)
    }
}

impl From<usize> for Extent {
    fn from(dim: usize) -> Self {
        Self::fixed(dim)
    }
}

impl From<(usize, Option<usize>)> for Extent {
    fn from((dim, max): (usize, Option<usize>)) -> Self {
        Self::new(dim, max)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.dim => write!(f, "{}", self.dim),
            Some(max) => write!(f, "{}..{max}", self.dim),
            None => write!(f, "{}..", self.dim),
        }
    }
}

/// Extents of a simple dataspace, one [`Extent`] per axis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SimpleExtents {
    inner: Vec<Extent>,
}

impl SimpleExtents {
    pub fn new<T>(extents: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<Extent>,
    {
        Self {
            inner: extents.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fixed(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Extent::fixed))
    }

    /// All axes unlimited, starting at `dims`.
    pub fn resizable(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Extent::resizable))
    }

    /// Pairs `dims` with `maxdims`, which must have the same length and
    /// bound every axis it does not leave unlimited.
    pub fn with_max(dims: &[usize], maxdims: &[Option<usize>]) -> Result<Self> {
        if dims.len() != maxdims.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} current extents but {} maximum extents",
                dims.len(),
                maxdims.len()
            )));
        }
        let extents = Self::new(dims.iter().zip(maxdims).map(|(&d, &m)| Extent::new(d, m)));
        extents.check()?;
        Ok(extents)
    }

    fn check(&self) -> Result<()> {
        if self.inner.len() > H5S_MAX_RANK as usize {
            return Err(Error::RangeError(format!(
                "rank {} exceeds the maximum of {H5S_MAX_RANK}",
                self.inner.len()
            )));
        }
        match self.inner.iter().position(|e| !e.is_valid()) {
            Some(axis) => Err(Error::RangeError(format!(
                "axis {axis}: current extent exceeds its maximum ({})",
                self.inner[axis]
            ))),
            None => Ok(()),
        }
    }

    pub fn ndim(&self) -> usize {
        self.inner.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.inner.iter().map(|e| e.dim).collect()
    }

    pub fn maxdims(&self) -> Vec<Option<usize>> {
        self.inner.iter().map(|e| e.max).collect()
    }

    pub fn size(&self) -> usize {
        self.inner.iter().map(|e| e.dim).product()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Extent> {
        self.inner.iter()
    }

    /// Whether any axis can grow past its current size.
    pub fn is_resizable(&self) -> bool {
        self.inner.iter().any(|e| !e.is_fixed())
    }

    pub fn is_unlimited(&self) -> bool {
        self.inner.iter().any(Extent::is_unlimited)
    }
}

impl From<&[usize]> for SimpleExtents {
    fn from(dims: &[usize]) -> Self {
        Self::fixed(dims)
    }
}

impl From<Vec<usize>> for SimpleExtents {
    fn from(dims: Vec<usize>) -> Self {
        Self::fixed(&dims)
    }
}

impl<const N: usize> From<[usize; N]> for SimpleExtents {
    fn from(dims: [usize; N]) -> Self {
        Self::fixed(&dims)
    }
}

impl From<Vec<Extent>> for SimpleExtents {
    fn from(inner: Vec<Extent>) -> Self {
        Self { inner }
    }
}

impl fmt::Display for SimpleExtents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, extent) in self.inner.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{extent}")?;
        }
        f.write_str(")")
    }
}

/// Shape of a dataspace in any of its three forms.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Extents {
    /// No elements at all.
    Null,
    /// Exactly one element, rank 0.
    Scalar,
    Simple(SimpleExtents),
}

impl Extents {
    pub fn ndim(&self) -> usize {
        match self {
            Extents::Simple(simple) => simple.ndim(),
            _ => 0,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Extents::Simple(simple) => simple.dims(),
            _ => Vec::new(),
        }
    }

    pub fn maxdims(&self) -> Vec<Option<usize>> {
        match self {
            Extents::Simple(simple) => simple.maxdims(),
            _ => Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Extents::Null => 0,
            Extents::Scalar => 1,
            Extents::Simple(simple) => simple.size(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Extents::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Extents::Scalar)
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Extents::Simple(_))
    }

    pub fn is_resizable(&self) -> bool {
        matches!(self, Extents::Simple(simple) if simple.is_resizable())
    }
}

impl From<()> for Extents {
    fn from(_: ()) -> Self {
        Extents::Scalar
    }
}

impl From<usize> for Extents {
    fn from(dim: usize) -> Self {
        Extents::Simple(SimpleExtents::fixed(&[dim]))
    }
}

impl From<&[usize]> for Extents {
    fn from(dims: &[usize]) -> Self {
        Extents::Simple(dims.into())
    }
}

impl From<Vec<usize>> for Extents {
    fn from(dims: Vec<usize>) -> Self {
        Extents::Simple(dims.into())
    }
}

impl<const N: usize> From<[usize; N]> for Extents {
    fn from(dims: [usize; N]) -> Self {
        Extents::Simple(dims.into())
    }
}

impl From<SimpleExtents> for Extents {
    fn from(simple: SimpleExtents) -> Self {
        Extents::Simple(simple)
    }
}

fn to_native_max(max: Option<usize>) -> hsize_t {
    max.map_or(H5S_UNLIMITED, |m| m as hsize_t)
}

fn from_native_max(max: hsize_t) -> Option<usize> {
    (max != H5S_UNLIMITED).then_some(max as usize)
}

/// A native dataspace.
pub struct Dataspace {
    handle: Handle,
}

impl_class!(Dataspace, "dataspace", H5I_DATASPACE);

impl Dataspace {
    /// Creates a simple dataspace. Without `max` every axis is fixed at its
    /// current size; a `None` entry in `max` leaves that axis unlimited.
    pub fn create_simple(current: &[usize], max: Option<&[Option<usize>]>) -> Result<Self> {
        let extents = match max {
            Some(max) => SimpleExtents::with_max(current, max)?,
            None => SimpleExtents::fixed(current),
        };
        Self::try_new(extents)
    }

    pub fn scalar() -> Result<Self> {
        Self::try_new(Extents::Scalar)
    }

    pub fn null() -> Result<Self> {
        Self::try_new(Extents::Null)
    }

    pub fn try_new(extents: impl Into<Extents>) -> Result<Self> {
        match extents.into() {
            Extents::Null => Self::from_id(h5try!(H5Screate(H5S_class_t::H5S_NULL))),
            Extents::Scalar => Self::from_id(h5try!(H5Screate(H5S_class_t::H5S_SCALAR))),
            Extents::Simple(simple) => {
                simple.check()?;
                if simple.ndim() == 0 {
                    return Err(Error::DimensionMismatch(
                        "simple dataspace needs at least one axis".into(),
                    ));
                }
                let dims: Vec<hsize_t> = simple.iter().map(|e| e.dim as hsize_t).collect();
                let max: Vec<hsize_t> = simple.iter().map(|e| to_native_max(e.max)).collect();
                let rank = dims.len() as i32;
                Self::from_id(h5try!(H5Screate_simple(rank, dims.as_ptr(), max.as_ptr())))
            }
        }
    }

    pub fn copy(&self) -> Result<Self> {
        let id = self.id()?;
        Self::from_id(h5try!(H5Scopy(id)))
    }

    pub fn rank(&self) -> Result<usize> {
        let id = self.id()?;
        Ok(h5try!(H5Sget_simple_extent_ndims(id)) as usize)
    }

    fn native_dims(&self) -> Result<(Vec<hsize_t>, Vec<hsize_t>)> {
        let id = self.id()?;
        sync(|| {
            let rank = h5try!(H5Sget_simple_extent_ndims(id)) as usize;
            let mut dims = vec![0; rank];
            let mut max = vec![0; rank];
            if rank > 0 {
                h5try!(H5Sget_simple_extent_dims(id, dims.as_mut_ptr(), max.as_mut_ptr()));
            }
            Ok((dims, max))
        })
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        Ok(self.native_dims()?.0.into_iter().map(|d| d as usize).collect())
    }

    pub fn maxdims(&self) -> Result<Vec<Option<usize>>> {
        Ok(self.native_dims()?.1.into_iter().map(from_native_max).collect())
    }

    /// Number of elements.
    pub fn size(&self) -> Result<usize> {
        let id = self.id()?;
        Ok(h5try!(H5Sget_simple_extent_npoints(id)) as usize)
    }

    fn class(&self) -> Result<H5S_class_t> {
        let id = self.id()?;
        Ok(h5try!(H5Sget_simple_extent_type(id)))
    }

    pub fn is_scalar(&self) -> Result<bool> {
        Ok(self.class()? == H5S_class_t::H5S_SCALAR)
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(self.class()? == H5S_class_t::H5S_NULL)
    }

    pub fn is_simple(&self) -> Result<bool> {
        Ok(self.class()? == H5S_class_t::H5S_SIMPLE)
    }

    pub fn is_resizable(&self) -> Result<bool> {
        Ok(self.extents()?.is_resizable())
    }

    pub fn extents(&self) -> Result<Extents> {
        Ok(match self.class()? {
            H5S_class_t::H5S_NULL => Extents::Null,
            H5S_class_t::H5S_SCALAR => Extents::Scalar,
            _ => {
                let (dims, max) = self.native_dims()?;
                Extents::Simple(SimpleExtents::new(
                    dims.into_iter()
                        .zip(max)
                        .map(|(d, m)| Extent::new(d as usize, from_native_max(m))),
                ))
            }
        })
    }

    /// Grows the current extents, keeping the maximum extents. The rank
    /// must stay the same and each axis must stay between its current size
    /// and its maximum.
    pub fn set_extent(&self, new_current: &[usize]) -> Result<()> {
        let id = self.id()?;
        let extents = check_resize(&self.shape()?, &self.maxdims()?, new_current)?;
        let dims: Vec<hsize_t> = extents.iter().map(|e| e.dim as hsize_t).collect();
        let max: Vec<hsize_t> = extents.iter().map(|e| to_native_max(e.max)).collect();
        h5try!(H5Sset_extent_simple(id, dims.len() as i32, dims.as_ptr(), max.as_ptr()));
        Ok(())
    }

    /// Compares the extents of two dataspaces element-wise.
    pub fn extent_equal(&self, other: &Dataspace) -> Result<bool> {
        let (a, b) = (self.id()?, other.id()?);
        Ok(h5try!(H5Sextent_equal(a, b)) > 0)
    }
}

/// Validates growing a simple extent from `current` (with maxima `max`) to
/// `new_current`.
pub(crate) fn check_resize(
    current: &[usize],
    max: &[Option<usize>],
    new_current: &[usize],
) -> Result<SimpleExtents> {
    if max.len() != new_current.len() {
        return Err(Error::DimensionMismatch(format!(
            "dataspace has rank {}, new extent has rank {}",
            max.len(),
            new_current.len()
        )));
    }
    if let Some((axis, (old, new))) = current
        .iter()
        .zip(new_current)
        .enumerate()
        .find(|(_, (old, new))| new < old)
    {
        return Err(Error::RangeError(format!(
            "extents only grow: axis {axis} is {old}, requested {new}"
        )));
    }
    let extents = SimpleExtents::new(new_current.iter().zip(max).map(|(&d, &m)| Extent::new(d, m)));
    extents.check()?;
    Ok(extents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_with_maximum() {
        let space = Dataspace::create_simple(&[20, 5], Some(&[Some(40), Some(5)])).unwrap();
        assert_eq!(space.rank().unwrap(), 2);
        assert_eq!(space.shape().unwrap(), vec![20, 5]);
        assert_eq!(space.maxdims().unwrap(), vec![Some(40), Some(5)]);
        assert_eq!(space.size().unwrap(), 100);
        assert!(space.is_simple().unwrap());
        assert!(space.is_resizable().unwrap());
    }

    #[test]
    fn creation_checks() {
        let err = Dataspace::create_simple(&[2, 3], Some(&[Some(2)])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
        let err = Dataspace::create_simple(&[5], Some(&[Some(4)])).unwrap_err();
        assert!(matches!(err, Error::RangeError(_)));
        let unlimited = Dataspace::create_simple(&[5], Some(&[None])).unwrap();
        assert_eq!(unlimited.maxdims().unwrap(), vec![None]);
    }

    #[test]
    fn set_extent_respects_maximum() {
        let space = Dataspace::create_simple(&[20, 5], Some(&[Some(40), Some(5)])).unwrap();
        space.set_extent(&[30, 5]).unwrap();
        assert_eq!(space.shape().unwrap(), vec![30, 5]);
        assert!(matches!(space.set_extent(&[41, 5]), Err(Error::RangeError(_))));
        assert!(matches!(space.set_extent(&[30]), Err(Error::DimensionMismatch(_))));
        assert_eq!(space.shape().unwrap(), vec![30, 5]);
    }

    #[test]
    fn set_extent_never_shrinks() {
        let space = Dataspace::create_simple(&[20, 5], Some(&[Some(40), None])).unwrap();
        assert!(matches!(space.set_extent(&[19, 5]), Err(Error::RangeError(_))));
        assert!(matches!(space.set_extent(&[25, 4]), Err(Error::RangeError(_))));
        assert_eq!(space.shape().unwrap(), vec![20, 5]);
        space.set_extent(&[20, 5]).unwrap();
        space.set_extent(&[20, 9]).unwrap();
        assert_eq!(space.shape().unwrap(), vec![20, 9]);
    }

    #[test]
    fn scalar_and_null() {
        let scalar = Dataspace::scalar().unwrap();
        assert!(scalar.is_scalar().unwrap());
        assert_eq!(scalar.size().unwrap(), 1);
        assert_eq!(scalar.extents().unwrap(), Extents::Scalar);
        let null = Dataspace::null().unwrap();
        assert!(null.is_null().unwrap());
        assert_eq!(null.size().unwrap(), 0);
        assert_eq!(null.rank().unwrap(), 0);
    }

    #[test]
    fn copies_are_independent() {
        let space = Dataspace::create_simple(&[3], Some(&[None])).unwrap();
        let copy = space.copy().unwrap();
        assert_ne!(space, copy);
        assert!(space.extent_equal(&copy).unwrap());
        copy.set_extent(&[7]).unwrap();
        assert!(!space.extent_equal(&copy).unwrap());
        assert_eq!(space.shape().unwrap(), vec![3]);
    }

    #[test]
    fn extents_conversions() {
        assert_eq!(Extents::from(()), Extents::Scalar);
        assert_eq!(Extents::from(4usize).dims(), vec![4]);
        assert_eq!(Extents::from([2usize, 3]).size(), 6);
        assert!(!Extents::from(vec![2usize, 3]).is_resizable());
        let simple = SimpleExtents::new([Extent::resizable(2), Extent::fixed(3)]);
        assert!(simple.is_unlimited());
        assert_eq!(simple.to_string(), "(2.., 3)");
    }

    #[test]
    fn closed_dataspace_fails_fast() {
        let space = Dataspace::scalar().unwrap();
        space.close().unwrap();
        space.close().unwrap();
        assert!(matches!(space.size(), Err(Error::InvalidHandle)));
    }
}
