//! Datasets: typed, shaped arrays stored in a file.

use h5bind_sys::h5::hsize_t;
use h5bind_sys::h5d::{H5Dget_create_plist, H5Dset_extent};

use crate::dataspace::{check_resize, Dataspace};
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::io::Target;
use crate::location::Location;
use crate::object::{impl_class, ObjectClass};
use crate::plist::{Layout, PropertyList};
use crate::types::{H5Type, TypeDescriptor};
use crate::util::ensure_writable;

/// A dataset opened or created through a [`Container`](crate::Container).
pub struct Dataset {
    handle: Handle,
}

impl_class!(Dataset, "dataset", H5I_DATASET);

impl Location for Dataset {}

impl Dataset {
    fn target(&self) -> Result<Target> {
        Ok(Target::Dataset(self.id()?))
    }

    /// A copy of the dataset's current dataspace.
    pub fn space(&self) -> Result<Dataspace> {
        self.target()?.space()
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        self.space()?.shape()
    }

    pub fn ndim(&self) -> Result<usize> {
        self.space()?.rank()
    }

    /// Number of elements in the current extent.
    pub fn size(&self) -> Result<usize> {
        self.space()?.size()
    }

    pub fn maxdims(&self) -> Result<Vec<Option<usize>>> {
        self.space()?.maxdims()
    }

    /// A read-only copy of the stored element type.
    pub fn dtype(&self) -> Result<Datatype> {
        self.target()?.dtype()
    }

    /// A copy of the creation property list.
    pub fn create_plist(&self) -> Result<PropertyList> {
        let id = self.id()?;
        PropertyList::from_id(h5try!(H5Dget_create_plist(id)))
    }

    pub fn layout(&self) -> Result<Layout> {
        self.create_plist()?.layout()
    }

    /// Chunk dimensions, `None` unless the layout is chunked.
    pub fn chunk(&self) -> Result<Option<Vec<usize>>> {
        self.create_plist()?.chunk()
    }

    pub fn is_chunked(&self) -> Result<bool> {
        Ok(self.layout()? == Layout::Chunked)
    }

    pub fn is_resizable(&self) -> Result<bool> {
        self.space()?.is_resizable()
    }

    /// Grows the current extent. Only chunked datasets can change shape, and
    /// each axis must stay between its current size and its maximum.
    /// Existing elements keep their coordinates; new elements read as zero.
    pub fn set_extent(&self, new_current: &[usize]) -> Result<()> {
        let id = self.id()?;
        ensure_writable(id, "resize dataset")?;
        if !self.is_chunked()? {
            return Err(Error::UnsupportedOperation(
                "only chunked datasets can change extent".into(),
            ));
        }
        let extents = check_resize(&self.shape()?, &self.maxdims()?, new_current)?;
        let dims: Vec<hsize_t> = extents.iter().map(|e| e.dim as hsize_t).collect();
        h5try!(H5Dset_extent(id, dims.as_ptr()));
        log::debug!("resized {:?} to {extents}", self.handle);
        Ok(())
    }

    /// Writes every element. `data` must hold exactly one value per element
    /// of the current extent.
    pub fn write<T: H5Type>(&self, data: &[T]) -> Result<()> {
        self.target()?.write(data)
    }

    /// Reads every element in row-major order.
    pub fn read<T: H5Type>(&self) -> Result<Vec<T>> {
        self.target()?.read()
    }

    /// Reads into the front of `buf`, returning the element count.
    pub fn read_into<T: H5Type>(&self, buf: &mut [T]) -> Result<usize> {
        self.target()?.read_into(buf)
    }

    pub fn read_scalar<T: H5Type>(&self) -> Result<T> {
        self.target()?.read_scalar()
    }

    pub fn write_scalar<T: H5Type>(&self, value: &T) -> Result<()> {
        self.target()?.write_scalar(value)
    }

    /// Writes bytes laid out per `descriptor`, which must match the stored
    /// type. Variable-length text is rejected.
    pub fn write_raw(&self, descriptor: &TypeDescriptor, bytes: &[u8]) -> Result<()> {
        self.target()?.write_raw(descriptor, bytes)
    }

    pub fn read_raw(&self, descriptor: &TypeDescriptor) -> Result<Vec<u8>> {
        self.target()?.read_raw(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::location::Container;
    use crate::plist::PropertyListClass;
    use crate::types::{CompoundBuilder, IntSize};

    fn scratch() -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("dataset.h5")).unwrap();
        (dir, file)
    }

    #[test]
    fn write_then_read() {
        let (_dir, file) = scratch();
        let ds = file.new_dataset::<i32>("values", [2usize, 3]).unwrap();
        ds.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(ds.read::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ds.shape().unwrap(), vec![2, 3]);
        assert_eq!(ds.ndim().unwrap(), 2);
        assert_eq!(ds.size().unwrap(), 6);
        assert_eq!(ds.layout().unwrap(), Layout::Contiguous);
        assert_eq!(ds.chunk().unwrap(), None);
        assert_eq!(ds.name().unwrap(), "/values");
    }

    #[test]
    fn element_count_must_match() {
        let (_dir, file) = scratch();
        let ds = file.new_dataset::<u8>("bytes", 4usize).unwrap();
        let err = ds.write(&[1u8, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 4, actual: 3 }));

        ds.write(&[1u8, 2, 3, 4]).unwrap();
        let mut small = [0u8; 2];
        assert!(matches!(ds.read_into(&mut small), Err(Error::SizeMismatch { .. })));
        let mut big = [9u8; 6];
        assert_eq!(ds.read_into(&mut big).unwrap(), 4);
        assert_eq!(big, [1, 2, 3, 4, 9, 9]);
    }

    #[test]
    fn layout_must_match_stored_type() {
        let (_dir, file) = scratch();
        let ds = file.new_dataset::<u16>("counts", 3usize).unwrap();
        assert!(matches!(ds.write(&[1u32, 2, 3]), Err(Error::UnsupportedType { .. })));
        assert!(matches!(ds.read::<i16>(), Err(Error::UnsupportedType { .. })));
        assert!(ds.dtype().unwrap().descriptor_matches::<u16>().unwrap());
    }

    #[test]
    fn scalar_values() {
        let (_dir, file) = scratch();
        let ds = file.new_dataset::<f64>("pi", ()).unwrap();
        ds.write_scalar(&3.25).unwrap();
        assert_eq!(ds.read_scalar::<f64>().unwrap(), 3.25);

        let vector = file.new_dataset::<f64>("vector", 2usize).unwrap();
        assert!(matches!(vector.read_scalar::<f64>(), Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn raw_bytes_with_explicit_schema() {
        let (_dir, file) = scratch();
        let schema = CompoundBuilder::new("Pair")
            .field("tag", TypeDescriptor::Unsigned(IntSize::U1))
            .field("value", TypeDescriptor::Integer(IntSize::U2))
            .finish()
            .unwrap();
        assert_eq!(schema.size(), 3);
        let dtype = Datatype::from_descriptor(&schema).unwrap();
        let space = Dataspace::try_new(2usize).unwrap();
        let ds = file.create_dataset("pairs", &dtype, &space, None).unwrap();

        let bytes = [1u8, 0x34, 0x12, 2, 0xff, 0x00];
        ds.write_raw(&schema, &bytes).unwrap();
        assert_eq!(ds.read_raw(&schema).unwrap(), bytes);
        assert!(matches!(ds.write_raw(&schema, &bytes[..4]), Err(Error::SizeMismatch { .. })));
        assert!(matches!(
            ds.read_raw(&TypeDescriptor::VarLenUnicode),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn resize_needs_chunked_layout() {
        let (_dir, file) = scratch();
        let space = Dataspace::create_simple(&[2], Some(&[None])).unwrap();
        let dtype = Datatype::from_type::<u32>().unwrap();
        let contiguous = file.create_dataset("flat", &dtype, &space, None).unwrap();
        assert!(matches!(contiguous.set_extent(&[4]), Err(Error::UnsupportedOperation(_))));

        let dcpl = PropertyList::new(PropertyListClass::DatasetCreate).unwrap();
        dcpl.set_chunk(&[2]).unwrap();
        let chunked = file.create_dataset("growing", &dtype, &space, Some(&dcpl)).unwrap();
        chunked.write(&[7u32, 8]).unwrap();
        chunked.set_extent(&[5]).unwrap();
        assert_eq!(chunked.read::<u32>().unwrap(), vec![7, 8, 0, 0, 0]);
        chunked.set_extent(&[1]).unwrap();
        assert_eq!(chunked.read::<u32>().unwrap(), vec![7]);
        assert!(matches!(chunked.set_extent(&[1, 1]), Err(Error::DimensionMismatch(_))));
        assert_eq!(chunked.chunk().unwrap(), Some(vec![2]));
    }
}
