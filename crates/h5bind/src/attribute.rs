//! Attributes: small named values attached to a file, group or dataset.
//!
//! Attributes are created and opened through [`Location`](crate::Location).
//! They have a fixed shape and no creation property list.

use h5bind_sys::h5a::H5Aget_name;

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::Result;
use crate::handle::Handle;
use crate::io::Target;
use crate::object::{impl_class, ObjectClass};
use crate::types::H5Type;
use crate::util::get_h5_str;

pub struct Attribute {
    handle: Handle,
}

impl_class!(Attribute, "attribute", H5I_ATTR);

impl Attribute {
    fn target(&self) -> Result<Target> {
        Ok(Target::Attribute(self.id()?))
    }

    /// The attribute's own name, not the path of its owner.
    pub fn name(&self) -> Result<String> {
        let id = self.id()?;
        get_h5_str(|buf, size| unsafe { H5Aget_name(id, size, buf) })
    }

    pub fn space(&self) -> Result<Dataspace> {
        self.target()?.space()
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        self.space()?.shape()
    }

    pub fn size(&self) -> Result<usize> {
        self.space()?.size()
    }

    pub fn dtype(&self) -> Result<Datatype> {
        self.target()?.dtype()
    }

    pub fn write<T: H5Type>(&self, data: &[T]) -> Result<()> {
        self.target()?.write(data)
    }

    pub fn read<T: H5Type>(&self) -> Result<Vec<T>> {
        self.target()?.read()
    }

    pub fn read_into<T: H5Type>(&self, buf: &mut [T]) -> Result<usize> {
        self.target()?.read_into(buf)
    }

    pub fn read_scalar<T: H5Type>(&self) -> Result<T> {
        self.target()?.read_scalar()
    }

    pub fn write_scalar<T: H5Type>(&self, value: &T) -> Result<()> {
        self.target()?.write_scalar(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::file::File;
    use crate::location::{Container, Location};
    use crate::types::{FixedAscii, VarLenUnicode};

    #[test]
    fn attributes_on_every_location() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("attrs.h5")).unwrap();
        let group = file.create_group("g").unwrap();
        let ds = group.new_dataset::<u8>("d", 1usize).unwrap();

        file.new_attr::<u32>("version", ()).unwrap().write_scalar(&3u32).unwrap();
        let units = group.new_attr::<FixedAscii<8>>("units", ()).unwrap();
        units.write_scalar(&FixedAscii::<8>::try_from_str("kelvin").unwrap()).unwrap();
        let tags = ds.new_attr::<VarLenUnicode>("tags", 2usize).unwrap();
        tags.write(&["α".parse::<VarLenUnicode>().unwrap(), "beta".parse().unwrap()]).unwrap();

        assert_eq!(file.attr("version").unwrap().read_scalar::<u32>().unwrap(), 3);
        assert_eq!(group.attr("units").unwrap().read_scalar::<FixedAscii<8>>().unwrap(), "kelvin");
        let read = ds.attr("tags").unwrap().read::<VarLenUnicode>().unwrap();
        assert_eq!(read[0], "α");
        assert_eq!(read[1], "beta");
        assert_eq!(tags.name().unwrap(), "tags");
        assert_eq!(tags.shape().unwrap(), vec![2]);
    }

    #[test]
    fn names_exists_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("attrs.h5")).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            file.new_attr::<i8>(name, ()).unwrap();
        }
        assert_eq!(file.attr_names().unwrap(), vec!["alpha", "mid", "zeta"]);
        assert!(file.attr_exists("mid").unwrap());
        assert!(matches!(file.new_attr::<i8>("mid", ()), Err(Error::AlreadyExists(_))));

        file.delete_attr("mid").unwrap();
        assert!(!file.attr_exists("mid").unwrap());
        assert!(matches!(file.attr("mid"), Err(Error::NotFound(_))));
        assert!(matches!(file.delete_attr("mid"), Err(Error::NotFound(_))));
        assert!(matches!(file.attr(""), Err(Error::InvalidName(_))));
    }
}
