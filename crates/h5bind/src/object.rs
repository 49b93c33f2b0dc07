//! Common behaviour of every handle-bearing wrapper.

use h5bind_sys::h5i::{hid_t, H5I_type_t};

use crate::error::{Error, Result};
use crate::handle::Handle;

/// A wrapper around one kind of native object.
///
/// Every wrapper releases its identifier on drop; [`close`](Self::close) is
/// the explicit path and may be called any number of times.
pub trait ObjectClass: Sized {
    const NAME: &'static str;
    const TYPE: H5I_type_t;

    fn from_handle(handle: Handle) -> Self;

    fn handle(&self) -> &Handle;

    /// Wraps an owned identifier after checking its kind. The identifier is
    /// released if the kind does not match.
    fn from_id(id: hid_t) -> Result<Self> {
        let handle = Handle::try_new(id)?;
        if handle.id_type() != Self::TYPE {
            return Err(Error::UnsupportedOperation(format!(
                "identifier {id:#x} is not a {}",
                Self::NAME
            )));
        }
        Ok(Self::from_handle(handle))
    }

    fn id(&self) -> Result<hid_t> {
        self.handle().id()
    }

    fn is_valid(&self) -> bool {
        self.handle().is_valid()
    }

    fn close(&self) -> Result<()> {
        self.handle().close()
    }
}

/// Implements [`ObjectClass`], identity equality and `Debug` for a wrapper
/// holding a `handle: Handle` field.
macro_rules! impl_class {
    ($ty:ident, $name:literal, $kind:ident) => {
        impl $crate::object::ObjectClass for $ty {
            const NAME: &'static str = $name;
            const TYPE: ::h5bind_sys::h5i::H5I_type_t = ::h5bind_sys::h5i::H5I_type_t::$kind;

            fn from_handle(handle: $crate::handle::Handle) -> Self {
                Self { handle }
            }

            fn handle(&self) -> &$crate::handle::Handle {
                &self.handle
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.handle == other.handle
            }
        }

        impl Eq for $ty {}

        impl ::std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "<{} {:?}>", $name, self.handle)
            }
        }
    };
}

pub(crate) use impl_class;
