//! Groups: nested containers inside a file.

use crate::handle::Handle;
use crate::location::{Container, Location};
use crate::object::impl_class;

/// A group opened or created through a [`Container`].
pub struct Group {
    handle: Handle,
}

impl_class!(Group, "group", H5I_GROUP);

impl Location for Group {}

impl Container for Group {}
