//! Safe, handle-based bindings to a hierarchical data storage library.
//!
//! Every native object (file, group, dataset, attribute, dataspace,
//! datatype, property list) is wrapped in an owning type that releases it
//! exactly once, either through an explicit `close()` or when dropped.
//! Element layouts come from the [`H5Type`] trait, which `#[derive(H5Type)]`
//! implements for plain structs.
//!
//! # Writing and reading
//!
//! ```no_run
//! use h5bind::prelude::*;
//! use h5bind::{File, FixedAscii};
//!
//! #[derive(H5Type, Clone, Copy)]
//! #[repr(C)]
//! struct Reading {
//!     station: FixedAscii<8>,
//!     samples: [f32; 4],
//! }
//!
//! let file = File::create("readings.h5").unwrap();
//! let ds = file.new_dataset::<Reading>("sensors", 2usize).unwrap();
//! let reading = Reading {
//!     station: FixedAscii::try_from_str("north").unwrap(),
//!     samples: [1.0, 2.0, 3.0, 4.0],
//! };
//! ds.write(&[reading, reading]).unwrap();
//! let back: Vec<Reading> = ds.read().unwrap();
//! assert_eq!(back[1].station, "north");
//! ```
//!
//! # Threads
//!
//! Unless the `threadsafe` feature is enabled, every native call is
//! serialized through one process-wide reentrant lock (see [`sync()`]).

extern crate self as h5bind;

/// Runs a native call under the library lock and turns its status into a
/// `Result`.
macro_rules! h5call {
    ($expr:expr) => {
        $crate::sync::sync(|| {
            #[allow(unused_unsafe)]
            let value = unsafe { $expr };
            $crate::error::h5check(value)
        })
    };
}

/// Like `h5call!`, propagating failure with `?`.
macro_rules! h5try {
    ($expr:expr) => {
        h5call!($expr)?
    };
}

pub mod attribute;
pub mod dataset;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod file;
pub mod group;
pub mod handle;
mod io;
pub mod library;
pub mod location;
pub mod object;
pub mod plist;
pub mod sync;
pub mod types;
mod util;

pub use attribute::Attribute;
pub use dataset::Dataset;
pub use dataspace::{Dataspace, Extent, Extents, SimpleExtents};
pub use datatype::{Datatype, TypeClass};
pub use error::{silence_errors, Error, ErrorFrame, ErrorStack, Result};
pub use file::{File, OpenMode};
pub use group::Group;
pub use handle::Handle;
pub use library::{is_threadsafe, library_version, live_handles, HandleCounts};
pub use location::{Container, Location};
pub use object::ObjectClass;
pub use plist::{Layout, PropertyList, PropertyListClass};
pub use sync::sync;
pub use types::{
    CompoundBuilder, CompoundField, CompoundType, FixedAscii, FixedUnicode, FloatSize, H5Type,
    IntSize, StringError, TypeDescriptor, VarLenUnicode,
};

#[cfg(feature = "derive")]
pub use h5bind_derive::H5Type;

/// Traits needed to call container, location and handle methods, plus the
/// element type trait and its derive.
pub mod prelude {
    pub use crate::location::{Container, Location};
    pub use crate::object::ObjectClass;
    pub use crate::types::H5Type;

    #[cfg(feature = "derive")]
    pub use h5bind_derive::H5Type;
}
