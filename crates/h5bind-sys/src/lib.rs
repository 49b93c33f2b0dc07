//! In-process hierarchical storage engine with a C-style handle interface.
//!
//! Every resource (file, group, dataset, attribute, dataspace, datatype,
//! property list) is addressed through an integer [`hid_t`] handle. Calls
//! report failure through negative status codes and push a record onto a
//! per-thread diagnostic stack ([`h5e`]); by default the stack is printed to
//! stderr when a call fails, exactly like the C library this interface is
//! modeled after.
//!
//! ```no_run
//! use h5bind_sys::{h5f, h5s, h5d, h5t, h5p, h5i};
//! use std::ffi::CString;
//!
//! let name = CString::new("data.h5").unwrap();
//! let file = unsafe {
//!     h5f::H5Fcreate(name.as_ptr(), h5f::H5F_ACC_TRUNC, h5p::H5P_DEFAULT, h5p::H5P_DEFAULT)
//! };
//! let dims = [4u64];
//! let space = unsafe { h5s::H5Screate_simple(1, dims.as_ptr(), std::ptr::null()) };
//! let dset_name = CString::new("values").unwrap();
//! let dset = unsafe {
//!     h5d::H5Dcreate2(file, dset_name.as_ptr(), h5t::H5T_NATIVE_INT32, space,
//!                     h5p::H5P_DEFAULT, h5p::H5P_DEFAULT, h5p::H5P_DEFAULT)
//! };
//! let values = [1i32, 2, 3, 4];
//! unsafe {
//!     h5d::H5Dwrite(dset, h5t::H5T_NATIVE_INT32, h5s::H5S_ALL, h5s::H5S_ALL,
//!                   h5p::H5P_DEFAULT, values.as_ptr().cast());
//! }
//! for id in [dset, space, file] {
//!     h5i::H5Idec_ref(id);
//! }
//! ```
//!
//! Pointer-taking entry points are `unsafe`: the caller guarantees that
//! buffers match the sizes described by the handles passed alongside them.

#![allow(non_camel_case_types, non_snake_case)]

mod engine;

pub mod h5;
pub mod h5a;
pub mod h5d;
pub mod h5e;
pub mod h5f;
pub mod h5g;
pub mod h5i;
pub mod h5l;
pub mod h5p;
pub mod h5s;
pub mod h5t;

pub use h5::{herr_t, hsize_t, htri_t, hbool_t};
pub use h5i::hid_t;
