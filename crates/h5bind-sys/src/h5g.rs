//! Groups.

use std::collections::BTreeMap;
use std::os::raw::c_char;

use crate::engine::tree::NodeKind;
use crate::engine::{self, read_name, Failure, Object};
use crate::h5::{herr_t, hsize_t};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::{hid_t, H5I_type_t, H5I_INVALID_HID};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct H5G_info_t {
    pub nlinks: hsize_t,
}

/// Creates a group at `name`, relative to `loc_id`. Intermediate groups
/// must already exist.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Gcreate2(
    loc_id: hid_t,
    name: *const c_char,
    _lcpl_id: hid_t,
    _gcpl_id: hid_t,
    _gapl_id: hid_t,
) -> hid_t {
    engine::api("H5Gcreate2", H5I_INVALID_HID, |lib| {
        let name = read_name(name)?;
        let (file, from) = lib.location(loc_id)?;
        lib.check_intent(loc_id)?;
        let writable = lib.intent(loc_id)?;
        let node = lib
            .file_mut(file)?
            .insert(from, &name, NodeKind::Group { links: BTreeMap::new() })
            .map_err(|f| {
                f.context(
                    H5E_major_t::H5E_SYM,
                    H5E_minor_t::H5E_CANTCREATE,
                    "unable to create group",
                )
            })?;
        Ok(lib.register(Object::Group { file, node, writable }))
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Gopen2(loc_id: hid_t, name: *const c_char, _gapl_id: hid_t) -> hid_t {
    engine::api("H5Gopen2", H5I_INVALID_HID, |lib| {
        let name = read_name(name)?;
        let (file, from) = lib.location(loc_id)?;
        let state = lib.file(file)?;
        let node = state.resolve(from, &name)?;
        if !matches!(state.node(node)?.kind, NodeKind::Group { .. }) {
            return Err(Failure::bad_type(format!("'{name}' is not a group")));
        }
        let writable = lib.intent(loc_id)?;
        Ok(lib.register(Object::Group { file, node, writable }))
    })
}

pub extern "C" fn H5Gclose(group_id: hid_t) -> herr_t {
    engine::api("H5Gclose", -1, |lib| {
        lib.release(group_id, Some(H5I_type_t::H5I_GROUP))?;
        Ok(0)
    })
}

/// Reports the number of links in the group (or file root) `loc_id`.
///
/// # Safety
/// `info` must be valid for writes.
pub unsafe extern "C" fn H5Gget_info(loc_id: hid_t, info: *mut H5G_info_t) -> herr_t {
    engine::api("H5Gget_info", -1, |lib| {
        let (file, node) = lib.location(loc_id)?;
        let nlinks = lib.file(file)?.links(node)?.len() as hsize_t;
        if info.is_null() {
            return Err(Failure::args("null output pointer"));
        }
        *info = H5G_info_t { nlinks };
        Ok(0)
    })
}
