//! Attributes: small named payloads attached to groups and datasets.

use std::os::raw::{c_char, c_int, c_void};

use crate::engine::space::SpaceDesc;
use crate::engine::tree::{NodeId, Payload};
use crate::engine::{self, copy_name, image, read_name, transfer, Failure, FileKey, Library, Object, Outcome};
use crate::h5::{herr_t, hsize_t, htri_t, size_t, ssize_t};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::{hid_t, H5I_type_t, H5I_INVALID_HID};

fn attr_not_found(name: &str) -> Failure {
    Failure::new(
        H5E_major_t::H5E_ATTR,
        H5E_minor_t::H5E_NOTFOUND,
        format!("attribute '{name}' doesn't exist"),
    )
}

fn attr_target(lib: &Library, attr_id: hid_t) -> Outcome<(FileKey, NodeId, String)> {
    match lib.object(attr_id)? {
        Object::Attribute { file, node, name, .. } => {
            lib.file(*file)?;
            Ok((*file, *node, name.clone()))
        }
        _ => Err(Failure::bad_type(format!("identifier {attr_id:#x} is not an attribute"))),
    }
}

fn payload<'a>(lib: &'a Library, file: FileKey, node: NodeId, name: &str) -> Outcome<&'a Payload> {
    lib.file(file)?
        .node(node)?
        .attrs
        .get(name)
        .ok_or_else(|| attr_not_found(name))
}

/// Creates attribute `attr_name` on the object `loc_id`.
///
/// # Safety
/// `attr_name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Acreate2(
    loc_id: hid_t,
    attr_name: *const c_char,
    type_id: hid_t,
    space_id: hid_t,
    _acpl_id: hid_t,
    _aapl_id: hid_t,
) -> hid_t {
    engine::api("H5Acreate2", H5I_INVALID_HID, |lib| {
        let name = read_name(attr_name)?;
        if name.is_empty() {
            return Err(Failure::args("empty attribute name"));
        }
        let (file, node) = lib.location(loc_id)?;
        let dtype = lib.datatype(type_id)?.clone();
        let space = lib.dataspace(space_id)?.clone();
        if matches!(&space, SpaceDesc::Simple { dims, .. } if dims.is_empty()) {
            return Err(Failure::args("dataspace extent has not been set"));
        }
        let payload = Payload::new(dtype, space)?;
        image::check_attribute(&name, &payload)?;
        lib.check_intent(loc_id)?;
        let writable = lib.intent(loc_id)?;
        let attrs = &mut lib.file_mut(file)?.node_mut(node)?.attrs;
        if attrs.contains_key(&name) {
            return Err(Failure::new(
                H5E_major_t::H5E_ATTR,
                H5E_minor_t::H5E_EXISTS,
                format!("attribute '{name}' already exists"),
            ));
        }
        attrs.insert(name.clone(), payload);
        Ok(lib.register(Object::Attribute { file, node, name, writable }))
    })
}

/// # Safety
/// `attr_name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Aopen(obj_id: hid_t, attr_name: *const c_char, _aapl_id: hid_t) -> hid_t {
    engine::api("H5Aopen", H5I_INVALID_HID, |lib| {
        let name = read_name(attr_name)?;
        let (file, node) = lib.location(obj_id)?;
        payload(lib, file, node, &name)?;
        let writable = lib.intent(obj_id)?;
        Ok(lib.register(Object::Attribute { file, node, name, writable }))
    })
}

pub extern "C" fn H5Aclose(attr_id: hid_t) -> herr_t {
    engine::api("H5Aclose", -1, |lib| {
        lib.release(attr_id, Some(H5I_type_t::H5I_ATTR))?;
        Ok(0)
    })
}

/// # Safety
/// `attr_name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Aexists(obj_id: hid_t, attr_name: *const c_char) -> htri_t {
    engine::api("H5Aexists", -1, |lib| {
        let name = read_name(attr_name)?;
        let (file, node) = lib.location(obj_id)?;
        Ok(htri_t::from(lib.file(file)?.node(node)?.attrs.contains_key(&name)))
    })
}

/// Writes the whole attribute from `buf`.
///
/// # Safety
/// `buf` must hold one element of `mem_type_id` per point of the attribute.
pub unsafe extern "C" fn H5Awrite(attr_id: hid_t, mem_type_id: hid_t, buf: *const c_void) -> herr_t {
    engine::api("H5Awrite", -1, |lib| {
        let (file, node, name) = attr_target(lib, attr_id)?;
        let mem_type = lib.datatype(mem_type_id)?.clone();
        lib.check_intent(attr_id)?;
        let payload = lib
            .file_mut(file)?
            .node_mut(node)?
            .attrs
            .get_mut(&name)
            .ok_or_else(|| attr_not_found(&name))?;
        transfer::write(payload, &mem_type, buf.cast()).map_err(|f| {
            f.context(
                H5E_major_t::H5E_ATTR,
                H5E_minor_t::H5E_WRITEERROR,
                "unable to write attribute",
            )
        })?;
        Ok(0)
    })
}

/// Reads the whole attribute into `buf`.
///
/// # Safety
/// `buf` must have room for one element of `mem_type_id` per point.
pub unsafe extern "C" fn H5Aread(attr_id: hid_t, mem_type_id: hid_t, buf: *mut c_void) -> herr_t {
    engine::api("H5Aread", -1, |lib| {
        let (file, node, name) = attr_target(lib, attr_id)?;
        let mem_type = lib.datatype(mem_type_id)?;
        transfer::read(payload(lib, file, node, &name)?, mem_type, buf.cast()).map_err(|f| {
            f.context(
                H5E_major_t::H5E_ATTR,
                H5E_minor_t::H5E_READERROR,
                "unable to read attribute",
            )
        })?;
        Ok(0)
    })
}

pub extern "C" fn H5Aget_space(attr_id: hid_t) -> hid_t {
    engine::api("H5Aget_space", H5I_INVALID_HID, |lib| {
        let (file, node, name) = attr_target(lib, attr_id)?;
        let space = payload(lib, file, node, &name)?.space.clone();
        Ok(lib.register(Object::Dataspace(space)))
    })
}

/// Opens a read-only copy of the attribute's element type.
pub extern "C" fn H5Aget_type(attr_id: hid_t) -> hid_t {
    engine::api("H5Aget_type", H5I_INVALID_HID, |lib| {
        let (file, node, name) = attr_target(lib, attr_id)?;
        let desc = payload(lib, file, node, &name)?.dtype.clone();
        Ok(lib.register(Object::Datatype { desc, locked: true }))
    })
}

/// Copies the attribute's name into `buf`. Returns the name length.
///
/// # Safety
/// `buf` must be null or valid for `buf_size` bytes of writes.
pub unsafe extern "C" fn H5Aget_name(attr_id: hid_t, buf_size: size_t, buf: *mut c_char) -> ssize_t {
    engine::api("H5Aget_name", -1, |lib| {
        let (_, _, name) = attr_target(lib, attr_id)?;
        Ok(copy_name(&name, buf, buf_size))
    })
}

/// Number of attributes attached to `loc_id`.
pub extern "C" fn H5Aget_num_attrs(loc_id: hid_t) -> c_int {
    engine::api("H5Aget_num_attrs", -1, |lib| {
        let (file, node) = lib.location(loc_id)?;
        Ok(lib.file(file)?.node(node)?.attrs.len() as c_int)
    })
}

/// Copies the name of the `n`-th attribute (in name order) of `loc_id`.
///
/// # Safety
/// `name` must be null or valid for `size` bytes of writes.
pub unsafe extern "C" fn H5Aget_name_by_idx(
    loc_id: hid_t,
    n: hsize_t,
    name: *mut c_char,
    size: size_t,
) -> ssize_t {
    engine::api("H5Aget_name_by_idx", -1, |lib| {
        let (file, node) = lib.location(loc_id)?;
        let attrs = &lib.file(file)?.node(node)?.attrs;
        let attr = attrs.keys().nth(n as usize).ok_or_else(|| {
            Failure::new(
                H5E_major_t::H5E_ARGS,
                H5E_minor_t::H5E_BADRANGE,
                format!("attribute index {n} out of range"),
            )
        })?;
        Ok(copy_name(attr, name, size))
    })
}

/// # Safety
/// `attr_name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Adelete(loc_id: hid_t, attr_name: *const c_char) -> herr_t {
    engine::api("H5Adelete", -1, |lib| {
        let name = read_name(attr_name)?;
        let (file, node) = lib.location(loc_id)?;
        lib.check_intent(loc_id)?;
        lib.file_mut(file)?
            .node_mut(node)?
            .attrs
            .remove(&name)
            .map(|_| 0)
            .ok_or_else(|| attr_not_found(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;
    use crate::h5f::{H5Fclose, H5Fcreate, H5F_ACC_TRUNC};
    use crate::h5p::H5P_DEFAULT;
    use crate::h5s::{H5S_class_t, H5Sclose, H5Screate};
    use crate::h5t::{H5Tclose, H5Tcopy, H5Tset_size, H5T_C_S1, H5T_NATIVE_DOUBLE, H5T_VARIABLE};
    use std::ffi::{CStr, CString};

    fn scratch() -> (tempfile::TempDir, hid_t) {
        let dir = tempfile::tempdir().unwrap();
        let name = CString::new(dir.path().join("a.h5").to_str().unwrap()).unwrap();
        let file = unsafe { H5Fcreate(name.as_ptr(), H5F_ACC_TRUNC, H5P_DEFAULT, H5P_DEFAULT) };
        (dir, file)
    }

    #[test]
    fn scalar_attribute_round_trip() {
        let (_dir, file) = scratch();
        let space = H5Screate(H5S_class_t::H5S_SCALAR);
        let attr = unsafe {
            H5Acreate2(file, c"scale".as_ptr(), H5T_NATIVE_DOUBLE, space, H5P_DEFAULT, H5P_DEFAULT)
        };
        assert!(attr > 0);
        let value = 2.5f64;
        assert_eq!(unsafe { H5Awrite(attr, H5T_NATIVE_DOUBLE, (&value as *const f64).cast()) }, 0);
        H5Aclose(attr);

        let attr = unsafe { H5Aopen(file, c"scale".as_ptr(), H5P_DEFAULT) };
        let mut out = 0f64;
        assert_eq!(unsafe { H5Aread(attr, H5T_NATIVE_DOUBLE, (&mut out as *mut f64).cast()) }, 0);
        assert_eq!(out, 2.5);

        let mut buf = [0 as c_char; 8];
        assert_eq!(unsafe { H5Aget_name(attr, buf.len(), buf.as_mut_ptr()) }, 5);
        assert_eq!(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_str().unwrap(), "scale");
        H5Aclose(attr);
        H5Sclose(space);
        H5Fclose(file);
    }

    #[test]
    fn variable_string_attribute() {
        let (_dir, file) = scratch();
        let ty = H5Tcopy(H5T_C_S1);
        H5Tset_size(ty, H5T_VARIABLE);
        let space = H5Screate(H5S_class_t::H5S_SCALAR);
        let attr = unsafe { H5Acreate2(file, c"title".as_ptr(), ty, space, H5P_DEFAULT, H5P_DEFAULT) };
        let text = c"run 42";
        let slot = text.as_ptr();
        assert_eq!(unsafe { H5Awrite(attr, ty, (&slot as *const *const c_char).cast()) }, 0);

        let mut out: *mut c_char = std::ptr::null_mut();
        assert_eq!(unsafe { H5Aread(attr, ty, (&mut out as *mut *mut c_char).cast()) }, 0);
        assert_eq!(unsafe { CStr::from_ptr(out) }, text);
        unsafe { crate::h5::H5free_memory(out.cast()) };

        H5Aclose(attr);
        H5Tclose(ty);
        H5Sclose(space);
        H5Fclose(file);
    }

    #[test]
    fn duplicate_and_delete() {
        H5Eset_auto(false);
        let (_dir, file) = scratch();
        let space = H5Screate(H5S_class_t::H5S_SCALAR);
        for name in [c"b", c"a"] {
            let attr = unsafe { H5Acreate2(file, name.as_ptr(), H5T_NATIVE_DOUBLE, space, H5P_DEFAULT, H5P_DEFAULT) };
            H5Aclose(attr);
        }
        let dup = unsafe { H5Acreate2(file, c"a".as_ptr(), H5T_NATIVE_DOUBLE, space, H5P_DEFAULT, H5P_DEFAULT) };
        assert_eq!(dup, H5I_INVALID_HID);
        assert_eq!(H5Aget_num_attrs(file), 2);

        let mut buf = [0 as c_char; 4];
        unsafe { H5Aget_name_by_idx(file, 0, buf.as_mut_ptr(), buf.len()) };
        assert_eq!(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_str().unwrap(), "a");

        assert_eq!(unsafe { H5Adelete(file, c"a".as_ptr()) }, 0);
        assert_eq!(unsafe { H5Aexists(file, c"a".as_ptr()) }, 0);
        assert_eq!(unsafe { H5Aexists(file, c"b".as_ptr()) }, 1);
        H5Sclose(space);
        H5Fclose(file);
    }
}
