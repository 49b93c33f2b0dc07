//! Datasets.

use std::os::raw::{c_char, c_void};

use crate::engine::dtype::TypeDesc;
use crate::engine::plist::{PlistClass, PlistDesc};
use crate::engine::space::SpaceDesc;
use crate::engine::tree::{DatasetNode, NodeId, NodeKind, Payload};
use crate::engine::{self, image, read_name, transfer, Failure, FileKey, Library, Object, Outcome};
use crate::h5::{herr_t, hsize_t};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::{hid_t, H5I_type_t, H5I_INVALID_HID};
use crate::h5s::{H5S_ALL, H5S_UNLIMITED};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5D_layout_t {
    H5D_LAYOUT_ERROR = -1,
    H5D_COMPACT = 0,
    H5D_CONTIGUOUS = 1,
    H5D_CHUNKED = 2,
}

fn dataset_target(lib: &Library, dset_id: hid_t) -> Outcome<(FileKey, NodeId)> {
    match lib.object(dset_id)? {
        Object::Dataset { file, node, .. } => {
            lib.file(*file)?;
            Ok((*file, *node))
        }
        _ => Err(Failure::bad_type(format!("identifier {dset_id:#x} is not a dataset"))),
    }
}

fn check_chunking(dtype: &TypeDesc, space: &SpaceDesc, dcpl: &PlistDesc) -> Outcome<()> {
    if dcpl.layout() != H5D_layout_t::H5D_CHUNKED {
        return Ok(());
    }
    let chunk = dcpl.chunk();
    let bad = |desc: String| Failure::new(H5E_major_t::H5E_DATASET, H5E_minor_t::H5E_BADVALUE, desc);
    if !matches!(space, SpaceDesc::Simple { .. }) {
        return Err(bad("chunked layout requires a simple dataspace".to_owned()));
    }
    if chunk.len() != space.rank() {
        return Err(bad(format!(
            "chunk rank {} does not match dataspace rank {}",
            chunk.len(),
            space.rank()
        )));
    }
    for (axis, (&c, &m)) in chunk.iter().zip(space.maxdims()).enumerate() {
        if m != H5S_UNLIMITED && c > m {
            return Err(bad(format!(
                "axis {axis}: chunk size {c} exceeds the fixed maximum {m}"
            )));
        }
    }
    image::check_chunk(dtype, chunk)
}

/// Checks a transfer's memory or file dataspace against the dataset extent.
/// Only whole-extent transfers are supported.
fn check_selection(lib: &Library, space_id: hid_t, extent: &SpaceDesc) -> Outcome<()> {
    if space_id == H5S_ALL {
        return Ok(());
    }
    if lib.dataspace(space_id)?.npoints() != extent.npoints() {
        return Err(Failure::new(
            H5E_major_t::H5E_DATASPACE,
            H5E_minor_t::H5E_BADVALUE,
            "selection does not cover the whole dataset extent",
        ));
    }
    Ok(())
}

/// Creates a dataset of `type_id` elements shaped by `space_id`.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Dcreate2(
    loc_id: hid_t,
    name: *const c_char,
    type_id: hid_t,
    space_id: hid_t,
    _lcpl_id: hid_t,
    dcpl_id: hid_t,
    dapl_id: hid_t,
) -> hid_t {
    engine::api("H5Dcreate2", H5I_INVALID_HID, |lib| {
        let name = read_name(name)?;
        let (file, from) = lib.location(loc_id)?;
        let dtype = lib.datatype(type_id)?.clone();
        let space = lib.dataspace(space_id)?.clone();
        if matches!(&space, SpaceDesc::Simple { dims, .. } if dims.is_empty()) {
            return Err(Failure::args("dataspace extent has not been set"));
        }
        let dcpl = lib.plist(dcpl_id, PlistClass::DatasetCreate)?;
        lib.plist(dapl_id, PlistClass::DatasetAccess)?;
        check_chunking(&dtype, &space, &dcpl)?;

        let layout = dcpl.layout();
        let chunk = if layout == H5D_layout_t::H5D_CHUNKED {
            dcpl.chunk().to_vec()
        } else {
            Vec::new()
        };
        let payload = Payload::new(dtype, space)?;
        if layout == H5D_layout_t::H5D_COMPACT {
            image::check_compact(&payload)?;
        }
        lib.check_intent(loc_id)?;
        let writable = lib.intent(loc_id)?;
        let node = lib
            .file_mut(file)?
            .insert(from, &name, NodeKind::Dataset(DatasetNode { payload, layout, chunk }))
            .map_err(|f| {
                f.context(
                    H5E_major_t::H5E_DATASET,
                    H5E_minor_t::H5E_CANTCREATE,
                    "unable to create dataset",
                )
            })?;
        Ok(lib.register(Object::Dataset { file, node, writable }))
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Dopen2(loc_id: hid_t, name: *const c_char, dapl_id: hid_t) -> hid_t {
    engine::api("H5Dopen2", H5I_INVALID_HID, |lib| {
        let name = read_name(name)?;
        lib.plist(dapl_id, PlistClass::DatasetAccess)?;
        let (file, from) = lib.location(loc_id)?;
        let state = lib.file(file)?;
        let node = state.resolve(from, &name)?;
        state
            .dataset(node)
            .map_err(|_| Failure::bad_type(format!("'{name}' is not a dataset")))?;
        let writable = lib.intent(loc_id)?;
        Ok(lib.register(Object::Dataset { file, node, writable }))
    })
}

pub extern "C" fn H5Dclose(dset_id: hid_t) -> herr_t {
    engine::api("H5Dclose", -1, |lib| {
        lib.release(dset_id, Some(H5I_type_t::H5I_DATASET))?;
        Ok(0)
    })
}

/// Opens a copy of the dataset's current dataspace.
pub extern "C" fn H5Dget_space(dset_id: hid_t) -> hid_t {
    engine::api("H5Dget_space", H5I_INVALID_HID, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        let space = lib.file(file)?.dataset(node)?.payload.space.clone();
        Ok(lib.register(Object::Dataspace(space)))
    })
}

/// Opens a read-only copy of the dataset's element type.
pub extern "C" fn H5Dget_type(dset_id: hid_t) -> hid_t {
    engine::api("H5Dget_type", H5I_INVALID_HID, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        let desc = lib.file(file)?.dataset(node)?.payload.dtype.clone();
        Ok(lib.register(Object::Datatype { desc, locked: true }))
    })
}

/// Opens a creation property list describing the dataset's layout.
pub extern "C" fn H5Dget_create_plist(dset_id: hid_t) -> hid_t {
    engine::api("H5Dget_create_plist", H5I_INVALID_HID, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        let dataset = lib.file(file)?.dataset(node)?;
        let mut dcpl = PlistDesc::new(PlistClass::DatasetCreate);
        if dataset.layout == H5D_layout_t::H5D_CHUNKED {
            dcpl.set_chunk(dataset.chunk.clone())?;
        } else {
            dcpl.set_layout(dataset.layout)?;
        }
        Ok(lib.register(Object::PropList(dcpl)))
    })
}

/// Writes the whole dataset from `buf`, laid out per `mem_type_id`.
///
/// # Safety
/// `buf` must hold one element of `mem_type_id` per point of the dataset
/// extent.
pub unsafe extern "C" fn H5Dwrite(
    dset_id: hid_t,
    mem_type_id: hid_t,
    mem_space_id: hid_t,
    file_space_id: hid_t,
    dxpl_id: hid_t,
    buf: *const c_void,
) -> herr_t {
    engine::api("H5Dwrite", -1, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        lib.plist(dxpl_id, PlistClass::DatasetTransfer)?;
        let mem_type = lib.datatype(mem_type_id)?.clone();
        let extent = lib.file(file)?.dataset(node)?.payload.space.clone();
        check_selection(lib, mem_space_id, &extent)?;
        check_selection(lib, file_space_id, &extent)?;
        lib.check_intent(dset_id)?;
        let dataset = lib.file_mut(file)?.dataset_mut(node)?;
        transfer::write(&mut dataset.payload, &mem_type, buf.cast()).map_err(|f| {
            f.context(
                H5E_major_t::H5E_DATASET,
                H5E_minor_t::H5E_WRITEERROR,
                "can't write data",
            )
        })?;
        Ok(0)
    })
}

/// Reads the whole dataset into `buf`, laid out per `mem_type_id`.
/// Variable-length strings are returned as `malloc`-allocated copies.
///
/// # Safety
/// `buf` must have room for one element of `mem_type_id` per point of the
/// dataset extent.
pub unsafe extern "C" fn H5Dread(
    dset_id: hid_t,
    mem_type_id: hid_t,
    mem_space_id: hid_t,
    file_space_id: hid_t,
    dxpl_id: hid_t,
    buf: *mut c_void,
) -> herr_t {
    engine::api("H5Dread", -1, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        lib.plist(dxpl_id, PlistClass::DatasetTransfer)?;
        let mem_type = lib.datatype(mem_type_id)?;
        let payload = &lib.file(file)?.dataset(node)?.payload;
        check_selection(lib, mem_space_id, &payload.space)?;
        check_selection(lib, file_space_id, &payload.space)?;
        transfer::read(payload, mem_type, buf.cast()).map_err(|f| {
            f.context(
                H5E_major_t::H5E_DATASET,
                H5E_minor_t::H5E_READERROR,
                "can't read data",
            )
        })?;
        Ok(0)
    })
}

/// Grows the current extent of a chunked dataset. Every new size must lie
/// between the current size and the dataset's maximum. Existing elements
/// keep their coordinates; new elements are zero.
///
/// # Safety
/// `size` must point to one value per dataset dimension.
pub unsafe extern "C" fn H5Dset_extent(dset_id: hid_t, size: *const hsize_t) -> herr_t {
    engine::api("H5Dset_extent", -1, |lib| {
        let (file, node) = dataset_target(lib, dset_id)?;
        lib.check_intent(dset_id)?;
        let dataset = lib.file_mut(file)?.dataset_mut(node)?;
        if dataset.layout != H5D_layout_t::H5D_CHUNKED {
            return Err(Failure::new(
                H5E_major_t::H5E_DATASET,
                H5E_minor_t::H5E_UNSUPPORTED,
                "dataset must be chunked to change its extent",
            ));
        }
        let rank = dataset.payload.space.rank();
        let new_dims = engine::read_dims(size, rank)?;
        let space = &dataset.payload.space;
        for (axis, ((&d, &m), &current)) in new_dims.iter().zip(space.maxdims()).zip(space.dims()).enumerate() {
            let out_of_range = |desc: String| {
                Failure::new(H5E_major_t::H5E_DATASET, H5E_minor_t::H5E_BADRANGE, desc)
            };
            if d < current {
                return Err(out_of_range(format!(
                    "axis {axis}: size {d} is below the current size {current}; extents only grow"
                )));
            }
            if m != H5S_UNLIMITED && d > m {
                return Err(out_of_range(format!("axis {axis}: size {d} exceeds maximum {m}")));
            }
        }
        transfer::relayout(&mut dataset.payload, &new_dims)?;
        Ok(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;
    use crate::h5f::{H5Fclose, H5Fcreate, H5Fopen, H5F_ACC_RDONLY, H5F_ACC_TRUNC};
    use crate::h5p::{H5Pclose, H5Pcreate, H5Pget_chunk, H5Pset_chunk, H5P_DATASET_CREATE, H5P_DEFAULT};
    use crate::h5s::{H5Sclose, H5Screate_simple, H5Sget_simple_extent_dims};
    use crate::h5t::{H5Tclose, H5Tequal, H5Tset_size, H5T_NATIVE_INT32, H5T_NATIVE_UINT16};
    use std::ffi::CString;

    struct Scratch {
        _dir: tempfile::TempDir,
        path: CString,
        file: hid_t,
    }

    fn scratch() -> Scratch {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("d.h5").to_str().unwrap()).unwrap();
        let file = unsafe { H5Fcreate(path.as_ptr(), H5F_ACC_TRUNC, H5P_DEFAULT, H5P_DEFAULT) };
        Scratch { _dir: dir, path, file }
    }

    fn space(dims: &[u64], max: Option<&[u64]>) -> hid_t {
        let max = max.map_or(std::ptr::null(), |m| m.as_ptr());
        unsafe { H5Screate_simple(dims.len() as _, dims.as_ptr(), max) }
    }

    #[test]
    fn write_close_reopen_read() {
        let s = scratch();
        let sp = space(&[20, 5], Some(&[40, 5]));
        let dset = unsafe {
            H5Dcreate2(s.file, c"data".as_ptr(), H5T_NATIVE_UINT16, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        assert!(dset > 0);
        let values: Vec<u16> = (0..100).collect();
        let status = unsafe {
            H5Dwrite(dset, H5T_NATIVE_UINT16, H5S_ALL, H5S_ALL, H5P_DEFAULT, values.as_ptr().cast())
        };
        assert_eq!(status, 0);
        H5Dclose(dset);
        H5Sclose(sp);
        H5Fclose(s.file);

        let file = unsafe { H5Fopen(s.path.as_ptr(), H5F_ACC_RDONLY, H5P_DEFAULT) };
        let dset = unsafe { H5Dopen2(file, c"/data".as_ptr(), H5P_DEFAULT) };
        let mut out = vec![0u16; 100];
        let status = unsafe {
            H5Dread(dset, H5T_NATIVE_UINT16, H5S_ALL, H5S_ALL, H5P_DEFAULT, out.as_mut_ptr().cast())
        };
        assert_eq!(status, 0);
        assert_eq!(&out[..5], &[0, 1, 2, 3, 4]);
        assert_eq!(out, values);

        let ty = H5Dget_type(dset);
        assert_eq!(H5Tequal(ty, H5T_NATIVE_UINT16), 1);
        H5Eset_auto(false);
        assert!(H5Tset_size(ty, 4) < 0);
        H5Tclose(ty);
        H5Dclose(dset);
        H5Fclose(file);
    }

    #[test]
    fn extent_requires_chunking() {
        H5Eset_auto(false);
        let s = scratch();
        let sp = space(&[20, 5], Some(&[40, 5]));
        let plain = unsafe {
            H5Dcreate2(s.file, c"plain".as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        let bigger = [30u64, 5];
        assert!(unsafe { H5Dset_extent(plain, bigger.as_ptr()) } < 0);

        let dcpl = H5Pcreate(H5P_DATASET_CREATE);
        let chunk = [10u64, 5];
        unsafe { H5Pset_chunk(dcpl, 2, chunk.as_ptr()) };
        let chunked = unsafe {
            H5Dcreate2(s.file, c"chunked".as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, dcpl, H5P_DEFAULT)
        };
        assert_eq!(unsafe { H5Dset_extent(chunked, bigger.as_ptr()) }, 0);
        let too_big = [41u64, 5];
        assert!(unsafe { H5Dset_extent(chunked, too_big.as_ptr()) } < 0);

        let shrunk = [25u64, 5];
        assert!(unsafe { H5Dset_extent(chunked, shrunk.as_ptr()) } < 0);

        let grown = H5Dget_space(chunked);
        let mut dims = [0u64; 2];
        unsafe { H5Sget_simple_extent_dims(grown, dims.as_mut_ptr(), std::ptr::null_mut()) };
        assert_eq!(dims, bigger);

        let plist = H5Dget_create_plist(chunked);
        let mut out = [0u64; 2];
        assert_eq!(unsafe { H5Pget_chunk(plist, 2, out.as_mut_ptr()) }, 2);
        assert_eq!(out, chunk);

        for id in [grown, sp] {
            H5Sclose(id);
        }
        H5Pclose(plist);
        H5Pclose(dcpl);
        H5Dclose(plain);
        H5Dclose(chunked);
        H5Fclose(s.file);
    }

    #[test]
    fn chunk_rank_must_match() {
        H5Eset_auto(false);
        let s = scratch();
        let sp = space(&[4, 4], None);
        let dcpl = H5Pcreate(H5P_DATASET_CREATE);
        let chunk = [2u64];
        unsafe { H5Pset_chunk(dcpl, 1, chunk.as_ptr()) };
        let dset = unsafe {
            H5Dcreate2(s.file, c"bad".as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, dcpl, H5P_DEFAULT)
        };
        assert_eq!(dset, H5I_INVALID_HID);
        H5Pclose(dcpl);
        H5Sclose(sp);
        H5Fclose(s.file);
    }

    #[test]
    fn duplicate_name_fails() {
        H5Eset_auto(false);
        let s = scratch();
        let sp = space(&[3], None);
        let name = c"dup";
        let first = unsafe {
            H5Dcreate2(s.file, name.as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        let second = unsafe {
            H5Dcreate2(s.file, name.as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        assert!(first > 0);
        assert_eq!(second, H5I_INVALID_HID);
        H5Dclose(first);
        H5Sclose(sp);
        H5Fclose(s.file);
    }

    #[test]
    fn read_only_file_rejects_writes() {
        H5Eset_auto(false);
        let s = scratch();
        H5Fclose(s.file);
        let file = unsafe { H5Fopen(s.path.as_ptr(), H5F_ACC_RDONLY, H5P_DEFAULT) };
        let sp = space(&[3], None);
        let dset = unsafe {
            H5Dcreate2(file, c"x".as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        assert_eq!(dset, H5I_INVALID_HID);
        H5Sclose(sp);
        H5Fclose(file);
    }

    #[test]
    fn children_go_stale_after_file_close() {
        let s = scratch();
        let sp = space(&[2], None);
        let dset = unsafe {
            H5Dcreate2(s.file, c"v".as_ptr(), H5T_NATIVE_INT32, sp, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        };
        H5Fclose(s.file);
        H5Eset_auto(false);
        assert_eq!(crate::h5i::H5Iis_valid(dset), 0);
        assert_eq!(H5Dget_space(dset), H5I_INVALID_HID);
        assert_eq!(H5Dclose(dset), 0);
        H5Sclose(sp);
    }
}
