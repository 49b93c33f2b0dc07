//! Links: the named edges of the group tree.

use std::os::raw::c_char;

use crate::engine::{self, copy_name, read_name, Failure};
use crate::h5::{herr_t, hsize_t, htri_t, size_t, ssize_t};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5i::hid_t;

/// Reports whether `name` resolves from `loc_id`. A missing intermediate
/// group yields 0, not an error.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Lexists(loc_id: hid_t, name: *const c_char, _lapl_id: hid_t) -> htri_t {
    engine::api("H5Lexists", -1, |lib| {
        let name = read_name(name)?;
        let (file, from) = lib.location(loc_id)?;
        Ok(htri_t::from(lib.file(file)?.lookup(from, &name).is_some()))
    })
}

/// Removes the link `name`. Open identifiers of the target stay usable.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn H5Ldelete(loc_id: hid_t, name: *const c_char, _lapl_id: hid_t) -> herr_t {
    engine::api("H5Ldelete", -1, |lib| {
        let name = read_name(name)?;
        let (file, from) = lib.location(loc_id)?;
        lib.check_intent(loc_id)?;
        lib.file_mut(file)?.unlink(from, &name)?;
        Ok(0)
    })
}

/// Copies the name of the `n`-th link (in name order) of group
/// `group_name` under `loc_id`. Returns the name length.
///
/// # Safety
/// `group_name` must be a valid NUL-terminated string and `name` null or
/// valid for `size` bytes of writes.
pub unsafe extern "C" fn H5Lget_name_by_idx(
    loc_id: hid_t,
    group_name: *const c_char,
    n: hsize_t,
    name: *mut c_char,
    size: size_t,
    _lapl_id: hid_t,
) -> ssize_t {
    engine::api("H5Lget_name_by_idx", -1, |lib| {
        let group_name = read_name(group_name)?;
        let (file, from) = lib.location(loc_id)?;
        let state = lib.file(file)?;
        let group = state.resolve(from, &group_name)?;
        let link = state
            .links(group)?
            .keys()
            .nth(n as usize)
            .ok_or_else(|| {
                Failure::new(
                    H5E_major_t::H5E_ARGS,
                    H5E_minor_t::H5E_BADRANGE,
                    format!("link index {n} out of range"),
                )
            })?;
        Ok(copy_name(link, name, size))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5e::H5Eset_auto;
    use crate::h5f::{H5Fclose, H5Fcreate, H5F_ACC_TRUNC};
    use crate::h5g::{H5G_info_t, H5Gclose, H5Gcreate2, H5Gget_info};
    use crate::h5p::H5P_DEFAULT;
    use std::ffi::{CStr, CString};

    fn scratch() -> (tempfile::TempDir, hid_t) {
        let dir = tempfile::tempdir().unwrap();
        let name = CString::new(dir.path().join("l.h5").to_str().unwrap()).unwrap();
        let file = unsafe { H5Fcreate(name.as_ptr(), H5F_ACC_TRUNC, H5P_DEFAULT, H5P_DEFAULT) };
        (dir, file)
    }

    #[test]
    fn exists_tolerates_missing_intermediates() {
        let (_dir, file) = scratch();
        let g = unsafe { H5Gcreate2(file, c"a".as_ptr(), H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT) };
        assert!(g > 0);
        unsafe {
            assert_eq!(H5Lexists(file, c"a".as_ptr(), H5P_DEFAULT), 1);
            assert_eq!(H5Lexists(file, c"/a".as_ptr(), H5P_DEFAULT), 1);
            assert_eq!(H5Lexists(file, c"b".as_ptr(), H5P_DEFAULT), 0);
            assert_eq!(H5Lexists(file, c"b/c".as_ptr(), H5P_DEFAULT), 0);
        }
        H5Gclose(g);
        H5Fclose(file);
    }

    #[test]
    fn names_by_index_and_delete() {
        H5Eset_auto(false);
        let (_dir, file) = scratch();
        for name in [c"zeta", c"alpha"] {
            let g = unsafe { H5Gcreate2(file, name.as_ptr(), H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT) };
            H5Gclose(g);
        }
        let mut buf = [0 as c_char; 16];
        let len = unsafe { H5Lget_name_by_idx(file, c".".as_ptr(), 0, buf.as_mut_ptr(), buf.len(), H5P_DEFAULT) };
        assert_eq!(len, 5);
        assert_eq!(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_str().unwrap(), "alpha");
        assert!(unsafe { H5Lget_name_by_idx(file, c".".as_ptr(), 2, buf.as_mut_ptr(), buf.len(), H5P_DEFAULT) } < 0);

        assert_eq!(unsafe { H5Ldelete(file, c"alpha".as_ptr(), H5P_DEFAULT) }, 0);
        let mut info = H5G_info_t::default();
        assert_eq!(unsafe { H5Gget_info(file, &mut info) }, 0);
        assert_eq!(info.nlinks, 1);
        assert!(unsafe { H5Ldelete(file, c"alpha".as_ptr(), H5P_DEFAULT) } < 0);
        H5Fclose(file);
    }
}
