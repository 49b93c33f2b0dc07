use std::ffi::CString;
use std::os::raw::{c_char, c_uint};

use h5bind_sys::h5f::{H5Fclose, H5Fget_intent, H5F_ACC_RDWR};
use h5bind_sys::h5i::{hid_t, H5Iget_file_id};

use crate::error::{Error, Result};
use crate::sync::sync;

/// Converts an object name for a native call. Empty names and names with
/// interior NUL bytes are rejected.
pub(crate) fn to_cstring(name: &str) -> Result<CString> {
    if name.is_empty() {
        return Err(Error::InvalidName(name.into()));
    }
    CString::new(name).map_err(|_| Error::InvalidName(name.into()))
}

/// Reads a string through the usual two-call protocol: query the length
/// with a null buffer, then fill a buffer one byte longer.
pub(crate) fn get_h5_str<F>(func: F) -> Result<String>
where
    F: Fn(*mut c_char, usize) -> isize,
{
    sync(|| {
        let len = crate::error::h5check(func(std::ptr::null_mut(), 0))? as usize;
        let mut buf = vec![0u8; len + 1];
        crate::error::h5check(func(buf.as_mut_ptr().cast(), buf.len()))?;
        buf.truncate(len);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

/// Whether the file holding `id` was opened without write intent.
pub(crate) fn is_read_only(id: hid_t) -> Result<bool> {
    sync(|| {
        let file = h5try!(H5Iget_file_id(id));
        let mut intent: c_uint = 0;
        let status = h5call!(H5Fget_intent(file, &mut intent));
        h5try!(H5Fclose(file));
        status?;
        Ok(intent & H5F_ACC_RDWR == 0)
    })
}

/// Fails with `ReadOnly` when the file holding `id` cannot be written.
pub(crate) fn ensure_writable(id: hid_t, what: &str) -> Result<()> {
    if is_read_only(id)? {
        return Err(Error::ReadOnly(format!("cannot {what}: file is open read-only")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_nonempty_and_nul_free() {
        assert!(matches!(to_cstring(""), Err(Error::InvalidName(_))));
        assert!(matches!(to_cstring("a\0b"), Err(Error::InvalidName(_))));
        assert_eq!(to_cstring("a/b").unwrap().as_bytes(), b"a/b");
    }
}
