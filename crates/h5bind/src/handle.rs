use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use h5bind_sys::h5i::{hid_t, H5I_type_t, H5Idec_ref, H5Iget_type, H5Iis_valid, H5I_INVALID_HID};

use crate::error::{Error, Result};
use crate::sync::sync;

/// Owning wrapper around a native identifier.
///
/// The identifier is released exactly once: by [`Handle::close`], or by the
/// drop safety net if `close` was never called. Library-owned identifiers
/// (predefined types, default property lists) are wrapped without
/// ownership, so closing or dropping them does nothing.
pub struct Handle {
    id: AtomicI64,
    owned: bool,
}

impl Handle {
    /// Takes ownership of a freshly created identifier.
    pub fn try_new(id: hid_t) -> Result<Self> {
        let handle = Self {
            id: AtomicI64::new(id),
            owned: true,
        };
        if sync(|| H5Iis_valid(id)) > 0 {
            Ok(handle)
        } else {
            handle.id.store(H5I_INVALID_HID, Ordering::SeqCst);
            Err(Error::InvalidHandle)
        }
    }

    /// Wraps a library-owned identifier without taking ownership.
    pub(crate) fn permanent(id: hid_t) -> Self {
        Self {
            id: AtomicI64::new(id),
            owned: false,
        }
    }

    /// Raw identifier, without any liveness check.
    pub fn raw(&self) -> hid_t {
        self.id.load(Ordering::SeqCst)
    }

    /// Identifier for a native call. Fails fast for released handles and
    /// for stale ones whose file has been closed.
    pub fn id(&self) -> Result<hid_t> {
        let id = self.raw();
        if id == H5I_INVALID_HID || sync(|| H5Iis_valid(id)) <= 0 {
            return Err(Error::InvalidHandle);
        }
        Ok(id)
    }

    pub fn is_valid(&self) -> bool {
        self.id().is_ok()
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn id_type(&self) -> H5I_type_t {
        match self.raw() {
            H5I_INVALID_HID => H5I_type_t::H5I_BADID,
            id => sync(|| H5Iget_type(id)),
        }
    }

    /// Releases the identifier. Closing twice, or closing a non-owning
    /// handle, is a no-op. Stale handles close successfully.
    pub fn close(&self) -> Result<()> {
        if !self.owned {
            return Ok(());
        }
        let id = self.id.swap(H5I_INVALID_HID, Ordering::SeqCst);
        if id == H5I_INVALID_HID {
            return Ok(());
        }
        log::trace!("releasing handle {id:#x}");
        h5call!(H5Idec_ref(id)).map(drop)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("failed to release handle: {err}");
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw() {
            H5I_INVALID_HID => f.write_str("Handle(<released>)"),
            id => write!(f, "Handle({id:#x})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5bind_sys::h5s::{H5S_class_t, H5Screate};
    use h5bind_sys::h5t::H5T_NATIVE_INT8;

    fn scalar_space() -> Handle {
        Handle::try_new(h5call!(H5Screate(H5S_class_t::H5S_SCALAR)).unwrap()).unwrap()
    }

    #[test]
    fn close_is_idempotent() {
        let handle = scalar_space();
        assert!(handle.is_valid());
        handle.close().unwrap();
        assert!(!handle.is_valid());
        handle.close().unwrap();
        assert!(matches!(handle.id(), Err(Error::InvalidHandle)));
    }

    #[test]
    fn try_new_rejects_dead_ids() {
        assert!(matches!(Handle::try_new(H5I_INVALID_HID), Err(Error::InvalidHandle)));
        let handle = scalar_space();
        let raw = handle.raw();
        drop(handle);
        assert!(matches!(Handle::try_new(raw), Err(Error::InvalidHandle)));
    }

    #[test]
    fn permanent_handles_survive_close() {
        let handle = Handle::permanent(H5T_NATIVE_INT8);
        handle.close().unwrap();
        assert!(handle.is_valid());
        assert_eq!(handle.id_type(), H5I_type_t::H5I_DATATYPE);
    }

    #[test]
    fn equality_is_identity() {
        let a = scalar_space();
        let b = scalar_space();
        assert_ne!(a, b);
        assert_eq!(a, Handle::permanent(a.raw()));
    }
}
