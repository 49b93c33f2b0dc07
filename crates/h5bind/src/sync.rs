//! Serialization of native calls.
//!
//! Unless the `threadsafe` feature is enabled, the native library is treated
//! as non-reentrant across threads: every call runs under one process-wide
//! reentrant lock. The lock is reentrant so that a wrapper operation can
//! compose several native calls under one acquisition.

use std::sync::OnceLock;

#[cfg(not(feature = "threadsafe"))]
use parking_lot::ReentrantMutex;

use h5bind_sys::h5::H5open;
use h5bind_sys::h5e::H5Eset_auto;

#[cfg(not(feature = "threadsafe"))]
fn lock() -> &'static ReentrantMutex<()> {
    static LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| ReentrantMutex::new(()))
}

fn ensure_init() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        H5open();
        H5Eset_auto(false);
        log::debug!("native library initialized, automatic error printing disabled");
    });
}

/// Runs `func` with the native library initialized and, unless the build is
/// thread-safe, with the global lock held.
pub fn sync<T, F>(func: F) -> T
where
    F: FnOnce() -> T,
{
    #[cfg(not(feature = "threadsafe"))]
    let _guard = lock().lock();
    ensure_init();
    func()
}
