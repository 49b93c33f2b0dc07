//! Per-thread diagnostic error stack.
//!
//! A failing call pushes one record per failure level, innermost first, with
//! the API-level record on top. When automatic printing is enabled (the
//! default) the stack is written to stderr as soon as the call returns.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::io::Write;
use std::os::raw::{c_char, c_uint, c_void};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::Failure;
use crate::h5::{hbool_t, herr_t, ssize_t};

/// Error class describing which subsystem detected the failure.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5E_major_t {
    H5E_NONE_MAJOR = 0,
    H5E_ARGS,
    H5E_RESOURCE,
    H5E_ID,
    H5E_FILE,
    H5E_IO,
    H5E_SYM,
    H5E_DATASET,
    H5E_DATASPACE,
    H5E_DATATYPE,
    H5E_PLIST,
    H5E_ATTR,
}

/// Error detail describing what went wrong.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum H5E_minor_t {
    H5E_NONE_MINOR = 0,
    H5E_BADVALUE,
    H5E_BADTYPE,
    H5E_BADRANGE,
    H5E_UNSUPPORTED,
    H5E_NOSPACE,
    H5E_BADID,
    H5E_CANTDEC,
    H5E_EXISTS,
    H5E_NOTFOUND,
    H5E_CANTOPENFILE,
    H5E_CANTCREATE,
    H5E_CANTCLOSEFILE,
    H5E_CANTFLUSH,
    H5E_READERROR,
    H5E_WRITEERROR,
    H5E_CANTDECODE,
    H5E_CANTENCODE,
    H5E_CANTCONVERT,
    H5E_CANTINSERT,
    H5E_CANTSET,
}

/// One record of the error stack, as handed to [`H5Ewalk`] callbacks.
#[repr(C)]
#[derive(Debug)]
pub struct H5E_error_t {
    pub maj_num: H5E_major_t,
    pub min_num: H5E_minor_t,
    pub func_name: *const c_char,
    pub desc: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H5E_direction_t {
    /// Innermost record first.
    H5E_WALK_UPWARD = 0,
    /// API-level record first.
    H5E_WALK_DOWNWARD = 1,
}

pub type H5E_walk_t = Option<
    unsafe extern "C" fn(n: c_uint, err_desc: *const H5E_error_t, client_data: *mut c_void) -> herr_t,
>;

#[derive(Clone)]
struct Record {
    major: H5E_major_t,
    minor: H5E_minor_t,
    func: CString,
    desc: CString,
}

thread_local! {
    static STACK: RefCell<Vec<Record>> = const { RefCell::new(Vec::new()) };
}

static AUTO_PRINT: AtomicBool = AtomicBool::new(true);

/// Turns automatic printing of the error stack on or off.
pub extern "C" fn H5Eset_auto(enabled: hbool_t) -> herr_t {
    AUTO_PRINT.store(enabled, Ordering::SeqCst);
    0
}

/// Reports whether automatic printing is on.
///
/// # Safety
/// `enabled` must be valid for writes.
pub unsafe extern "C" fn H5Eget_auto(enabled: *mut hbool_t) -> herr_t {
    if enabled.is_null() {
        return -1;
    }
    *enabled = AUTO_PRINT.load(Ordering::SeqCst);
    0
}

/// Clears the calling thread's error stack.
pub extern "C" fn H5Eclear() -> herr_t {
    clear_stack();
    0
}

/// Number of records on the calling thread's error stack.
pub extern "C" fn H5Eget_num() -> ssize_t {
    STACK.with(|stack| stack.borrow().len() as ssize_t)
}

/// Calls `func` once per record of the calling thread's error stack.
///
/// Walking stops early when the callback returns a non-zero value, which is
/// then returned.
///
/// # Safety
/// `func` must be safe to call with the record pointer and `client_data`.
pub unsafe extern "C" fn H5Ewalk(
    direction: H5E_direction_t,
    func: H5E_walk_t,
    client_data: *mut c_void,
) -> herr_t {
    let Some(func) = func else {
        return -1;
    };
    let mut records = STACK.with(|stack| stack.borrow().clone());
    if direction == H5E_direction_t::H5E_WALK_DOWNWARD {
        records.reverse();
    }
    for (n, record) in records.iter().enumerate() {
        let raw = H5E_error_t {
            maj_num: record.major,
            min_num: record.minor,
            func_name: record.func.as_ptr(),
            desc: record.desc.as_ptr(),
        };
        let status = func(n as c_uint, &raw, client_data);
        if status != 0 {
            return status;
        }
    }
    0
}

/// Static description of an error class.
pub extern "C" fn H5Eget_major(maj: H5E_major_t) -> *const c_char {
    major_text(maj).as_ptr()
}

/// Static description of an error detail.
pub extern "C" fn H5Eget_minor(min: H5E_minor_t) -> *const c_char {
    minor_text(min).as_ptr()
}

/// Writes the calling thread's error stack to stderr.
pub extern "C" fn H5Eprint() -> herr_t {
    print_stack();
    0
}

fn major_text(maj: H5E_major_t) -> &'static CStr {
    use H5E_major_t::*;
    match maj {
        H5E_NONE_MAJOR => c"No error",
        H5E_ARGS => c"Invalid arguments to routine",
        H5E_RESOURCE => c"Resource unavailable",
        H5E_ID => c"Object ID",
        H5E_FILE => c"File accessibility",
        H5E_IO => c"Low-level I/O",
        H5E_SYM => c"Symbol table",
        H5E_DATASET => c"Dataset",
        H5E_DATASPACE => c"Dataspace",
        H5E_DATATYPE => c"Datatype",
        H5E_PLIST => c"Property lists",
        H5E_ATTR => c"Attribute",
    }
}

fn minor_text(min: H5E_minor_t) -> &'static CStr {
    use H5E_minor_t::*;
    match min {
        H5E_NONE_MINOR => c"No error",
        H5E_BADVALUE => c"Bad value",
        H5E_BADTYPE => c"Inappropriate type",
        H5E_BADRANGE => c"Out of range",
        H5E_UNSUPPORTED => c"Feature is unsupported",
        H5E_NOSPACE => c"No space available for allocation",
        H5E_BADID => c"Unable to find ID information",
        H5E_CANTDEC => c"Unable to decrement reference count",
        H5E_EXISTS => c"Object already exists",
        H5E_NOTFOUND => c"Object not found",
        H5E_CANTOPENFILE => c"Unable to open file",
        H5E_CANTCREATE => c"Unable to create file",
        H5E_CANTCLOSEFILE => c"Unable to close file",
        H5E_CANTFLUSH => c"Unable to flush data from cache",
        H5E_READERROR => c"Read failed",
        H5E_WRITEERROR => c"Write failed",
        H5E_CANTDECODE => c"Unable to decode value",
        H5E_CANTENCODE => c"Unable to encode value",
        H5E_CANTCONVERT => c"Can't convert datatypes",
        H5E_CANTINSERT => c"Unable to insert object",
        H5E_CANTSET => c"Can't set value",
    }
}

pub(crate) fn clear_stack() {
    STACK.with(|stack| stack.borrow_mut().clear());
}

/// Pushes `failure` and its causes, innermost first, attributed to `func`.
pub(crate) fn push_failure(func: &'static str, failure: Failure) {
    let mut chain = Vec::new();
    let mut current = Some(failure);
    while let Some(level) = current {
        current = level.cause.map(|cause| *cause);
        chain.push(Record {
            major: level.major,
            minor: level.minor,
            func: CString::new(func).unwrap_or_default(),
            desc: CString::new(level.desc.replace('\0', " ")).unwrap_or_default(),
        });
    }
    chain.reverse();
    STACK.with(|stack| stack.borrow_mut().extend(chain));
}

/// Prints the stack if automatic printing is on.
pub(crate) fn report() {
    if AUTO_PRINT.load(Ordering::SeqCst) {
        print_stack();
    }
}

fn print_stack() {
    let records = STACK.with(|stack| stack.borrow().clone());
    if records.is_empty() {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(
        out,
        "{}-DIAG: Error detected in thread {:?}:",
        crate::h5::H5_VERS_INFO,
        std::thread::current().id()
    );
    for (n, record) in records.iter().rev().enumerate() {
        let _ = writeln!(
            out,
            "  #{n:03}: in {}(): {}\n    major: {}\n    minor: {}",
            record.func.to_string_lossy(),
            record.desc.to_string_lossy(),
            major_text(record.major).to_string_lossy(),
            minor_text(record.minor).to_string_lossy(),
        );
    }
}
