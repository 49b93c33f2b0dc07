//! Error type for the binding, and translation of native status codes.
//!
//! Every native call goes through [`h5check`] (usually via the `h5call!`
//! and `h5try!` macros). A failing status captures the calling thread's
//! native diagnostic stack into the returned [`Error`] and clears it, so
//! the native library never has to print anything itself.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_uint, c_void};

use h5bind_sys::h5::herr_t;
use h5bind_sys::h5d::H5D_layout_t;
use h5bind_sys::h5e::{
    H5E_direction_t, H5E_error_t, H5E_major_t, H5E_minor_t, H5Eclear, H5Eget_major,
    H5Eget_minor, H5Eget_num, H5Eset_auto, H5Ewalk,
};
use h5bind_sys::h5i::H5I_type_t;
use h5bind_sys::h5s::H5S_class_t;
use h5bind_sys::h5t::{H5T_class_t, H5T_cset_t, H5T_sign_t, H5T_str_t};

use crate::types::StringError;

/// Errors that can occur when using the binding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The handle was released, or belongs to a file that has been closed.
    #[error("invalid or released handle")]
    InvalidHandle,

    /// A native call reported failure. `stack` holds the diagnostic records
    /// the call left behind.
    #[error("native call failed with status {status}: {stack}")]
    NativeFailure { status: i64, stack: ErrorStack },

    #[error("value out of range: {0}")]
    RangeError(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("size mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A type shape cannot be mapped to a native datatype. `path` names the
    /// offending field, e.g. `Reading.samples[]`.
    #[error("unsupported type at `{path}`: {reason}")]
    UnsupportedType { path: String, reason: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Mutation attempted through a container opened read-only.
    #[error("read-only: {0}")]
    ReadOnly(String),

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    String(#[from] StringError),
}

/// Result alias using the binding [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn unsupported_type(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnsupportedType {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The captured native stack, if this is a native failure.
    pub fn stack(&self) -> Option<&ErrorStack> {
        match self {
            Error::NativeFailure { stack, .. } => Some(stack),
            _ => None,
        }
    }
}

/// One native diagnostic record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFrame {
    pub func: String,
    pub desc: String,
    pub major: String,
    pub minor: String,
    minor_code: H5E_minor_t,
}

impl ErrorFrame {
    pub fn minor_code(&self) -> H5E_minor_t {
        self.minor_code
    }
}

impl fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(): {}", self.func, self.desc)
    }
}

/// The native diagnostic stack captured at the time of a failure, ordered
/// from the API-level record down to the innermost cause.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorStack {
    frames: Vec<ErrorFrame>,
}

unsafe extern "C" fn collect_frame(
    _n: c_uint,
    err: *const H5E_error_t,
    data: *mut c_void,
) -> herr_t {
    let frames = &mut *(data as *mut Vec<ErrorFrame>);
    let err = &*err;
    frames.push(ErrorFrame {
        func: text(err.func_name),
        desc: text(err.desc),
        major: text(H5Eget_major(err.maj_num)),
        minor: text(H5Eget_minor(err.min_num)),
        minor_code: err.min_num,
    });
    0
}

unsafe fn text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

impl ErrorStack {
    /// Takes the calling thread's native stack, leaving it empty.
    pub fn capture() -> Self {
        let mut frames = Vec::<ErrorFrame>::new();
        unsafe {
            H5Ewalk(
                H5E_direction_t::H5E_WALK_DOWNWARD,
                Some(collect_frame),
                (&mut frames as *mut Vec<ErrorFrame>).cast(),
            );
        }
        H5Eclear();
        Self { frames }
    }

    pub fn frames(&self) -> &[ErrorFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The deepest record, which usually says what actually went wrong.
    pub fn innermost(&self) -> Option<&ErrorFrame> {
        self.frames.last()
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut frames = self.frames.iter();
        match frames.next() {
            None => f.write_str("no diagnostic recorded"),
            Some(top) => {
                write!(f, "{top}")?;
                for frame in frames {
                    write!(f, ": {}", frame.desc)?;
                }
                Ok(())
            }
        }
    }
}

/// Status values returned by native calls that can signal failure.
pub trait H5ErrorCode: Copy {
    fn is_err_code(self) -> bool;

    fn status(self) -> i64;
}

macro_rules! signed_codes {
    ($($ty:ty),*) => {$(
        impl H5ErrorCode for $ty {
            fn is_err_code(self) -> bool {
                self < 0
            }

            fn status(self) -> i64 {
                self as i64
            }
        }
    )*};
}

signed_codes!(i32, i64, isize);

/// Sizes and element counts, where 0 signals failure.
impl H5ErrorCode for usize {
    fn is_err_code(self) -> bool {
        self == 0
    }

    fn status(self) -> i64 {
        self as i64
    }
}

impl H5ErrorCode for *mut c_char {
    fn is_err_code(self) -> bool {
        self.is_null()
    }

    fn status(self) -> i64 {
        -1
    }
}

macro_rules! enum_codes {
    ($($ty:ty => $err:expr),* $(,)?) => {$(
        impl H5ErrorCode for $ty {
            fn is_err_code(self) -> bool {
                self == $err
            }

            fn status(self) -> i64 {
                self as i64
            }
        }
    )*};
}

enum_codes! {
    H5I_type_t => H5I_type_t::H5I_BADID,
    H5T_class_t => H5T_class_t::H5T_NO_CLASS,
    H5T_sign_t => H5T_sign_t::H5T_SGN_ERROR,
    H5T_cset_t => H5T_cset_t::H5T_CSET_ERROR,
    H5T_str_t => H5T_str_t::H5T_STR_ERROR,
    H5S_class_t => H5S_class_t::H5S_NO_CLASS,
    H5D_layout_t => H5D_layout_t::H5D_LAYOUT_ERROR,
}

/// Turns a native status into a `Result`, capturing the diagnostic stack on
/// failure. Well-known failure details map onto structured variants.
pub fn h5check<T: H5ErrorCode>(value: T) -> Result<T> {
    if !value.is_err_code() {
        return Ok(value);
    }
    let stack = ErrorStack::capture();
    let detail = stack
        .innermost()
        .map(|frame| frame.desc.clone())
        .unwrap_or_default();
    Err(match stack.innermost().map(ErrorFrame::minor_code) {
        Some(H5E_minor_t::H5E_EXISTS) => Error::AlreadyExists(detail),
        Some(H5E_minor_t::H5E_NOTFOUND) => Error::NotFound(detail),
        Some(H5E_minor_t::H5E_BADID) => Error::InvalidHandle,
        Some(H5E_minor_t::H5E_BADRANGE) => Error::RangeError(detail),
        _ => Error::NativeFailure {
            status: value.status(),
            stack,
        },
    })
}

/// Checks a status whose failure sentinel, zero, is also a valid result,
/// such as a compound member offset. A zero only fails when the call left a
/// diagnostic behind.
pub fn h5check_offset(value: usize) -> Result<usize> {
    if value == 0 && H5Eget_num() > 0 {
        return h5check(value);
    }
    Ok(value)
}

/// Turns the native library's own printing of failed calls on or off. The
/// binding switches it off when it first initializes the library.
pub fn silence_errors(silence: bool) {
    crate::sync::sync(|| {
        H5Eset_auto(!silence);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5bind_sys::h5i::H5Idec_ref;
    use h5bind_sys::h5t::H5Tget_size;

    #[test]
    fn failure_captures_and_clears_stack() {
        let err = h5call!(H5Tget_size(-1)).unwrap_err();
        assert!(matches!(err, Error::InvalidHandle));
        assert_eq!(h5bind_sys::h5e::H5Eget_num(), 0);
    }

    #[test]
    fn native_failure_keeps_frames() {
        let err = h5call!(H5Idec_ref(h5bind_sys::h5t::H5T_NATIVE_INT32)).unwrap_err();
        let stack = err.stack().expect("native failure");
        assert_eq!(stack.frames()[0].func, "H5Idec_ref");
        assert_eq!(stack.innermost().unwrap().minor_code(), H5E_minor_t::H5E_CANTDEC);
        assert!(err.to_string().contains("library-owned"));
    }

    #[test]
    fn zero_offsets_fail_only_with_a_diagnostic() {
        use h5bind_sys::h5t::H5Tget_member_offset;

        let err = crate::sync::sync(|| h5check_offset(H5Tget_member_offset(-1, 0))).unwrap_err();
        assert!(matches!(err, Error::InvalidHandle));
        assert_eq!(H5Eget_num(), 0);
        assert_eq!(h5check_offset(0).unwrap(), 0);
        assert_eq!(h5check_offset(16).unwrap(), 16);
    }

    #[test]
    fn success_passes_value_through() {
        assert_eq!(h5check(3i32).unwrap(), 3);
        assert_eq!(h5check(8usize).unwrap(), 8);
    }
}
