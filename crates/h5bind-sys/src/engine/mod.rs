//! Process-wide engine state behind the call interface.
//!
//! All state lives in one [`Library`] value guarded by a mutex. Each API
//! entry point runs through [`api`], which clears the calling thread's error
//! stack, runs the body under the lock, and turns a [`Failure`] into the
//! caller-supplied failure sentinel plus error-stack records.

mod checksum;
pub(crate) mod dtype;
pub(crate) mod image;
pub(crate) mod plist;
pub(crate) mod space;
pub(crate) mod transfer;
pub(crate) mod tree;

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_uint};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::h5::{hsize_t, size_t, ssize_t};
use crate::h5e::{self, H5E_major_t, H5E_minor_t};
use crate::h5f::{H5F_ACC_EXCL, H5F_ACC_RDWR, H5F_OBJ_ATTR, H5F_OBJ_DATASET, H5F_OBJ_FILE, H5F_OBJ_GROUP};
use crate::h5i::{hid_t, make_id, H5I_type_t};
use crate::h5p::H5P_DEFAULT;

use self::dtype::TypeDesc;
use self::plist::{PlistClass, PlistDesc};
use self::space::SpaceDesc;
use self::tree::{FileState, NodeId, ROOT};

pub(crate) type FileKey = u64;

/// Failure detected inside the engine.
#[derive(Debug)]
pub(crate) struct Failure {
    pub major: H5E_major_t,
    pub minor: H5E_minor_t,
    pub desc: String,
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    pub(crate) fn new(major: H5E_major_t, minor: H5E_minor_t, desc: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            desc: desc.into(),
            cause: None,
        }
    }

    pub(crate) fn args(desc: impl Into<String>) -> Self {
        Self::new(H5E_major_t::H5E_ARGS, H5E_minor_t::H5E_BADVALUE, desc)
    }

    pub(crate) fn bad_type(desc: impl Into<String>) -> Self {
        Self::new(H5E_major_t::H5E_ARGS, H5E_minor_t::H5E_BADTYPE, desc)
    }

    pub(crate) fn nospace(desc: impl Into<String>) -> Self {
        Self::new(H5E_major_t::H5E_RESOURCE, H5E_minor_t::H5E_NOSPACE, desc)
    }

    /// Wraps `self` as the cause of a new, outer failure.
    pub(crate) fn context(
        self,
        major: H5E_major_t,
        minor: H5E_minor_t,
        desc: impl Into<String>,
    ) -> Self {
        Self {
            major,
            minor,
            desc: desc.into(),
            cause: Some(Box::new(self)),
        }
    }
}

pub(crate) type Outcome<T> = Result<T, Failure>;

/// An object an identifier refers to.
///
/// File-resident objects carry the write intent of the identifier they were
/// opened through, so a read-only handle on a file that is also open
/// read-write still refuses mutation.
#[derive(Debug)]
pub(crate) enum Object {
    File { file: FileKey, writable: bool },
    Group { file: FileKey, node: NodeId, writable: bool },
    Dataset { file: FileKey, node: NodeId, writable: bool },
    Attribute { file: FileKey, node: NodeId, name: String, writable: bool },
    Dataspace(SpaceDesc),
    Datatype { desc: TypeDesc, locked: bool },
    PropClass(PlistClass),
    PropList(PlistDesc),
}

impl Object {
    pub(crate) fn id_type(&self) -> H5I_type_t {
        match self {
            Object::File { .. } => H5I_type_t::H5I_FILE,
            Object::Group { .. } => H5I_type_t::H5I_GROUP,
            Object::Dataset { .. } => H5I_type_t::H5I_DATASET,
            Object::Attribute { .. } => H5I_type_t::H5I_ATTR,
            Object::Dataspace(_) => H5I_type_t::H5I_DATASPACE,
            Object::Datatype { .. } => H5I_type_t::H5I_DATATYPE,
            Object::PropClass(_) => H5I_type_t::H5I_GENPROP_CLS,
            Object::PropList(_) => H5I_type_t::H5I_GENPROP_LST,
        }
    }

    pub(crate) fn file_key(&self) -> Option<FileKey> {
        match self {
            Object::File { file, .. }
            | Object::Group { file, .. }
            | Object::Dataset { file, .. }
            | Object::Attribute { file, .. } => Some(*file),
            _ => None,
        }
    }

    /// Write intent of a file-resident object; `None` for everything else.
    pub(crate) fn writable(&self) -> Option<bool> {
        match self {
            Object::File { writable, .. }
            | Object::Group { writable, .. }
            | Object::Dataset { writable, .. }
            | Object::Attribute { writable, .. } => Some(*writable),
            _ => None,
        }
    }
}

struct Entry {
    object: Object,
    permanent: bool,
}

/// First serial handed out to caller-owned identifiers; lower serials are
/// reserved for predefined types, property list classes and default lists.
const FIRST_SERIAL: i64 = 256;

pub(crate) struct Library {
    entries: HashMap<hid_t, Entry>,
    next_serial: i64,
    files: HashMap<FileKey, FileState>,
    next_file: FileKey,
}

fn library() -> &'static Mutex<Library> {
    static LIBRARY: OnceLock<Mutex<Library>> = OnceLock::new();
    LIBRARY.get_or_init(|| Mutex::new(Library::new()))
}

/// Runs one API call against the library state.
pub(crate) fn api<T>(
    func: &'static str,
    on_error: T,
    body: impl FnOnce(&mut Library) -> Outcome<T>,
) -> T {
    h5e::clear_stack();
    let outcome = {
        let mut lib = library().lock();
        body(&mut lib)
    };
    match outcome {
        Ok(value) => value,
        Err(failure) => {
            h5e::push_failure(func, failure);
            h5e::report();
            on_error
        }
    }
}

fn bad_id(id: hid_t) -> Failure {
    Failure::new(
        H5E_major_t::H5E_ID,
        H5E_minor_t::H5E_BADID,
        format!("invalid identifier {id:#x}"),
    )
}

fn stale() -> Failure {
    Failure::new(
        H5E_major_t::H5E_ID,
        H5E_minor_t::H5E_BADID,
        "the file this object belongs to has been closed",
    )
}

pub(crate) fn type_name(ty: H5I_type_t) -> &'static str {
    match ty {
        H5I_type_t::H5I_BADID => "invalid identifier",
        H5I_type_t::H5I_FILE => "file",
        H5I_type_t::H5I_GROUP => "group",
        H5I_type_t::H5I_DATATYPE => "datatype",
        H5I_type_t::H5I_DATASPACE => "dataspace",
        H5I_type_t::H5I_DATASET => "dataset",
        H5I_type_t::H5I_ATTR => "attribute",
        H5I_type_t::H5I_GENPROP_CLS => "property list class",
        H5I_type_t::H5I_GENPROP_LST => "property list",
    }
}

impl Library {
    fn new() -> Self {
        let mut lib = Library {
            entries: HashMap::new(),
            next_serial: FIRST_SERIAL,
            files: HashMap::new(),
            next_file: 1,
        };
        for (id, desc) in dtype::predefined() {
            lib.insert_permanent(id, Object::Datatype { desc, locked: true });
        }
        for class in PlistClass::ALL {
            lib.insert_permanent(class.class_id(), Object::PropClass(class));
            lib.insert_permanent(class.default_list_id(), Object::PropList(PlistDesc::new(class)));
        }
        lib
    }

    fn insert_permanent(&mut self, id: hid_t, object: Object) {
        self.entries.insert(id, Entry { object, permanent: true });
    }

    pub(crate) fn register(&mut self, object: Object) -> hid_t {
        let id = make_id(object.id_type(), self.next_serial);
        self.next_serial += 1;
        self.entries.insert(
            id,
            Entry {
                object,
                permanent: false,
            },
        );
        id
    }

    pub(crate) fn object(&self, id: hid_t) -> Outcome<&Object> {
        self.entries
            .get(&id)
            .map(|entry| &entry.object)
            .ok_or_else(|| bad_id(id))
    }

    pub(crate) fn is_valid(&self, id: hid_t) -> bool {
        match self.entries.get(&id) {
            None => false,
            Some(entry) => entry
                .object
                .file_key()
                .map_or(true, |key| self.files.contains_key(&key)),
        }
    }

    /// Removes a caller-owned identifier. Stale identifiers (whose file was
    /// closed) can still be released.
    pub(crate) fn release(&mut self, id: hid_t, expected: Option<H5I_type_t>) -> Outcome<()> {
        let entry = self.entries.get(&id).ok_or_else(|| bad_id(id))?;
        if let Some(ty) = expected {
            if entry.object.id_type() != ty {
                return Err(Failure::bad_type(format!(
                    "identifier {id:#x} is not a {}",
                    type_name(ty)
                )));
            }
        }
        if entry.permanent {
            return Err(Failure::new(
                H5E_major_t::H5E_ID,
                H5E_minor_t::H5E_CANTDEC,
                "cannot release a library-owned identifier",
            ));
        }
        if let Some(Entry {
            object: Object::File { file, .. },
            ..
        }) = self.entries.remove(&id)
        {
            self.detach_file(file)?;
        }
        Ok(())
    }

    // ---- files ----

    pub(crate) fn create_file(
        &mut self,
        path: &Path,
        flags: c_uint,
        fcpl: &PlistDesc,
    ) -> Outcome<hid_t> {
        let path = absolute(path);
        if self.open_file_key(&path).is_some() {
            return Err(Failure::new(
                H5E_major_t::H5E_FILE,
                H5E_minor_t::H5E_CANTCREATE,
                format!("unable to truncate a file which is already open: {}", path.display()),
            ));
        }
        if flags & H5F_ACC_EXCL != 0 && path.exists() {
            return Err(Failure::new(
                H5E_major_t::H5E_FILE,
                H5E_minor_t::H5E_EXISTS,
                format!("file exists: {}", path.display()),
            ));
        }
        let state = FileState::new(path, true, fcpl.size(plist::USERBLOCK));
        image::store(&state).map_err(|f| {
            f.context(
                H5E_major_t::H5E_FILE,
                H5E_minor_t::H5E_CANTCREATE,
                "unable to create file",
            )
        })?;
        Ok(self.attach_file(state))
    }

    pub(crate) fn open_file(&mut self, path: &Path, flags: c_uint) -> Outcome<hid_t> {
        let path = absolute(path);
        let writable = flags & H5F_ACC_RDWR != 0;
        if let Some(key) = self.open_file_key(&path) {
            let state = self.file_mut(key)?;
            if writable && !state.writable {
                return Err(Failure::new(
                    H5E_major_t::H5E_FILE,
                    H5E_minor_t::H5E_CANTOPENFILE,
                    "file is already open read-only",
                ));
            }
            state.refs += 1;
            return Ok(self.register(Object::File { file: key, writable }));
        }
        let state = image::load(&path, writable).map_err(|f| {
            f.context(
                H5E_major_t::H5E_FILE,
                H5E_minor_t::H5E_CANTOPENFILE,
                format!("unable to open file: {}", path.display()),
            )
        })?;
        Ok(self.attach_file(state))
    }

    /// Opens another identifier on an open file with the given intent.
    pub(crate) fn reopen_file(&mut self, key: FileKey, writable: bool) -> Outcome<hid_t> {
        self.file_mut(key)?.refs += 1;
        Ok(self.register(Object::File { file: key, writable }))
    }

    fn attach_file(&mut self, mut state: FileState) -> hid_t {
        state.refs = 1;
        let writable = state.writable;
        let key = self.next_file;
        self.next_file += 1;
        self.files.insert(key, state);
        self.register(Object::File { file: key, writable })
    }

    fn detach_file(&mut self, key: FileKey) -> Outcome<()> {
        let Some(state) = self.files.get_mut(&key) else {
            return Ok(());
        };
        state.refs = state.refs.saturating_sub(1);
        if state.refs > 0 {
            return Ok(());
        }
        if let Some(state) = self.files.remove(&key) {
            if state.writable {
                image::store(&state).map_err(|f| {
                    f.context(
                        H5E_major_t::H5E_FILE,
                        H5E_minor_t::H5E_CANTCLOSEFILE,
                        "unable to flush file while closing it",
                    )
                })?;
            }
        }
        Ok(())
    }

    fn open_file_key(&self, path: &Path) -> Option<FileKey> {
        self.files
            .iter()
            .find(|(_, state)| state.path == path)
            .map(|(key, _)| *key)
    }

    pub(crate) fn file(&self, key: FileKey) -> Outcome<&FileState> {
        self.files.get(&key).ok_or_else(stale)
    }

    pub(crate) fn file_mut(&mut self, key: FileKey) -> Outcome<&mut FileState> {
        self.files.get_mut(&key).ok_or_else(stale)
    }

    pub(crate) fn flush_file(&self, key: FileKey) -> Outcome<()> {
        let state = self.file(key)?;
        if state.writable {
            image::store(state)?;
        }
        Ok(())
    }

    /// Resolves a location identifier (file, group or dataset) to its node.
    pub(crate) fn location(&self, id: hid_t) -> Outcome<(FileKey, NodeId)> {
        match self.object(id)? {
            Object::File { file, .. } => {
                self.file(*file)?;
                Ok((*file, ROOT))
            }
            Object::Group { file, node, .. } | Object::Dataset { file, node, .. } => {
                self.file(*file)?;
                Ok((*file, *node))
            }
            _ => Err(Failure::bad_type(format!("identifier {id:#x} is not a location"))),
        }
    }

    /// Write intent of the identifier `id`, which must live in a file.
    pub(crate) fn intent(&self, id: hid_t) -> Outcome<bool> {
        self.object(id)?
            .writable()
            .ok_or_else(|| Failure::bad_type(format!("identifier {id:#x} is not in a file")))
    }

    /// Fails unless `id` was opened with write intent.
    pub(crate) fn check_intent(&self, id: hid_t) -> Outcome<()> {
        if self.intent(id)? {
            Ok(())
        } else {
            Err(Failure::new(
                H5E_major_t::H5E_FILE,
                H5E_minor_t::H5E_WRITEERROR,
                "no write intent on file",
            ))
        }
    }

    pub(crate) fn object_path(&self, id: hid_t) -> Outcome<String> {
        match self.object(id)? {
            Object::File { file, .. } => {
                self.file(*file)?;
                Ok("/".to_owned())
            }
            Object::Group { file, node, .. }
            | Object::Dataset { file, node, .. }
            | Object::Attribute { file, node, .. } => Ok(self.file(*file)?.path_of(*node)),
            _ => Err(Failure::bad_type(format!("identifier {id:#x} has no path"))),
        }
    }

    // ---- typed lookups ----

    pub(crate) fn datatype(&self, id: hid_t) -> Outcome<&TypeDesc> {
        match self.object(id)? {
            Object::Datatype { desc, .. } => Ok(desc),
            _ => Err(Failure::bad_type(format!("identifier {id:#x} is not a datatype"))),
        }
    }

    pub(crate) fn datatype_mut(&mut self, id: hid_t) -> Outcome<&mut TypeDesc> {
        match self.entries.get_mut(&id).map(|entry| &mut entry.object) {
            Some(Object::Datatype { desc, locked }) => {
                if *locked {
                    Err(Failure::new(
                        H5E_major_t::H5E_DATATYPE,
                        H5E_minor_t::H5E_CANTSET,
                        "datatype is read-only",
                    ))
                } else {
                    Ok(desc)
                }
            }
            Some(_) => Err(Failure::bad_type(format!("identifier {id:#x} is not a datatype"))),
            None => Err(bad_id(id)),
        }
    }

    pub(crate) fn dataspace(&self, id: hid_t) -> Outcome<&SpaceDesc> {
        match self.object(id)? {
            Object::Dataspace(space) => Ok(space),
            _ => Err(Failure::bad_type(format!("identifier {id:#x} is not a dataspace"))),
        }
    }

    pub(crate) fn dataspace_mut(&mut self, id: hid_t) -> Outcome<&mut SpaceDesc> {
        match self.entries.get_mut(&id).map(|entry| &mut entry.object) {
            Some(Object::Dataspace(space)) => Ok(space),
            Some(_) => Err(Failure::bad_type(format!("identifier {id:#x} is not a dataspace"))),
            None => Err(bad_id(id)),
        }
    }

    /// Settings of property list `id`, which must belong to `class`.
    /// `H5P_DEFAULT` yields the class defaults.
    pub(crate) fn plist(&self, id: hid_t, class: PlistClass) -> Outcome<PlistDesc> {
        if id == H5P_DEFAULT {
            return Ok(PlistDesc::new(class));
        }
        let desc = self.plist_any(id)?;
        if desc.class != class {
            return Err(Failure::bad_type(format!(
                "expected a {} property list, got a {} list",
                class.name(),
                desc.class.name()
            )));
        }
        Ok(desc.clone())
    }

    pub(crate) fn plist_any(&self, id: hid_t) -> Outcome<&PlistDesc> {
        match self.object(id)? {
            Object::PropList(desc) => Ok(desc),
            _ => Err(Failure::bad_type(format!("identifier {id:#x} is not a property list"))),
        }
    }

    pub(crate) fn plist_mut(&mut self, id: hid_t) -> Outcome<&mut PlistDesc> {
        match self.entries.get_mut(&id) {
            Some(Entry { permanent: true, .. }) => Err(Failure::new(
                H5E_major_t::H5E_PLIST,
                H5E_minor_t::H5E_CANTSET,
                "default property lists are immutable",
            )),
            Some(Entry {
                object: Object::PropList(desc),
                ..
            }) => Ok(desc),
            Some(_) => Err(Failure::bad_type(format!("identifier {id:#x} is not a property list"))),
            None => Err(bad_id(id)),
        }
    }

    // ---- accounting ----

    pub(crate) fn count_of_type(&self, ty: H5I_type_t) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.permanent && entry.object.id_type() == ty)
            .count()
    }

    /// Counts live identifiers attached to file `key` (or to any open file)
    /// whose kind is selected by `mask`.
    pub(crate) fn count_in_file(&self, key: Option<FileKey>, mask: c_uint) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.permanent)
            .filter(|entry| match entry.object.file_key() {
                Some(k) => self.files.contains_key(&k) && key.map_or(true, |key| key == k),
                None => false,
            })
            .filter(|entry| {
                let bit = match entry.object.id_type() {
                    H5I_type_t::H5I_FILE => H5F_OBJ_FILE,
                    H5I_type_t::H5I_DATASET => H5F_OBJ_DATASET,
                    H5I_type_t::H5I_GROUP => H5F_OBJ_GROUP,
                    H5I_type_t::H5I_ATTR => H5F_OBJ_ATTR,
                    _ => 0,
                };
                mask & bit != 0
            })
            .count()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

// ---- C string and array helpers ----

/// Reads a caller-supplied NUL-terminated UTF-8 name.
pub(crate) unsafe fn read_name(ptr: *const c_char) -> Outcome<String> {
    if ptr.is_null() {
        return Err(Failure::args("null name pointer"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| Failure::args("name is not valid UTF-8"))
}

/// Copies `src` into a caller buffer of `size` bytes, truncating and always
/// NUL-terminating. Returns the untruncated length.
pub(crate) unsafe fn copy_name(src: &str, buf: *mut c_char, size: size_t) -> ssize_t {
    let bytes = src.as_bytes();
    if !buf.is_null() && size > 0 {
        let n = bytes.len().min(size - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), n);
        *buf.add(n) = 0;
    }
    bytes.len() as ssize_t
}

/// Copies `rank` dimension values from a caller array.
pub(crate) unsafe fn read_dims(ptr: *const hsize_t, rank: usize) -> Outcome<Vec<u64>> {
    if rank == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(Failure::args("null dimension array"));
    }
    Ok(std::slice::from_raw_parts(ptr, rank).to_vec())
}

/// Allocates a NUL-terminated copy of `bytes` with the C allocator, so that
/// callers can release it with `H5free_memory`.
pub(crate) fn malloc_bytes(bytes: &[u8]) -> Outcome<*mut c_char> {
    // SAFETY: the allocation is checked for null and sized for the copy plus
    // the terminator.
    unsafe {
        let ptr = libc::malloc(bytes.len() + 1).cast::<u8>();
        if ptr.is_null() {
            return Err(Failure::nospace("unable to allocate string"));
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        *ptr.add(bytes.len()) = 0;
        Ok(ptr.cast())
    }
}
