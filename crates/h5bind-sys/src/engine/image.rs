//! Persisted file image in the HDF5 file format.
//!
//! Files are written whole on flush and close: an optional zeroed user
//! block, a version 2 superblock, the global heap collections that hold
//! variable-length strings, then every object bottom-up so each header can
//! name its children's addresses. Groups keep their links compactly in
//! version 2 object headers. Datasets carry a version 3 layout message whose
//! raw data is inline (compact), one block (contiguous) or indexed by a
//! version 1 B-tree of chunks. Addresses are relative to the superblock.
//!
//! Loading accepts the same subset plus the header variants other writers
//! commonly emit (continuation blocks, stored times, creation order).

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use super::checksum::lookup3;
use super::dtype::{TypeDesc, VL_SLOT};
use super::space::{decode_error, strides, SpaceDesc};
use super::tree::{DatasetNode, FileState, Node, NodeId, NodeKind, Payload, ROOT};
use super::{Failure, Outcome};
use crate::h5d::H5D_layout_t;
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5t::H5T_cset_t;

pub(crate) const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

const SUPERBLOCK_VERSION: u8 = 2;
const SUPERBLOCK_SIZE: usize = 48;
const UNDEF: u64 = u64::MAX;

const MSG_NIL: u8 = 0x00;
const MSG_DATASPACE: u8 = 0x01;
const MSG_LINK_INFO: u8 = 0x02;
const MSG_DATATYPE: u8 = 0x03;
const MSG_FILL_VALUE: u8 = 0x05;
const MSG_LINK: u8 = 0x06;
const MSG_LAYOUT: u8 = 0x08;
const MSG_GROUP_INFO: u8 = 0x0A;
const MSG_FILTERS: u8 = 0x0B;
const MSG_ATTRIBUTE: u8 = 0x0C;
const MSG_CONTINUATION: u8 = 0x10;
const MSG_SYMBOL_TABLE: u8 = 0x11;
const MSG_ATTRIBUTE_INFO: u8 = 0x15;

const FLAG_CONSTANT: u8 = 0x01;
const FLAG_SHARED: u8 = 0x02;
const FLAG_FAIL_IF_UNKNOWN_WRITE: u8 = 0x08;
const FLAG_FAIL_IF_UNKNOWN: u8 = 0x80;

/// Longest object, link or attribute name.
pub(crate) const MAX_NAME_LEN: usize = 0xFF00;
/// Deepest group nesting below the root.
pub(crate) const MAX_DEPTH: usize = 512;
const MAX_MESSAGE: usize = u16::MAX as usize;
const MAX_COMPACT: usize = MAX_MESSAGE - 4;
const MAX_CONTINUATIONS: usize = 4096;

/// Chunk B-tree nodes hold up to `2 * BTREE_K` children.
const BTREE_K: usize = 32;
const HEAP_MIN_SIZE: usize = 4096;
const HEAP_TARGET_SIZE: usize = 1 << 20;
const HEAP_MAX_OBJECTS: usize = u16::MAX as usize;

/// Finds the signature at offset 0 or at 512, 1024, 2048, ...
pub(crate) fn find_signature(data: &[u8]) -> Option<usize> {
    if data.len() >= 8 && data[..8] == SIGNATURE {
        return Some(0);
    }
    let mut offset = 512;
    while offset + 8 <= data.len() {
        if data[offset..offset + 8] == SIGNATURE {
            return Some(offset);
        }
        offset *= 2;
    }
    None
}

fn out_of_range(major: H5E_major_t, desc: String) -> Failure {
    Failure::new(major, H5E_minor_t::H5E_BADRANGE, desc)
}

fn cant_encode(desc: String) -> Failure {
    Failure::new(H5E_major_t::H5E_FILE, H5E_minor_t::H5E_CANTENCODE, desc)
}

fn unsupported(desc: impl Into<String>) -> Failure {
    Failure::new(H5E_major_t::H5E_FILE, H5E_minor_t::H5E_UNSUPPORTED, desc)
}

pub(crate) fn check_name(name: &str) -> Outcome<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(out_of_range(
            H5E_major_t::H5E_ARGS,
            format!("name of {} bytes exceeds the {MAX_NAME_LEN}-byte limit", name.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_depth(depth: usize) -> Outcome<()> {
    if depth > MAX_DEPTH {
        return Err(out_of_range(
            H5E_major_t::H5E_SYM,
            format!("objects cannot nest more than {MAX_DEPTH} groups deep"),
        ));
    }
    Ok(())
}

/// Byte length of `payload` in the file.
fn disk_len(payload: &Payload) -> Outcome<usize> {
    payload
        .space
        .element_count()?
        .checked_mul(payload.dtype.disk_size())
        .ok_or_else(|| Failure::nospace("storage too large"))
}

/// Attributes live in their object's header, so each must fit one header
/// message.
pub(crate) fn check_attribute(name: &str, payload: &Payload) -> Outcome<()> {
    check_name(name)?;
    let len = [
        9 + name.len() + 1,
        payload.dtype.encode()?.len(),
        payload.space.encode()?.len(),
        disk_len(payload)?,
    ]
    .iter()
    .try_fold(0usize, |acc, &n| acc.checked_add(n))
    .unwrap_or(usize::MAX);
    if len > MAX_MESSAGE {
        return Err(out_of_range(
            H5E_major_t::H5E_ATTR,
            format!("attribute {name:?} needs {len} bytes; an object header message holds {MAX_MESSAGE}"),
        ));
    }
    Ok(())
}

/// Compact raw data lives inside the layout message.
pub(crate) fn check_compact(payload: &Payload) -> Outcome<()> {
    let len = disk_len(payload)?;
    if len > MAX_COMPACT {
        return Err(out_of_range(
            H5E_major_t::H5E_DATASET,
            format!("compact storage holds at most {MAX_COMPACT} bytes, the dataset needs {len}"),
        ));
    }
    Ok(())
}

/// Chunk dimensions and chunk byte sizes are 32-bit in the file.
pub(crate) fn check_chunk(dtype: &TypeDesc, chunk: &[u64]) -> Outcome<()> {
    let bytes = chunk
        .iter()
        .try_fold(dtype.disk_size() as u64, |acc, &c| acc.checked_mul(c));
    match bytes {
        Some(bytes) if bytes <= u64::from(u32::MAX) => Ok(()),
        _ => Err(out_of_range(
            H5E_major_t::H5E_DATASET,
            format!("chunk {chunk:?} exceeds 4 GiB"),
        )),
    }
}

fn write_error(path: &Path, e: std::io::Error) -> Failure {
    Failure::new(
        H5E_major_t::H5E_IO,
        H5E_minor_t::H5E_WRITEERROR,
        format!("unable to write {}: {e}", path.display()),
    )
}

/// Writes the full image of `state` next to its path, then renames it into
/// place, so the previous file survives a failed write.
pub(crate) fn store(state: &FileState) -> Outcome<()> {
    let image = Writer::encode(state)?;
    let err = |e| write_error(&state.path, e);
    let dir = match state.path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(err)?;
    if let Ok(meta) = std::fs::metadata(&state.path) {
        temp.as_file().set_permissions(meta.permissions()).map_err(err)?;
    }
    temp.write_all(&image).map_err(err)?;
    temp.as_file().sync_all().map_err(err)?;
    temp.persist(&state.path).map_err(|e| err(e.error))?;
    Ok(())
}

/// Reads the image at `path` into a fresh file state.
pub(crate) fn load(path: &Path, writable: bool) -> Outcome<FileState> {
    let data = std::fs::read(path).map_err(|e| {
        Failure::new(
            H5E_major_t::H5E_IO,
            H5E_minor_t::H5E_READERROR,
            format!("unable to read {}: {e}", path.display()),
        )
    })?;
    if writable {
        std::fs::OpenOptions::new().append(true).open(path).map_err(|e| {
            Failure::new(
                H5E_major_t::H5E_IO,
                H5E_minor_t::H5E_CANTOPENFILE,
                format!("unable to open {} for writing: {e}", path.display()),
            )
        })?;
    }
    let offset = find_signature(&data).ok_or_else(|| decode_error("file signature not found"))?;
    let file = &data[offset..];
    let root = superblock(file)?;

    let mut reader = Reader::new(file, writable);
    let mut state = FileState::new(PathBuf::from(path), writable, offset);
    state.nodes.clear();
    reader.object(root, String::new(), None, &mut state.nodes, 0)?;
    if matches!(state.nodes.first(), Some(Node { kind: NodeKind::Dataset(_), .. })) {
        return Err(decode_error("root object is not a group"));
    }
    Ok(state)
}

/// Validates the superblock at the start of `file` and returns the root
/// group's header address.
fn superblock(file: &[u8]) -> Outcome<u64> {
    let version = *file
        .get(8)
        .ok_or_else(|| decode_error("truncated superblock"))?;
    match version {
        2 | 3 => {}
        0 | 1 => return Err(unsupported(format!("superblock version {version} is not supported"))),
        other => return Err(decode_error(format!("unknown superblock version {other}"))),
    }
    let sb = file
        .get(..SUPERBLOCK_SIZE)
        .ok_or_else(|| decode_error("truncated superblock"))?;
    if sb[9] != 8 || sb[10] != 8 {
        return Err(unsupported(format!(
            "{}-byte addresses and {}-byte lengths are not supported",
            sb[9], sb[10]
        )));
    }
    if lookup3(&sb[..44]) != LittleEndian::read_u32(&sb[44..48]) {
        return Err(decode_error("superblock checksum mismatch"));
    }
    let eof = LittleEndian::read_u64(&sb[28..36]);
    if eof > file.len() as u64 {
        return Err(decode_error(format!(
            "file is truncated: {} bytes of {eof}",
            file.len()
        )));
    }
    Ok(LittleEndian::read_u64(&sb[36..44]))
}

fn superblock_bytes(base: u64, eof: u64, root: u64) -> [u8; SUPERBLOCK_SIZE] {
    let mut sb = [0u8; SUPERBLOCK_SIZE];
    sb[..8].copy_from_slice(&SIGNATURE);
    sb[8] = SUPERBLOCK_VERSION;
    sb[9] = 8;
    sb[10] = 8;
    LittleEndian::write_u64(&mut sb[12..20], base);
    LittleEndian::write_u64(&mut sb[20..28], UNDEF);
    LittleEndian::write_u64(&mut sb[28..36], eof);
    LittleEndian::write_u64(&mut sb[36..44], root);
    let sum = lookup3(&sb[..44]);
    LittleEndian::write_u32(&mut sb[44..48], sum);
    sb
}

fn pad8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

/// Calls `f(chunk_index, dataset_index)` for every element of the chunk at
/// `origin` that lies inside `dims`.
fn chunk_elements(dims: &[u64], chunk: &[u64], origin: &[u64], mut f: impl FnMut(usize, usize)) {
    let dataset_strides = strides(dims);
    let chunk_strides = strides(chunk);
    let count: u64 = chunk.iter().product();
    'elements: for e in 0..count {
        let mut index = 0u64;
        for axis in 0..chunk.len() {
            let coord = origin[axis] + (e / chunk_strides[axis]) % chunk[axis];
            if coord >= dims[axis] {
                continue 'elements;
            }
            index += coord * dataset_strides[axis];
        }
        f(e as usize, index as usize);
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct HeapRef {
    len: u32,
    collection: u64,
    index: u16,
}

/// A dataset's data (`None`) or one of an object's attributes.
type PayloadKey<'a> = (NodeId, Option<&'a str>);

struct Writer<'a> {
    state: &'a FileState,
    base: usize,
    buf: Vec<u8>,
    refs: HashMap<PayloadKey<'a>, Vec<HeapRef>>,
}

#[derive(Default)]
struct HeaderBuilder {
    messages: Vec<(u8, u8, Vec<u8>)>,
}

impl HeaderBuilder {
    fn push(&mut self, kind: u8, flags: u8, data: Vec<u8>) {
        self.messages.push((kind, flags, data));
    }

    /// Serializes a version 2 object header with a single chunk.
    fn finish(self) -> Outcome<Vec<u8>> {
        let mut body = Vec::new();
        for (kind, flags, data) in self.messages {
            let size = u16::try_from(data.len()).map_err(|_| {
                cant_encode(format!(
                    "header message {kind:#04x} of {} bytes exceeds {MAX_MESSAGE}",
                    data.len()
                ))
            })?;
            body.push(kind);
            body.extend_from_slice(&size.to_le_bytes());
            body.push(flags);
            body.extend_from_slice(&data);
        }
        let (code, width) = match body.len() {
            0..=0xFF => (0u8, 1usize),
            0x100..=0xFFFF => (1, 2),
            0x1_0000..=0xFFFF_FFFF => (2, 4),
            _ => (3, 8),
        };
        let mut out = Vec::with_capacity(6 + width + body.len() + 4);
        out.extend_from_slice(b"OHDR");
        out.push(2);
        out.push(code);
        out.extend_from_slice(&(body.len() as u64).to_le_bytes()[..width]);
        out.extend_from_slice(&body);
        let sum = lookup3(&out);
        out.extend_from_slice(&sum.to_le_bytes());
        Ok(out)
    }
}

fn link_info() -> Vec<u8> {
    let mut out = vec![0u8, 0];
    out.extend_from_slice(&UNDEF.to_le_bytes());
    out.extend_from_slice(&UNDEF.to_le_bytes());
    out
}

fn link_message(name: &str, addr: u64) -> Outcome<Vec<u8>> {
    check_name(name)?;
    let len = name.len();
    let (code, width) = if len <= 0xFF { (0u8, 1usize) } else { (1, 2) };
    let utf8 = !name.is_ascii();
    let mut out = Vec::with_capacity(4 + width + len + 8);
    out.push(1);
    out.push(code | if utf8 { 0x10 } else { 0 });
    if utf8 {
        out.push(H5T_cset_t::H5T_CSET_UTF8 as u8);
    }
    out.extend_from_slice(&(len as u64).to_le_bytes()[..width]);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&addr.to_le_bytes());
    Ok(out)
}

/// Chunk B-tree key: stored bytes, filter mask, then the chunk's offset in
/// each dimension plus a trailing zero for the element dimension.
fn chunk_key(size: u32, offsets: &[u64]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 8 * (offsets.len() + 1));
    key.extend_from_slice(&size.to_le_bytes());
    key.extend_from_slice(&0u32.to_le_bytes());
    for &offset in offsets {
        key.extend_from_slice(&offset.to_le_bytes());
    }
    key.extend_from_slice(&0u64.to_le_bytes());
    key
}

/// Copies one element into its file form.
fn to_disk(desc: &TypeDesc, src: &[u8], dst: &mut [u8], refs: &[HeapRef]) -> Outcome<()> {
    match desc {
        TypeDesc::VarString { .. } => {
            let mut raw = [0u8; VL_SLOT];
            raw.copy_from_slice(&src[..VL_SLOT]);
            let slot = usize::from_ne_bytes(raw);
            if let Some(index) = slot.checked_sub(1) {
                let r = refs
                    .get(index)
                    .ok_or_else(|| cant_encode(format!("string slot {slot} has no stored bytes")))?;
                LittleEndian::write_u32(&mut dst[0..4], r.len);
                LittleEndian::write_u64(&mut dst[4..12], r.collection);
                LittleEndian::write_u32(&mut dst[12..16], u32::from(r.index));
            }
        }
        TypeDesc::Array { base, .. } if base.has_vlen() => {
            let (mem, disk) = (base.size(), base.disk_size());
            for (s, d) in src.chunks_exact(mem).zip(dst.chunks_exact_mut(disk)) {
                to_disk(base, s, d, refs)?;
            }
        }
        TypeDesc::Compound { members, .. } if desc.has_vlen() => {
            let mut growth = 0;
            for member in members {
                let (mem, disk) = (member.desc.size(), member.desc.disk_size());
                let at = member.offset + growth;
                to_disk(
                    &member.desc,
                    &src[member.offset..member.offset + mem],
                    &mut dst[at..at + disk],
                    refs,
                )?;
                growth += disk - mem;
            }
        }
        _ => dst[..desc.size()].copy_from_slice(&src[..desc.size()]),
    }
    Ok(())
}

impl<'a> Writer<'a> {
    fn encode(state: &'a FileState) -> Outcome<Vec<u8>> {
        let mut writer = Writer {
            state,
            base: state.userblock,
            buf: vec![0; state.userblock + SUPERBLOCK_SIZE],
            refs: HashMap::new(),
        };
        writer.write_heap()?;
        let root = writer.write_object(ROOT, 0)?;
        let sb = superblock_bytes(writer.base as u64, writer.addr(), root);
        writer.buf[writer.base..writer.base + SUPERBLOCK_SIZE].copy_from_slice(&sb);
        Ok(writer.buf)
    }

    fn addr(&self) -> u64 {
        (self.buf.len() - self.base) as u64
    }

    fn append(&mut self, bytes: &[u8]) -> u64 {
        let at = self.addr();
        self.buf.extend_from_slice(bytes);
        at
    }

    /// Places every variable-length string reachable from the root into
    /// global heap collections and records where each one went.
    fn write_heap(&mut self) -> Outcome<()> {
        let state = self.state;
        let mut payloads: Vec<(PayloadKey<'a>, &'a Payload)> = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = state.node(id)?;
            for (name, payload) in &node.attrs {
                if !payload.strings.is_empty() {
                    payloads.push(((id, Some(name.as_str())), payload));
                }
            }
            match &node.kind {
                NodeKind::Group { links } => stack.extend(links.values().copied()),
                NodeKind::Dataset(dataset) if !dataset.payload.strings.is_empty() => {
                    payloads.push(((id, None), &dataset.payload));
                }
                NodeKind::Dataset(_) => {}
            }
        }

        let mut pending: Vec<&'a [u8]> = Vec::new();
        let mut used = 16;
        for (key, payload) in payloads {
            let mut refs = Vec::with_capacity(payload.strings.len());
            for bytes in &payload.strings {
                let need = 16 + pad8(bytes.len());
                if !pending.is_empty()
                    && (pending.len() == HEAP_MAX_OBJECTS || used + need > HEAP_TARGET_SIZE)
                {
                    self.write_collection(&pending, used);
                    pending.clear();
                    used = 16;
                }
                pending.push(bytes);
                used += need;
                refs.push(HeapRef {
                    len: u32::try_from(bytes.len())
                        .map_err(|_| cant_encode(format!("{}-byte string", bytes.len())))?,
                    collection: self.addr(),
                    index: pending.len() as u16,
                });
            }
            self.refs.insert(key, refs);
        }
        if !pending.is_empty() {
            self.write_collection(&pending, used);
        }
        Ok(())
    }

    /// Writes one "GCOL" collection; object `i` gets index `i + 1` and the
    /// rest of the collection is a free-space object.
    fn write_collection(&mut self, objects: &[&[u8]], used: usize) {
        let size = (used + 16).max(HEAP_MIN_SIZE);
        let start = self.buf.len();
        self.buf.extend_from_slice(b"GCOL");
        self.buf.extend_from_slice(&[1, 0, 0, 0]);
        self.buf.extend_from_slice(&(size as u64).to_le_bytes());
        for (i, object) in objects.iter().enumerate() {
            self.buf.extend_from_slice(&(i as u16 + 1).to_le_bytes());
            self.buf.extend_from_slice(&0u16.to_le_bytes());
            self.buf.extend_from_slice(&0u32.to_le_bytes());
            self.buf.extend_from_slice(&(object.len() as u64).to_le_bytes());
            self.buf.extend_from_slice(object);
            self.buf.resize(self.buf.len() + pad8(object.len()) - object.len(), 0);
        }
        self.buf.extend_from_slice(&[0u8; 8]);
        self.buf.extend_from_slice(&((size - used) as u64).to_le_bytes());
        self.buf.resize(start + size, 0);
    }

    fn disk_bytes(&self, key: PayloadKey<'a>, payload: &'a Payload) -> Outcome<Cow<'a, [u8]>> {
        if !payload.dtype.has_vlen() {
            return Ok(Cow::Borrowed(payload.data.as_slice()));
        }
        let refs = self.refs.get(&key).map(Vec::as_slice).unwrap_or_default();
        let (mem, disk) = (payload.dtype.size(), payload.dtype.disk_size());
        let mut out = vec![0u8; disk_len(payload)?];
        for (src, dst) in payload.data.chunks_exact(mem).zip(out.chunks_exact_mut(disk)) {
            to_disk(&payload.dtype, src, dst, refs)?;
        }
        Ok(Cow::Owned(out))
    }

    fn write_object(&mut self, id: NodeId, depth: usize) -> Outcome<u64> {
        check_depth(depth)?;
        let state = self.state;
        let node = state.node(id)?;
        let mut header = HeaderBuilder::default();
        match &node.kind {
            NodeKind::Group { links } => {
                let mut children = Vec::with_capacity(links.len());
                for (name, &child) in links {
                    children.push((name, self.write_object(child, depth + 1)?));
                }
                header.push(MSG_LINK_INFO, 0, link_info());
                header.push(MSG_GROUP_INFO, 0, vec![0, 0]);
                for (name, addr) in children {
                    header.push(MSG_LINK, 0, link_message(name, addr)?);
                }
            }
            NodeKind::Dataset(dataset) => {
                let payload = &dataset.payload;
                let disk = self.disk_bytes((id, None), payload)?;
                let layout = self.write_layout(dataset, &disk)?;
                header.push(MSG_DATATYPE, FLAG_CONSTANT, payload.dtype.encode()?);
                header.push(MSG_DATASPACE, 0, payload.space.encode()?);
                // Late allocation, fill written only if set, no fill value.
                header.push(MSG_FILL_VALUE, FLAG_CONSTANT, vec![3, 0x0A]);
                header.push(MSG_LAYOUT, 0, layout);
            }
        }
        for (name, payload) in &node.attrs {
            header.push(MSG_ATTRIBUTE, 0, self.attribute_message(id, name, payload)?);
        }
        let bytes = header.finish()?;
        Ok(self.append(&bytes))
    }

    fn attribute_message(&self, id: NodeId, name: &'a str, payload: &'a Payload) -> Outcome<Vec<u8>> {
        check_name(name)?;
        let dtype = payload.dtype.encode()?;
        let space = payload.space.encode()?;
        let data = self.disk_bytes((id, Some(name)), payload)?;
        let size = |what: &str, len: usize| {
            u16::try_from(len).map_err(|_| cant_encode(format!("attribute {name:?}: {what} of {len} bytes")))
        };
        let mut out = Vec::with_capacity(9 + name.len() + 1 + dtype.len() + space.len() + data.len());
        out.extend_from_slice(&[3, 0]);
        out.extend_from_slice(&size("name", name.len() + 1)?.to_le_bytes());
        out.extend_from_slice(&size("datatype", dtype.len())?.to_le_bytes());
        out.extend_from_slice(&size("dataspace", space.len())?.to_le_bytes());
        out.push(if name.is_ascii() { 0 } else { H5T_cset_t::H5T_CSET_UTF8 as u8 });
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&dtype);
        out.extend_from_slice(&space);
        out.extend_from_slice(&data);
        Ok(out)
    }

    /// Writes a dataset's raw data and returns its version 3 layout message.
    fn write_layout(&mut self, dataset: &DatasetNode, disk: &[u8]) -> Outcome<Vec<u8>> {
        match dataset.layout {
            H5D_layout_t::H5D_COMPACT => {
                let size = u16::try_from(disk.len())
                    .ok()
                    .filter(|&n| usize::from(n) <= MAX_COMPACT)
                    .ok_or_else(|| cant_encode(format!("{} bytes of compact data", disk.len())))?;
                let mut out = vec![3, 0];
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(disk);
                Ok(out)
            }
            H5D_layout_t::H5D_CHUNKED => {
                let payload = &dataset.payload;
                let esize = payload.dtype.disk_size();
                let root = self.write_chunks(disk, payload.space.dims(), &dataset.chunk, esize)?;
                let rank = u8::try_from(dataset.chunk.len() + 1)
                    .map_err(|_| cant_encode(format!("chunk rank {}", dataset.chunk.len())))?;
                let mut out = vec![3, 2, rank];
                out.extend_from_slice(&root.to_le_bytes());
                for &c in dataset.chunk.iter().chain(std::iter::once(&(esize as u64))) {
                    let c = u32::try_from(c).map_err(|_| cant_encode(format!("chunk dimension {c}")))?;
                    out.extend_from_slice(&c.to_le_bytes());
                }
                Ok(out)
            }
            _ => {
                let addr = if disk.is_empty() { UNDEF } else { self.append(disk) };
                let mut out = vec![3, 1];
                out.extend_from_slice(&addr.to_le_bytes());
                out.extend_from_slice(&(disk.len() as u64).to_le_bytes());
                Ok(out)
            }
        }
    }

    /// Writes every chunk of the current extent, zero-padding edge chunks,
    /// and indexes them. Returns the B-tree root, or `UNDEF` when the extent
    /// is empty.
    fn write_chunks(&mut self, disk: &[u8], dims: &[u64], chunk: &[u64], esize: usize) -> Outcome<u64> {
        let grid: Vec<u64> = dims.iter().zip(chunk).map(|(&d, &c)| d.div_ceil(c)).collect();
        let nchunks: u64 = grid.iter().product();
        if nchunks == 0 {
            return Ok(UNDEF);
        }
        let chunk_bytes = chunk.iter().product::<u64>() as usize * esize;
        let stored = u32::try_from(chunk_bytes).map_err(|_| cant_encode(format!("{chunk_bytes}-byte chunk")))?;
        let grid_strides = strides(&grid);

        let mut entries = Vec::with_capacity(nchunks as usize);
        let mut origin = vec![0u64; dims.len()];
        for g in 0..nchunks {
            for axis in 0..dims.len() {
                origin[axis] = (g / grid_strides[axis]) % grid[axis] * chunk[axis];
            }
            let mut bytes = vec![0u8; chunk_bytes];
            chunk_elements(dims, chunk, &origin, |c, d| {
                bytes[c * esize..(c + 1) * esize].copy_from_slice(&disk[d * esize..(d + 1) * esize]);
            });
            let addr = self.append(&bytes);
            entries.push((chunk_key(stored, &origin), addr));
        }
        let bound: Vec<u64> = origin.iter().zip(chunk).map(|(&o, &c)| o + c).collect();
        self.write_btree(entries, chunk_key(0, &bound))
    }

    /// Builds a version 1 chunk B-tree over `entries` (in chunk order) one
    /// level at a time and returns the root address.
    fn write_btree(&mut self, mut entries: Vec<(Vec<u8>, u64)>, bound: Vec<u8>) -> Outcome<u64> {
        let key_size = bound.len();
        let fanout = 2 * BTREE_K;
        let node_size = 24 + fanout * (key_size + 8) + key_size;
        let mut level = 0u8;
        loop {
            let count = entries.len().div_ceil(fanout);
            let start = self.addr();
            let mut parents = Vec::with_capacity(count);
            for (i, children) in entries.chunks(fanout).enumerate() {
                let addr = start + (i * node_size) as u64;
                let left = if i == 0 { UNDEF } else { addr - node_size as u64 };
                let right = if i + 1 == count { UNDEF } else { addr + node_size as u64 };
                let mut node = Vec::with_capacity(node_size);
                node.extend_from_slice(b"TREE");
                node.push(1);
                node.push(level);
                node.extend_from_slice(&(children.len() as u16).to_le_bytes());
                node.extend_from_slice(&left.to_le_bytes());
                node.extend_from_slice(&right.to_le_bytes());
                for (key, child) in children {
                    node.extend_from_slice(key);
                    node.extend_from_slice(&child.to_le_bytes());
                }
                let last = entries.get((i + 1) * fanout).map_or(&bound, |(key, _)| key);
                node.extend_from_slice(last);
                node.resize(node_size, 0);
                self.buf.extend_from_slice(&node);
                parents.push((children[0].0.clone(), addr));
            }
            if let [(_, root)] = parents.as_slice() {
                return Ok(*root);
            }
            entries = parents;
            level = level
                .checked_add(1)
                .ok_or_else(|| cant_encode("chunk index too deep".to_owned()))?;
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct Message<'a> {
    kind: u8,
    flags: u8,
    data: &'a [u8],
}

struct ChunkEntry {
    size: u32,
    offsets: Vec<u64>,
    addr: u64,
}

struct Reader<'a> {
    data: &'a [u8],
    writable: bool,
    heaps: HashMap<u64, HashMap<u16, Range<usize>>>,
    visited: HashSet<u64>,
}

fn field<'a>(data: &'a [u8], at: usize, len: usize, what: &str) -> Outcome<&'a [u8]> {
    at.checked_add(len)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| decode_error(format!("truncated {what}")))
}

fn parse_link(data: &[u8]) -> Outcome<(String, u64)> {
    let head = field(data, 0, 2, "link message")?;
    if head[0] != 1 {
        return Err(decode_error(format!("unknown link message version {}", head[0])));
    }
    let flags = head[1];
    let mut pos = 2;
    if flags & 0x08 != 0 {
        let kind = field(data, pos, 1, "link message")?[0];
        if kind != 0 {
            return Err(unsupported(format!("link type {kind} (soft or external) is not supported")));
        }
        pos += 1;
    }
    if flags & 0x04 != 0 {
        pos += 8;
    }
    if flags & 0x10 != 0 {
        pos += 1;
    }
    let width = 1usize << (flags & 0x03);
    let len = LittleEndian::read_uint(field(data, pos, width, "link message")?, width) as usize;
    pos += width;
    let name = field(data, pos, len, "link name")?;
    let name = std::str::from_utf8(name).map_err(|_| decode_error("link name is not valid UTF-8"))?;
    if name.is_empty() || name == "." || name.contains('/') || name.len() > MAX_NAME_LEN {
        return Err(decode_error(format!("invalid link name {name:?}")));
    }
    pos += len;
    let addr = LittleEndian::read_u64(field(data, pos, 8, "link message")?);
    Ok((name.to_owned(), addr))
}

/// Link and attribute info messages: only compact storage (no fractal heap)
/// is supported.
fn check_compact_storage(data: &[u8], what: &str, order_width: usize) -> Outcome<()> {
    let head = field(data, 0, 2, what)?;
    let mut pos = 2;
    if head[1] & 0x01 != 0 {
        pos += order_width;
    }
    let heap = LittleEndian::read_u64(field(data, pos, 8, what)?);
    if heap != UNDEF {
        return Err(unsupported(format!("dense {what} storage is not supported")));
    }
    Ok(())
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], writable: bool) -> Self {
        Self {
            data,
            writable,
            heaps: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    fn at(&self, addr: u64, len: usize) -> Outcome<&'a [u8]> {
        usize::try_from(addr)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .and_then(|range| self.data.get(range))
            .ok_or_else(|| decode_error(format!("{len} bytes at address {addr:#x} lie past the end of the file")))
    }

    /// Collects the messages of the object header at `addr`, following
    /// continuation blocks.
    fn header(&self, addr: u64) -> Outcome<Vec<Message<'a>>> {
        let prefix = self.at(addr, 6)?;
        if &prefix[..4] != b"OHDR" {
            return Err(match prefix[0] {
                1 => unsupported("version 1 object headers are not supported"),
                _ => decode_error(format!("no object header at {addr:#x}")),
            });
        }
        if prefix[4] != 2 {
            return Err(decode_error(format!("unknown object header version {}", prefix[4])));
        }
        let flags = prefix[5];
        let mut pos = 6;
        if flags & 0x20 != 0 {
            pos += 16;
        }
        if flags & 0x10 != 0 {
            pos += 4;
        }
        let width = 1usize << (flags & 0x03);
        let chunk_size = LittleEndian::read_uint(&self.at(addr, pos + width)?[pos..], width);
        pos += width;
        let total = usize::try_from(chunk_size)
            .ok()
            .and_then(|size| size.checked_add(pos + 4))
            .ok_or_else(|| decode_error("object header size overflows"))?;
        let block = self.at(addr, total)?;
        verify_checksum(block, "object header")?;

        let track_order = flags & 0x04 != 0;
        let mut messages = Vec::new();
        parse_messages(&block[pos..total - 4], track_order, &mut messages)?;

        let mut seen = HashSet::new();
        let mut next = 0;
        while let Some(continuation) = messages[next..].iter().position(|m| m.kind == MSG_CONTINUATION) {
            let index = next + continuation;
            next = index + 1;
            let data = field(messages[index].data, 0, 16, "continuation message")?;
            let (caddr, clen) = (LittleEndian::read_u64(&data[..8]), LittleEndian::read_u64(&data[8..]));
            if !seen.insert(caddr) || seen.len() > MAX_CONTINUATIONS {
                return Err(decode_error("object header continuations loop"));
            }
            let clen = usize::try_from(clen)
                .ok()
                .filter(|&len| len >= 8)
                .ok_or_else(|| decode_error("invalid continuation block length"))?;
            let block = self.at(caddr, clen)?;
            if &block[..4] != b"OCHK" {
                return Err(decode_error(format!("no continuation block at {caddr:#x}")));
            }
            verify_checksum(block, "continuation block")?;
            parse_messages(&block[4..clen - 4], track_order, &mut messages)?;
        }
        Ok(messages)
    }

    fn object(
        &mut self,
        addr: u64,
        name: String,
        parent: Option<NodeId>,
        nodes: &mut Vec<Node>,
        depth: usize,
    ) -> Outcome<NodeId> {
        if depth > MAX_DEPTH {
            return Err(decode_error(format!("groups nest deeper than {MAX_DEPTH} levels")));
        }
        if !self.visited.insert(addr) {
            return Err(unsupported(format!("object at {addr:#x} is linked more than once")));
        }
        let messages = self.header(addr)?;
        let (mut dtype, mut space, mut layout) = (None, None, None);
        let mut links = Vec::new();
        let mut attrs = BTreeMap::new();
        for message in &messages {
            let data = message.data;
            match message.kind {
                MSG_NIL | MSG_CONTINUATION | MSG_FILL_VALUE | MSG_GROUP_INFO => {}
                MSG_DATATYPE if message.flags & FLAG_SHARED != 0 => {
                    return Err(unsupported("shared datatypes are not supported"));
                }
                MSG_DATATYPE => dtype = Some(TypeDesc::decode(data)?.0),
                MSG_DATASPACE => space = Some(SpaceDesc::decode(data)?),
                MSG_LAYOUT => layout = Some(data),
                MSG_LINK => links.push(parse_link(data)?),
                MSG_LINK_INFO => check_compact_storage(data, "link", 8)?,
                MSG_ATTRIBUTE_INFO => check_compact_storage(data, "attribute", 2)?,
                MSG_ATTRIBUTE => {
                    let (attr, payload) = self.attribute(data)?;
                    if attrs.insert(attr.clone(), payload).is_some() {
                        return Err(decode_error(format!("duplicate attribute {attr:?}")));
                    }
                }
                MSG_SYMBOL_TABLE => return Err(unsupported("symbol table groups are not supported")),
                MSG_FILTERS => return Err(unsupported("filtered datasets are not supported")),
                other => {
                    let refuse = FLAG_FAIL_IF_UNKNOWN
                        | if self.writable { FLAG_FAIL_IF_UNKNOWN_WRITE } else { 0 };
                    if message.flags & refuse != 0 {
                        return Err(unsupported(format!("header message {other:#04x} is not understood")));
                    }
                }
            }
        }

        let kind = match layout {
            Some(layout) => {
                if !links.is_empty() {
                    return Err(decode_error("dataset header carries links"));
                }
                let dtype = dtype.ok_or_else(|| decode_error("dataset has no datatype"))?;
                let space = space.ok_or_else(|| decode_error("dataset has no dataspace"))?;
                NodeKind::Dataset(self.dataset(dtype, space, layout)?)
            }
            None => NodeKind::Group { links: BTreeMap::new() },
        };
        let id = nodes.len();
        nodes.push(Node { name, parent, kind, attrs });

        for (link, child_addr) in links {
            let child = self.object(child_addr, link.clone(), Some(id), nodes, depth + 1)?;
            if let NodeKind::Group { links } = &mut nodes[id].kind {
                if links.insert(link.clone(), child).is_some() {
                    return Err(decode_error(format!("duplicate link {link:?}")));
                }
            }
        }
        Ok(id)
    }

    fn attribute(&mut self, data: &'a [u8]) -> Outcome<(String, Payload)> {
        let head = field(data, 0, 8, "attribute message")?;
        let version = head[0];
        if !(1..=3).contains(&version) {
            return Err(decode_error(format!("unknown attribute message version {version}")));
        }
        if version > 1 && head[1] & 0x03 != 0 {
            return Err(unsupported("shared attribute datatypes are not supported"));
        }
        let name_len = LittleEndian::read_u16(&head[2..4]) as usize;
        let dtype_len = LittleEndian::read_u16(&head[4..6]) as usize;
        let space_len = LittleEndian::read_u16(&head[6..8]) as usize;
        let padded = |len: usize| if version == 1 { pad8(len) } else { len };
        let mut pos = if version == 3 { 9 } else { 8 };

        let raw = field(data, pos, name_len, "attribute name")?;
        let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
        let name = std::str::from_utf8(raw)
            .map_err(|_| decode_error("attribute name is not valid UTF-8"))?
            .to_owned();
        pos += padded(name_len);
        let (dtype, _) = TypeDesc::decode(field(data, pos, dtype_len, "attribute datatype")?)?;
        pos += padded(dtype_len);
        let space = SpaceDesc::decode(field(data, pos, space_len, "attribute dataspace")?)?;
        pos += padded(space_len);
        let raw = data.get(pos..).unwrap_or_default();
        Ok((name, self.payload(dtype, space, raw)?))
    }

    /// Converts file-form elements into a payload.
    fn payload(&mut self, dtype: TypeDesc, space: SpaceDesc, disk: &[u8]) -> Outcome<Payload> {
        let count = space.element_count().map_err(|f| decode_error(f.desc))?;
        let (mem, esize) = (dtype.size(), dtype.disk_size());
        let need = count
            .checked_mul(esize)
            .ok_or_else(|| decode_error("raw data size overflows"))?;
        let disk = disk.get(..need).ok_or_else(|| {
            decode_error(format!("raw data holds {} bytes, its type and extent need {need}", disk.len()))
        })?;
        let mut payload = Payload::new(dtype, space)?;
        if !payload.dtype.has_vlen() {
            payload.data.copy_from_slice(disk);
            return Ok(payload);
        }
        let Payload { dtype, data, strings, .. } = &mut payload;
        for (src, dst) in disk.chunks_exact(esize).zip(data.chunks_exact_mut(mem)) {
            self.from_disk(dtype, src, dst, strings)?;
        }
        Ok(payload)
    }

    fn from_disk(&mut self, desc: &TypeDesc, src: &[u8], dst: &mut [u8], strings: &mut Vec<Vec<u8>>) -> Outcome<()> {
        match desc {
            TypeDesc::VarString { cset } => {
                let len = LittleEndian::read_u32(&src[0..4]) as usize;
                let collection = LittleEndian::read_u64(&src[4..12]);
                let index = LittleEndian::read_u32(&src[12..16]);
                let slot = if collection == 0 || collection == UNDEF {
                    if len != 0 {
                        return Err(decode_error("variable-length string has no heap object"));
                    }
                    0
                } else {
                    let object = self.heap_object(collection, index)?;
                    let text = object
                        .get(..len)
                        .ok_or_else(|| decode_error("string is longer than its heap object"))?;
                    if *cset == H5T_cset_t::H5T_CSET_UTF8 && std::str::from_utf8(text).is_err() {
                        return Err(decode_error("stored string is not valid UTF-8"));
                    }
                    strings.push(text.to_vec());
                    strings.len()
                };
                dst[..VL_SLOT].copy_from_slice(&slot.to_ne_bytes());
            }
            TypeDesc::Array { base, .. } if base.has_vlen() => {
                let (mem, disk) = (base.size(), base.disk_size());
                for (s, d) in src.chunks_exact(disk).zip(dst.chunks_exact_mut(mem)) {
                    self.from_disk(base, s, d, strings)?;
                }
            }
            TypeDesc::Compound { members, .. } if desc.has_vlen() => {
                let mut growth = 0;
                for member in members {
                    let (mem, disk) = (member.desc.size(), member.desc.disk_size());
                    let at = member.offset + growth;
                    self.from_disk(
                        &member.desc,
                        &src[at..at + disk],
                        &mut dst[member.offset..member.offset + mem],
                        strings,
                    )?;
                    growth += disk - mem;
                }
            }
            _ => dst[..desc.size()].copy_from_slice(&src[..desc.size()]),
        }
        Ok(())
    }

    fn heap_object(&mut self, collection: u64, index: u32) -> Outcome<&'a [u8]> {
        if !self.heaps.contains_key(&collection) {
            let objects = self.collection(collection)?;
            self.heaps.insert(collection, objects);
        }
        let range = u16::try_from(index)
            .ok()
            .and_then(|index| self.heaps.get(&collection)?.get(&index))
            .cloned()
            .ok_or_else(|| decode_error(format!("heap object {index} missing from collection {collection:#x}")))?;
        let data: &'a [u8] = self.data;
        Ok(&data[range])
    }

    /// Indexes the objects of the global heap collection at `addr`.
    fn collection(&self, addr: u64) -> Outcome<HashMap<u16, Range<usize>>> {
        let head = self.at(addr, 16)?;
        if &head[..4] != b"GCOL" || head[4] != 1 {
            return Err(decode_error(format!("no global heap collection at {addr:#x}")));
        }
        let size = usize::try_from(LittleEndian::read_u64(&head[8..16]))
            .map_err(|_| decode_error("global heap collection size overflows"))?;
        let body = self.at(addr, size)?;
        let start = addr as usize;
        let mut objects = HashMap::new();
        let mut pos = 16;
        while pos + 16 <= size {
            let index = LittleEndian::read_u16(&body[pos..pos + 2]);
            if index == 0 {
                break;
            }
            let len = usize::try_from(LittleEndian::read_u64(&body[pos + 8..pos + 16]))
                .ok()
                .filter(|&len| len <= size - pos - 16)
                .ok_or_else(|| decode_error(format!("heap object {index} overruns its collection")))?;
            let data = start + pos + 16;
            objects.insert(index, data..data + len);
            pos += 16 + pad8(len);
        }
        Ok(objects)
    }

    fn dataset(&mut self, dtype: TypeDesc, space: SpaceDesc, layout: &'a [u8]) -> Outcome<DatasetNode> {
        let head = field(layout, 0, 2, "layout message")?;
        let version = head[0];
        if !(3..=4).contains(&version) {
            return Err(unsupported(format!("layout message version {version} is not supported")));
        }
        match head[1] {
            0 => {
                let size = LittleEndian::read_u16(field(layout, 2, 2, "layout message")?) as usize;
                let raw = field(layout, 4, size, "compact data")?;
                Ok(DatasetNode {
                    payload: self.payload(dtype, space, raw)?,
                    layout: H5D_layout_t::H5D_COMPACT,
                    chunk: Vec::new(),
                })
            }
            1 => {
                let fields = field(layout, 2, 16, "layout message")?;
                let addr = LittleEndian::read_u64(&fields[..8]);
                let need = space
                    .element_count()
                    .ok()
                    .and_then(|count| count.checked_mul(dtype.disk_size()))
                    .ok_or_else(|| decode_error("dataset size overflows"))?;
                let raw = match (need, addr) {
                    (0, _) => &[][..],
                    (_, UNDEF) => return Err(unsupported("datasets without allocated storage are not supported")),
                    (need, addr) => self.at(addr, need)?,
                };
                Ok(DatasetNode {
                    payload: self.payload(dtype, space, raw)?,
                    layout: H5D_layout_t::H5D_CONTIGUOUS,
                    chunk: Vec::new(),
                })
            }
            2 if version == 3 => {
                let ndims = field(layout, 2, 1, "layout message")?[0] as usize;
                let rank = space.rank();
                if rank == 0 || ndims != rank + 1 {
                    return Err(decode_error(format!("chunk rank {ndims} does not fit dataspace rank {rank}")));
                }
                let root = LittleEndian::read_u64(field(layout, 3, 8, "layout message")?);
                let dims = field(layout, 11, ndims * 4, "chunk dimensions")?;
                let mut chunk: Vec<u64> = dims.chunks_exact(4).map(|d| LittleEndian::read_u32(d) as u64).collect();
                let esize = chunk.pop().unwrap_or_default();
                if esize != dtype.disk_size() as u64 || chunk.contains(&0) {
                    return Err(decode_error("invalid chunk dimensions"));
                }
                let disk = self.chunks(root, space.dims(), &chunk, dtype.disk_size())?;
                Ok(DatasetNode {
                    payload: self.payload(dtype, space, &disk)?,
                    layout: H5D_layout_t::H5D_CHUNKED,
                    chunk,
                })
            }
            2 => Err(unsupported("version 4 chunk indexes are not supported")),
            other => Err(unsupported(format!("storage layout class {other} is not supported"))),
        }
    }

    /// Assembles a chunked dataset's raw data; every chunk of the extent
    /// must be present exactly once.
    fn chunks(&self, root: u64, dims: &[u64], chunk: &[u64], esize: usize) -> Outcome<Vec<u8>> {
        let overflow = || decode_error("chunked dataset size overflows");
        let total = dims
            .iter()
            .try_fold(esize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))
            .ok_or_else(overflow)?;
        let grid: Vec<u64> = dims.iter().zip(chunk).map(|(&d, &c)| d.div_ceil(c)).collect();
        let expected = grid.iter().try_fold(1u64, |acc, &g| acc.checked_mul(g)).ok_or_else(overflow)?;
        if expected == 0 {
            return Ok(Vec::new());
        }
        if root == UNDEF {
            return Err(unsupported("datasets without allocated chunks are not supported"));
        }
        let chunk_bytes = chunk
            .iter()
            .try_fold(esize, |acc, &c| acc.checked_mul(usize::try_from(c).ok()?))
            .ok_or_else(overflow)?;

        let mut entries = Vec::new();
        let mut nodes = HashSet::new();
        self.btree(root, None, dims.len(), expected, &mut entries, &mut nodes)?;
        if entries.len() as u64 != expected {
            return Err(unsupported(format!(
                "dataset stores {} of its {expected} chunks; unallocated chunks are not supported",
                entries.len()
            )));
        }
        // Disjoint chunks keep the assembled size within the file's size.
        let mut spans: Vec<u64> = entries.iter().map(|e| e.addr).collect();
        spans.sort_unstable();
        if spans.windows(2).any(|w| w[1] - w[0] < chunk_bytes as u64) {
            return Err(decode_error("stored chunks overlap"));
        }

        let mut stored = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for entry in entries {
            if entry.size as usize != chunk_bytes {
                return Err(decode_error(format!(
                    "chunk at {:?} stores {} bytes, expected {chunk_bytes}",
                    entry.offsets, entry.size
                )));
            }
            let aligned = entry
                .offsets
                .iter()
                .zip(dims.iter().zip(chunk))
                .all(|(&o, (&d, &c))| o % c == 0 && o < d);
            if !aligned || !seen.insert(entry.offsets.clone()) {
                return Err(decode_error(format!("invalid chunk offset {:?}", entry.offsets)));
            }
            stored.push((self.at(entry.addr, chunk_bytes)?, entry.offsets));
        }

        let mut out = vec![0u8; total];
        for (raw, offsets) in stored {
            chunk_elements(dims, chunk, &offsets, |c, d| {
                out[d * esize..(d + 1) * esize].copy_from_slice(&raw[c * esize..(c + 1) * esize]);
            });
        }
        Ok(out)
    }

    fn btree(
        &self,
        addr: u64,
        level: Option<u8>,
        rank: usize,
        limit: u64,
        out: &mut Vec<ChunkEntry>,
        nodes: &mut HashSet<u64>,
    ) -> Outcome<()> {
        if !nodes.insert(addr) {
            return Err(decode_error("chunk index revisits a node"));
        }
        let head = self.at(addr, 24)?;
        if &head[..4] != b"TREE" || head[4] != 1 {
            return Err(decode_error(format!("no chunk index node at {addr:#x}")));
        }
        let node_level = head[5];
        if level.is_some_and(|l| l != node_level) {
            return Err(decode_error("chunk index levels are inconsistent"));
        }
        let used = LittleEndian::read_u16(&head[6..8]) as usize;
        let key_size = 8 + 8 * (rank + 1);
        let body = self.at(addr, 24 + used * (key_size + 8))?;
        for i in 0..used {
            let key = &body[24 + i * (key_size + 8)..];
            let child = LittleEndian::read_u64(&key[key_size..key_size + 8]);
            if node_level == 0 {
                if LittleEndian::read_u32(&key[4..8]) != 0 {
                    return Err(unsupported("filtered chunks are not supported"));
                }
                out.push(ChunkEntry {
                    size: LittleEndian::read_u32(&key[0..4]),
                    offsets: (0..rank).map(|a| LittleEndian::read_u64(&key[8 + a * 8..])).collect(),
                    addr: child,
                });
                if out.len() as u64 > limit {
                    return Err(decode_error("chunk index holds more chunks than the extent"));
                }
            } else {
                self.btree(child, Some(node_level - 1), rank, limit, out, nodes)?;
            }
        }
        Ok(())
    }
}

fn verify_checksum(block: &[u8], what: &str) -> Outcome<()> {
    let split = block.len() - 4;
    if lookup3(&block[..split]) != LittleEndian::read_u32(&block[split..]) {
        return Err(decode_error(format!("{what} checksum mismatch")));
    }
    Ok(())
}

fn parse_messages<'a>(mut rest: &'a [u8], track_order: bool, out: &mut Vec<Message<'a>>) -> Outcome<()> {
    let prefix = if track_order { 6 } else { 4 };
    while rest.len() >= prefix {
        let kind = rest[0];
        let size = LittleEndian::read_u16(&rest[1..3]) as usize;
        let flags = rest[3];
        let data = rest
            .get(prefix..prefix + size)
            .ok_or_else(|| decode_error(format!("header message {kind:#04x} overruns its block")))?;
        out.push(Message { kind, flags, data });
        rest = &rest[prefix + size..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dtype::Member;

    fn group() -> NodeKind {
        NodeKind::Group { links: BTreeMap::new() }
    }

    fn dataset(payload: Payload, layout: H5D_layout_t, chunk: Vec<u64>) -> NodeKind {
        NodeKind::Dataset(DatasetNode { payload, layout, chunk })
    }

    fn ints(dims: Vec<u64>, maxdims: Option<Vec<u64>>) -> Payload {
        let space = SpaceDesc::simple(dims, maxdims).unwrap();
        let mut payload = Payload::new(TypeDesc::Integer { size: 4, signed: true }, space).unwrap();
        let count = payload.data.len() / 4;
        payload.data = (0..count as i32).flat_map(|v| v.to_ne_bytes()).collect();
        payload
    }

    fn title(text: &str) -> Payload {
        let mut attr = Payload::new(
            TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_UTF8 },
            SpaceDesc::Scalar,
        )
        .unwrap();
        attr.data = 1usize.to_ne_bytes().to_vec();
        attr.strings = vec![text.as_bytes().to_vec()];
        attr
    }

    fn sample(path: PathBuf, userblock: usize) -> FileState {
        let mut state = FileState::new(path, true, userblock);
        let g = state.insert(ROOT, "g", group()).unwrap();
        state
            .insert(g, "d", dataset(ints(vec![3], Some(vec![u64::MAX])), H5D_layout_t::H5D_CHUNKED, vec![2]))
            .unwrap();
        state
            .insert(ROOT, "flat", dataset(ints(vec![4, 2], None), H5D_layout_t::H5D_CONTIGUOUS, Vec::new()))
            .unwrap();
        state
            .insert(ROOT, "small", dataset(ints(vec![2], None), H5D_layout_t::H5D_COMPACT, Vec::new()))
            .unwrap();
        state.node_mut(ROOT).unwrap().attrs.insert("title".into(), title("héllo"));
        state
    }

    fn reload(state: &FileState) -> FileState {
        store(state).unwrap();
        load(&state.path, false).unwrap()
    }

    fn same_dataset(a: &FileState, b: &FileState, path: &str) {
        let left = a.dataset(a.resolve(ROOT, path).unwrap()).unwrap();
        let right = b.dataset(b.resolve(ROOT, path).unwrap()).unwrap();
        assert_eq!(left, right, "{path}");
    }

    #[test]
    fn signature_offsets() {
        let mut data = vec![0u8; 1024];
        data[512..520].copy_from_slice(&SIGNATURE);
        assert_eq!(find_signature(&data), Some(512));
        assert_eq!(find_signature(&[0u8; 100]), None);
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample(dir.path().join("image.h5"), 0);
        let loaded = reload(&state);
        assert!(!loaded.writable);
        for path in ["/g/d", "/flat", "/small"] {
            same_dataset(&state, &loaded, path);
        }
        let d = loaded.resolve(ROOT, "/g/d").unwrap();
        assert_eq!(loaded.path_of(d), "/g/d");
        assert_eq!(loaded.node(ROOT).unwrap().attrs["title"], title("héllo"));
    }

    #[test]
    fn superblock_is_hdf5() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample(dir.path().join("sb.h5"), 0);
        store(&state).unwrap();
        let bytes = std::fs::read(&state.path).unwrap();
        assert_eq!(&bytes[..8], b"\x89HDF\r\n\x1a\n");
        assert_eq!(bytes[8], 2);
        assert_eq!(lookup3(&bytes[..44]), LittleEndian::read_u32(&bytes[44..48]));
        assert_eq!(LittleEndian::read_u64(&bytes[28..36]), bytes.len() as u64);
        let root = LittleEndian::read_u64(&bytes[36..44]) as usize;
        assert_eq!(&bytes[root..root + 4], b"OHDR");
    }

    #[test]
    fn userblock_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample(dir.path().join("ub.h5"), 512);
        store(&state).unwrap();
        let bytes = std::fs::read(&state.path).unwrap();
        assert!(bytes[..512].iter().all(|&b| b == 0));
        assert_eq!(&bytes[512..520], &SIGNATURE);
        let loaded = load(&state.path, true).unwrap();
        assert_eq!(loaded.userblock, 512);
        same_dataset(&state, &loaded, "/g/d");
    }

    #[test]
    fn store_replaces_the_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = sample(dir.path().join("swap.h5"), 0);
        store(&state).unwrap();
        state.insert(ROOT, "later", group()).unwrap();
        store(&state).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, ["swap.h5"]);
        assert!(load(&state.path, false).unwrap().lookup(ROOT, "later").is_some());
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.h5");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load(&path, false).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }

    #[test]
    fn corrupted_header_fails_its_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample(dir.path().join("flip.h5"), 0);
        store(&state).unwrap();
        let mut bytes = std::fs::read(&state.path).unwrap();
        let root = LittleEndian::read_u64(&bytes[36..44]) as usize;
        bytes[root + 8] ^= 0xFF;
        std::fs::write(&state.path, &bytes).unwrap();
        let err = load(&state.path, false).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }

    #[test]
    fn many_chunks_build_a_deeper_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::new(dir.path().join("tree.h5"), true, 0);
        // 300 one-row chunks need two index levels; the 5x3 extent with
        // 2x2 chunks leaves partial edge chunks.
        state
            .insert(ROOT, "rows", dataset(ints(vec![300, 2], None), H5D_layout_t::H5D_CHUNKED, vec![1, 2]))
            .unwrap();
        state
            .insert(ROOT, "edges", dataset(ints(vec![5, 3], None), H5D_layout_t::H5D_CHUNKED, vec![2, 2]))
            .unwrap();
        state
            .insert(ROOT, "empty", dataset(ints(vec![0, 4], Some(vec![u64::MAX, 4])), H5D_layout_t::H5D_CHUNKED, vec![8, 4]))
            .unwrap();
        let loaded = reload(&state);
        for path in ["/rows", "/edges", "/empty"] {
            same_dataset(&state, &loaded, path);
        }
    }

    #[test]
    fn strings_go_through_the_global_heap() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::new(dir.path().join("vlen.h5"), true, 0);
        let name = TypeDesc::VarString { cset: H5T_cset_t::H5T_CSET_UTF8 };
        let ty = TypeDesc::Compound {
            size: 16,
            members: vec![
                Member { name: "name".into(), offset: 0, desc: name },
                Member { name: "n".into(), offset: 8, desc: TypeDesc::Integer { size: 4, signed: true } },
            ],
        };
        let mut payload = Payload::new(ty, SpaceDesc::simple(vec![3], None).unwrap()).unwrap();
        // Slots: "alpha", null, "" with n = 10, 20, 30.
        for (i, (slot, n)) in [(1usize, 10i32), (0, 20), (2, 30)].into_iter().enumerate() {
            payload.data[i * 16..i * 16 + 8].copy_from_slice(&slot.to_ne_bytes());
            payload.data[i * 16 + 8..i * 16 + 12].copy_from_slice(&n.to_ne_bytes());
        }
        payload.strings = vec![b"alpha".to_vec(), Vec::new()];
        state.insert(ROOT, "people", dataset(payload, H5D_layout_t::H5D_CONTIGUOUS, Vec::new())).unwrap();

        let loaded = reload(&state);
        same_dataset(&state, &loaded, "/people");
        let bytes = std::fs::read(&state.path).unwrap();
        assert_eq!(&bytes[SUPERBLOCK_SIZE..SUPERBLOCK_SIZE + 4], b"GCOL");
    }

    #[test]
    fn long_names_are_out_of_range() {
        let name = "n".repeat(MAX_NAME_LEN + 1);
        assert_eq!(check_name(&name).unwrap_err().minor, H5E_minor_t::H5E_BADRANGE);
        check_name(&"n".repeat(MAX_NAME_LEN)).unwrap();
        let mut state = FileState::new(PathBuf::from("long.h5"), true, 0);
        let err = state.insert(ROOT, &name, group()).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_BADRANGE);
    }

    #[test]
    fn oversized_attributes_and_compact_data_are_refused() {
        let big = ints(vec![20_000], None);
        assert_eq!(check_attribute("a", &big).unwrap_err().minor, H5E_minor_t::H5E_BADRANGE);
        assert_eq!(check_compact(&big).unwrap_err().minor, H5E_minor_t::H5E_BADRANGE);
        check_attribute("a", &ints(vec![100], None)).unwrap();
        assert!(check_chunk(&TypeDesc::Integer { size: 8, signed: false }, &[1 << 20, 1 << 10]).is_err());
    }

    #[test]
    fn corrupt_lengths_are_decode_errors() {
        let reader = Reader::new(&[], false);
        let mut heap = b"GCOL\x01\0\0\0".to_vec();
        heap.extend_from_slice(&u64::MAX.to_le_bytes());
        let mut heap_reader = Reader::new(&heap, false);
        assert_eq!(heap_reader.collection(0).unwrap_err().minor, H5E_minor_t::H5E_CANTDECODE);
        assert_eq!(heap_reader.heap_object(0, 1).unwrap_err().minor, H5E_minor_t::H5E_CANTDECODE);
        assert_eq!(reader.at(u64::MAX, 16).unwrap_err().minor, H5E_minor_t::H5E_CANTDECODE);

        // An extent far larger than the bytes behind it.
        let mut reader = Reader::new(&[], false);
        let space = SpaceDesc::simple(vec![1 << 40, 1 << 40], None).unwrap();
        let err = reader.payload(TypeDesc::Integer { size: 4, signed: true }, space, &[0; 64]).unwrap_err();
        assert_eq!(err.minor, H5E_minor_t::H5E_CANTDECODE);
    }
}
