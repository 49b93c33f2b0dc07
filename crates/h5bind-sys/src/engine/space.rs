//! Dataspace descriptions and their on-disk encoding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Failure, Outcome};
use crate::h5e::{H5E_major_t, H5E_minor_t};
use crate::h5s::H5S_UNLIMITED;

const VERSION: u8 = 2;
const MAX_RANK: usize = crate::h5s::H5S_MAX_RANK as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SpaceDesc {
    Null,
    Scalar,
    /// `maxdims` always has the same rank as `dims`; `H5S_UNLIMITED` marks
    /// an unbounded axis.
    Simple { dims: Vec<u64>, maxdims: Vec<u64> },
}

impl SpaceDesc {
    /// Builds a simple extent, checking that every current size fits its
    /// maximum.
    pub(crate) fn simple(dims: Vec<u64>, maxdims: Option<Vec<u64>>) -> Outcome<Self> {
        let maxdims = maxdims.unwrap_or_else(|| dims.clone());
        if maxdims.len() != dims.len() {
            return Err(Failure::args("maximum dimensions have a different rank"));
        }
        if let Some((axis, (d, m))) = dims
            .iter()
            .zip(&maxdims)
            .enumerate()
            .find(|(_, (d, m))| **m != H5S_UNLIMITED && d > m)
        {
            return Err(Failure::new(
                H5E_major_t::H5E_DATASPACE,
                H5E_minor_t::H5E_BADRANGE,
                format!("axis {axis}: current size {d} exceeds maximum {m}"),
            ));
        }
        Ok(SpaceDesc::Simple { dims, maxdims })
    }

    pub(crate) fn rank(&self) -> usize {
        match self {
            SpaceDesc::Simple { dims, .. } => dims.len(),
            _ => 0,
        }
    }

    pub(crate) fn dims(&self) -> &[u64] {
        match self {
            SpaceDesc::Simple { dims, .. } => dims,
            _ => &[],
        }
    }

    pub(crate) fn maxdims(&self) -> &[u64] {
        match self {
            SpaceDesc::Simple { maxdims, .. } => maxdims,
            _ => &[],
        }
    }

    /// Element count: 0 for null, 1 for scalar.
    pub(crate) fn npoints(&self) -> u64 {
        match self {
            SpaceDesc::Null => 0,
            SpaceDesc::Scalar => 1,
            SpaceDesc::Simple { dims, .. } => dims.iter().product(),
        }
    }

    /// Element count as a buffer length, rejecting counts that overflow
    /// memory sizes.
    pub(crate) fn element_count(&self) -> Outcome<usize> {
        let mut total: usize = 1;
        for &d in self.dims() {
            let d = usize::try_from(d).map_err(|_| Failure::nospace("extent too large"))?;
            total = total
                .checked_mul(d)
                .ok_or_else(|| Failure::nospace("extent too large"))?;
        }
        Ok(match self {
            SpaceDesc::Null => 0,
            _ => total,
        })
    }

    /// Encodes a version 2 dataspace message.
    pub(crate) fn encode(&self) -> Outcome<Vec<u8>> {
        let (kind, rank) = match self {
            SpaceDesc::Scalar => (0u8, 0usize),
            SpaceDesc::Simple { dims, .. } => (1, dims.len()),
            SpaceDesc::Null => (2, 0),
        };
        let rank = u8::try_from(rank)
            .ok()
            .filter(|&r| usize::from(r) <= MAX_RANK)
            .ok_or_else(|| Failure::args(format!("rank {rank} exceeds {MAX_RANK}")))?;
        let mut out = Vec::with_capacity(4 + 16 * usize::from(rank));
        out.push(VERSION);
        out.push(rank);
        out.push(if rank > 0 { 0x01 } else { 0x00 });
        out.push(kind);
        for &d in self.dims() {
            out.write_u64::<LittleEndian>(d).map_err(|e| Failure::args(e.to_string()))?;
        }
        for &m in self.maxdims() {
            out.write_u64::<LittleEndian>(m).map_err(|e| Failure::args(e.to_string()))?;
        }
        Ok(out)
    }

    /// Decodes a version 1 or 2 dataspace message.
    pub(crate) fn decode(mut input: &[u8]) -> Outcome<Self> {
        let io = |_| decode_error("truncated dataspace");
        let version = input.read_u8().map_err(io)?;
        let rank = input.read_u8().map_err(io)? as usize;
        let flags = input.read_u8().map_err(io)?;
        if rank > MAX_RANK {
            return Err(decode_error(format!("dataspace rank {rank} exceeds {MAX_RANK}")));
        }
        let kind = match version {
            1 => {
                input.read_u8().map_err(io)?;
                input.read_u32::<LittleEndian>().map_err(io)?;
                if rank == 0 { 0 } else { 1 }
            }
            2 => input.read_u8().map_err(io)?,
            other => return Err(decode_error(format!("unsupported dataspace version {other}"))),
        };
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(input.read_u64::<LittleEndian>().map_err(io)?);
        }
        let maxdims = if flags & 0x01 != 0 {
            let mut max = Vec::with_capacity(rank);
            for _ in 0..rank {
                max.push(input.read_u64::<LittleEndian>().map_err(io)?);
            }
            max
        } else {
            dims.clone()
        };
        match kind {
            0 => Ok(SpaceDesc::Scalar),
            1 => SpaceDesc::simple(dims, Some(maxdims)).map_err(|f| decode_error(f.desc)),
            2 => Ok(SpaceDesc::Null),
            other => Err(decode_error(format!("invalid dataspace type {other}"))),
        }
    }
}

pub(crate) fn decode_error(desc: impl Into<String>) -> Failure {
    Failure::new(H5E_major_t::H5E_FILE, H5E_minor_t::H5E_CANTDECODE, desc)
}

/// Row-major strides (in elements) of an extent.
pub(crate) fn strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}
