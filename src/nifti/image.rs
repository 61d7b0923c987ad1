//! Decoded NIfTI volume with on-demand voxel access.

use super::header::{DataType, NiftiHeader};
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use half::{bf16, f16};
use ndarray::{Array2, ArrayD};

/// A NIfTI image: header plus the raw voxel payload in file byte order.
///
/// Voxels are stored Fortran-order (x fastest) exactly as on disk and are
/// decoded to `f64` only when a slice is requested.
#[derive(Debug, Clone)]
pub struct NiftiImage {
    header: NiftiHeader,
    data: Vec<u8>,
}

impl NiftiImage {
    /// Build an image from a decompressed file buffer.
    ///
    /// `bytes` must hold at least `vox_offset + data_size` bytes; anything
    /// past the payload is dropped.
    pub fn from_file_bytes(header: NiftiHeader, mut bytes: Vec<u8>) -> Result<Self> {
        let expected = header.file_size()?;
        let data_size = header.data_size();
        let offset = expected - data_size;
        if bytes.len() < expected {
            return Err(Error::InvalidFileFormat(format!(
                "file truncated: {} bytes, header declares {} (offset {} + data {})",
                bytes.len(),
                expected,
                offset,
                data_size
            )));
        }
        bytes.truncate(expected);
        bytes.drain(..offset);
        Ok(Self {
            header,
            data: bytes,
        })
    }

    /// Build a float32 image from an array, using the given affine as sform.
    pub fn from_array(data: ArrayD<f32>, affine: [[f64; 4]; 4]) -> Self {
        let shape = data.shape();
        let mut header = NiftiHeader {
            ndim: shape.len() as u8,
            datatype: DataType::Float32,
            bitpix: 32,
            ..NiftiHeader::default()
        };
        for (slot, &d) in header.dim.iter_mut().zip(shape) {
            *slot = d as i64;
        }
        header.set_affine(affine);
        header.vox_offset = header.version.default_vox_offset();

        // the reversed-axes view iterates with the first axis fastest
        let mut bytes = vec![0u8; data.len() * 4];
        for (chunk, &v) in bytes.chunks_exact_mut(4).zip(data.t().iter()) {
            LittleEndian::write_f32(chunk, v);
        }

        Self {
            header,
            data: bytes,
        }
    }

    /// Image header.
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Image shape.
    pub fn shape(&self) -> Vec<usize> {
        self.header.shape()
    }

    /// Raw voxel payload in file byte order.
    pub fn data_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Scaled value of the voxel at a Fortran-order linear index.
    pub fn voxel(&self, index: usize) -> f64 {
        let dt = self.header.datatype;
        let at = index * dt.byte_size();
        let raw = &self.data[at..at + dt.byte_size()];
        let value = if self.header.is_little_endian() {
            decode::<LittleEndian>(dt, raw)
        } else {
            decode::<BigEndian>(dt, raw)
        };
        self.scale(value)
    }

    fn scale(&self, value: f64) -> f64 {
        let slope = self.header.scl_slope;
        if slope == 0.0 || !slope.is_finite() {
            return value;
        }
        let inter = if self.header.scl_inter.is_finite() {
            self.header.scl_inter
        } else {
            0.0
        };
        value * slope + inter
    }

    /// Extract the 2-D slice at `index` along spatial `axis` (0, 1 or 2),
    /// with the time index held at `t`.
    ///
    /// The result keeps the remaining spatial axes in order: axis 0 yields
    /// `(ny, nz)`, axis 1 `(nx, nz)`, axis 2 `(nx, ny)`.
    pub fn slice(&self, axis: usize, index: usize, t: usize) -> Result<Array2<f64>> {
        let shape = self.shape();
        if shape.len() < 3 {
            return Err(Error::InvalidDimensions(format!(
                "slicing needs at least 3 dimensions, got {}",
                shape.len()
            )));
        }
        if axis > 2 {
            return Err(Error::InvalidDimensions(format!(
                "slice axis must be 0, 1 or 2, got {}",
                axis
            )));
        }
        if index >= shape[axis] {
            return Err(Error::InvalidDimensions(format!(
                "slice index {} out of range for axis {} of size {}",
                index, axis, shape[axis]
            )));
        }
        let frames = shape.get(3).copied().unwrap_or(1);
        if t >= frames {
            return Err(Error::InvalidDimensions(format!(
                "time index {} out of range for {} frames",
                t, frames
            )));
        }

        let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
        let base = t * nx * ny * nz;
        let at = |x: usize, y: usize, z: usize| self.voxel(base + x + nx * (y + ny * z));

        let slice = match axis {
            0 => Array2::from_shape_fn((ny, nz), |(y, z)| at(index, y, z)),
            1 => Array2::from_shape_fn((nx, nz), |(x, z)| at(x, index, z)),
            _ => Array2::from_shape_fn((nx, ny), |(x, y)| at(x, y, index)),
        };
        Ok(slice)
    }
}

fn decode<E: ByteOrder>(dt: DataType, raw: &[u8]) -> f64 {
    match dt {
        DataType::UInt8 => raw[0] as f64,
        DataType::Int8 => raw[0] as i8 as f64,
        DataType::Int16 => E::read_i16(raw) as f64,
        DataType::UInt16 => E::read_u16(raw) as f64,
        DataType::Int32 => E::read_i32(raw) as f64,
        DataType::UInt32 => E::read_u32(raw) as f64,
        DataType::Int64 => E::read_i64(raw) as f64,
        DataType::UInt64 => E::read_u64(raw) as f64,
        DataType::Float16 => f16::from_bits(E::read_u16(raw)).to_f64(),
        DataType::BFloat16 => bf16::from_bits(E::read_u16(raw)).to_f64(),
        DataType::Float32 => E::read_f32(raw) as f64,
        DataType::Float64 => E::read_f64(raw),
    }
}
