//! `NIfTI` header parsing and representation.
//!
//! Supports both NIfTI-1 (348-byte header) and NIfTI-2 (540-byte header) formats
//! with automatic version and endianness detection. Every on-disk field is kept,
//! including the Analyze 7.5 leftovers of NIfTI-1, so callers can report the
//! header verbatim.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::marker::PhantomData;

/// NIfTI format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiVersion {
    /// NIfTI-1 format (348-byte header, 16-bit dimensions)
    #[default]
    Nifti1,
    /// NIfTI-2 format (540-byte header, 64-bit dimensions)
    Nifti2,
}

impl NiftiVersion {
    /// Header size in bytes for this version.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }

    /// Default vox_offset for this version (header size + extension flag).
    pub const fn default_vox_offset(self) -> i64 {
        match self {
            Self::Nifti1 => 352,
            Self::Nifti2 => 544,
        }
    }
}

/// NIfTI-1 header field byte offsets.
mod offsets_v1 {
    pub const SIZEOF_HDR: usize = 0;
    pub const DATA_TYPE: usize = 4;
    pub const DB_NAME: usize = 14;
    pub const EXTENTS: usize = 32;
    pub const SESSION_ERROR: usize = 36;
    pub const REGULAR: usize = 38;
    pub const DIM_INFO: usize = 39;
    pub const DIM: usize = 40;
    pub const INTENT_P1: usize = 56;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const SLICE_START: usize = 74;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const SLICE_END: usize = 120;
    pub const SLICE_CODE: usize = 122;
    pub const XYZT_UNITS: usize = 123;
    pub const CAL_MAX: usize = 124;
    pub const CAL_MIN: usize = 128;
    pub const SLICE_DURATION: usize = 132;
    pub const TOFFSET: usize = 136;
    pub const GLMAX: usize = 140;
    pub const GLMIN: usize = 144;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const SROW_Y: usize = 296;
    pub const SROW_Z: usize = 312;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 header field byte offsets.
mod offsets_v2 {
    pub const SIZEOF_HDR: usize = 0;
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const INTENT_P1: usize = 80;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const CAL_MAX: usize = 192;
    pub const CAL_MIN: usize = 200;
    pub const SLICE_DURATION: usize = 208;
    pub const TOFFSET: usize = 216;
    pub const SLICE_START: usize = 224;
    pub const SLICE_END: usize = 232;
    pub const DESCRIP: usize = 240;
    pub const AUX_FILE: usize = 320;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN_B: usize = 352;
    pub const QOFFSET_X: usize = 376;
    pub const SROW_X: usize = 400;
    pub const SROW_Y: usize = 432;
    pub const SROW_Z: usize = 464;
    pub const SLICE_CODE: usize = 496;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
    pub const INTENT_NAME: usize = 508;
    pub const DIM_INFO: usize = 524;
}

/// `NIfTI` data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Signed 8-bit integer
    Int8 = 256,
    /// Unsigned 16-bit integer
    UInt16 = 512,
    /// Unsigned 32-bit integer
    UInt32 = 768,
    /// Signed 64-bit integer
    Int64 = 1024,
    /// Unsigned 64-bit integer
    UInt64 = 1280,
    /// IEEE 754 16-bit floating point (half precision)
    Float16 = 16384,
    /// Brain floating point 16-bit (bfloat16)
    BFloat16 = 16385,
}

impl DataType {
    /// Parse from `NIfTI` datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            16384 => Ok(Self::Float16),
            16385 => Ok(Self::BFloat16),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Short type name used in diagnostics.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float16 => "f16",
            Self::BFloat16 => "bf16",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

/// Analyze 7.5 fields that survive in the NIfTI-1 layout only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFields {
    pub data_type: Vec<u8>,
    pub db_name: Vec<u8>,
    pub extents: i32,
    pub session_error: i16,
    pub regular: Vec<u8>,
    pub glmax: i32,
    pub glmin: i32,
}

impl Default for LegacyFields {
    fn default() -> Self {
        Self {
            data_type: Vec::new(),
            db_name: Vec::new(),
            extents: 0,
            session_error: 0,
            regular: b"r".to_vec(),
            glmax: 0,
            glmin: 0,
        }
    }
}

/// Unified NIfTI header supporting both NIfTI-1 and NIfTI-2 formats.
///
/// Widths follow NIfTI-2 (64-bit integers, f64 floats); NIfTI-1 values are
/// widened on read and narrowed on write. Text fields are raw bytes with
/// trailing NULs removed.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    /// NIfTI format version.
    pub version: NiftiVersion,
    /// Number of dimensions (`dim[0]` on disk, 1-7).
    pub ndim: u8,
    /// Size along each dimension (`dim[1..=7]` on disk).
    pub dim: [i64; 7],
    pub dim_info: u8,
    pub intent_p: [f64; 3],
    pub intent_code: i32,
    pub intent_name: Vec<u8>,
    /// Data type.
    pub datatype: DataType,
    pub bitpix: i16,
    pub slice_start: i64,
    pub slice_end: i64,
    pub slice_code: i32,
    pub slice_duration: f64,
    /// Voxel sizes (pixdim[1..=ndim]) and qfac at index 0.
    pub pixdim: [f64; 8],
    /// Data offset in file.
    pub vox_offset: i64,
    pub scl_slope: f64,
    pub scl_inter: f64,
    /// Packed spatial and temporal unit codes.
    pub xyzt_units: i32,
    pub cal_max: f64,
    pub cal_min: f64,
    pub toffset: f64,
    pub descrip: Vec<u8>,
    pub aux_file: Vec<u8>,
    pub qform_code: i32,
    pub sform_code: i32,
    /// Quaternion parameters b, c, d for qform.
    pub quatern: [f64; 3],
    /// Offset parameters for qform.
    pub qoffset: [f64; 3],
    /// Rows of the sform affine matrix.
    pub srow_x: [f64; 4],
    pub srow_y: [f64; 4],
    pub srow_z: [f64; 4],
    pub magic: Vec<u8>,
    /// Present for NIfTI-1 headers only.
    pub legacy: Option<LegacyFields>,
    /// File endianness (true = little endian).
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            version: NiftiVersion::Nifti1,
            ndim: 3,
            dim: [1, 1, 1, 1, 1, 1, 1],
            dim_info: 0,
            intent_p: [0.0; 3],
            intent_code: 0,
            intent_name: Vec::new(),
            datatype: DataType::Float32,
            bitpix: 32,
            slice_start: 0,
            slice_end: 0,
            slice_code: 0,
            slice_duration: 0.0,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            xyzt_units: 0x02 | 0x08,
            cal_max: 0.0,
            cal_min: 0.0,
            toffset: 0.0,
            descrip: Vec::new(),
            aux_file: Vec::new(),
            qform_code: 0,
            sform_code: 1,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.0, 0.0],
            magic: b"n+1".to_vec(),
            legacy: Some(LegacyFields::default()),
            little_endian: true,
        }
    }
}

/// Typed reads at fixed offsets of a header buffer.
struct Fields<'a, E> {
    bytes: &'a [u8],
    order: PhantomData<E>,
}

impl<'a, E: ByteOrder> Fields<'a, E> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            order: PhantomData,
        }
    }

    fn u8(&self, at: usize) -> u8 {
        self.bytes[at]
    }

    fn i16(&self, at: usize) -> i16 {
        E::read_i16(&self.bytes[at..at + 2])
    }

    fn i32(&self, at: usize) -> i32 {
        E::read_i32(&self.bytes[at..at + 4])
    }

    fn i64(&self, at: usize) -> i64 {
        E::read_i64(&self.bytes[at..at + 8])
    }

    fn f32(&self, at: usize) -> f64 {
        E::read_f32(&self.bytes[at..at + 4]) as f64
    }

    fn f64(&self, at: usize) -> f64 {
        E::read_f64(&self.bytes[at..at + 8])
    }

    fn f32s<const N: usize>(&self, at: usize) -> [f64; N] {
        std::array::from_fn(|i| self.f32(at + i * 4))
    }

    fn f64s<const N: usize>(&self, at: usize) -> [f64; N] {
        std::array::from_fn(|i| self.f64(at + i * 8))
    }

    fn text(&self, at: usize, len: usize) -> Vec<u8> {
        trim_nul(&self.bytes[at..at + len])
    }
}

fn trim_nul(raw: &[u8]) -> Vec<u8> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    raw[..end].to_vec()
}

fn checked_ndim(raw: i64) -> Result<u8> {
    if !(1..=7).contains(&raw) {
        return Err(Error::InvalidDimensions(format!(
            "ndim must be 1..=7, got {}",
            raw
        )));
    }
    Ok(raw as u8)
}

fn checked_bitpix(datatype: DataType, bitpix: i16) -> Result<i16> {
    let expected = (datatype.byte_size() * 8) as i16;
    if bitpix != expected {
        return Err(Error::InvalidDimensions(format!(
            "bitpix {} does not match datatype {} (expected {})",
            bitpix,
            datatype.type_name(),
            expected
        )));
    }
    Ok(bitpix)
}

impl NiftiHeader {
    /// Size of NIfTI-1 header in bytes.
    pub const SIZE: usize = 348;

    /// Size of NIfTI-2 header in bytes.
    pub const SIZE_V2: usize = 540;

    /// Returns the header size for this header's version.
    pub fn header_size(&self) -> usize {
        self.version.header_size()
    }

    /// `sizeof_hdr` as stored on disk.
    pub fn sizeof_hdr(&self) -> i32 {
        self.header_size() as i32
    }

    /// Read header from bytes with automatic version and endianness detection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "header too short to detect version",
            )));
        }

        // sizeof_hdr doubles as the version and byte-order marker
        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);

        let (version, little_endian) = match (sizeof_hdr_le, sizeof_hdr_be) {
            (348, _) => (NiftiVersion::Nifti1, true),
            (_, 348) => (NiftiVersion::Nifti1, false),
            (540, _) => (NiftiVersion::Nifti2, true),
            (_, 540) => (NiftiVersion::Nifti2, false),
            _ => {
                return Err(Error::InvalidMagic([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ]))
            }
        };

        let required_size = version.header_size();
        if bytes.len() < required_size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "header too short: got {} bytes, need {} for {:?}",
                    bytes.len(),
                    required_size,
                    version
                ),
            )));
        }

        let header = match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1(Fields::<LittleEndian>::new(bytes)),
            (NiftiVersion::Nifti1, false) => Self::parse_v1(Fields::<BigEndian>::new(bytes)),
            (NiftiVersion::Nifti2, true) => Self::parse_v2(Fields::<LittleEndian>::new(bytes)),
            (NiftiVersion::Nifti2, false) => Self::parse_v2(Fields::<BigEndian>::new(bytes)),
        }?;

        let header = Self {
            little_endian,
            ..header
        };
        header.validate()?;
        Ok(header)
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v1<E: ByteOrder>(f: Fields<'_, E>) -> Result<Self> {
        use offsets_v1::*;

        let magic = &f.bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let ndim = checked_ndim(f.i16(DIM) as i64)?;
        let dim: [i64; 7] = std::array::from_fn(|i| f.i16(DIM + 2 + i * 2) as i64);
        let datatype = DataType::from_code(f.i16(DATATYPE))?;
        let bitpix = checked_bitpix(datatype, f.i16(BITPIX))?;

        let vox_offset = f.f32(VOX_OFFSET);
        if !vox_offset.is_finite() || vox_offset.fract() != 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a finite integer, got {}",
                vox_offset
            )));
        }

        Ok(Self {
            version: NiftiVersion::Nifti1,
            ndim,
            dim,
            dim_info: f.u8(DIM_INFO),
            intent_p: f.f32s(INTENT_P1),
            intent_code: f.i16(INTENT_CODE) as i32,
            intent_name: f.text(INTENT_NAME, 16),
            datatype,
            bitpix,
            slice_start: f.i16(SLICE_START) as i64,
            slice_end: f.i16(SLICE_END) as i64,
            slice_code: f.u8(SLICE_CODE) as i32,
            slice_duration: f.f32(SLICE_DURATION),
            pixdim: f.f32s(PIXDIM),
            vox_offset: vox_offset as i64,
            scl_slope: f.f32(SCL_SLOPE),
            scl_inter: f.f32(SCL_INTER),
            xyzt_units: f.u8(XYZT_UNITS) as i32,
            cal_max: f.f32(CAL_MAX),
            cal_min: f.f32(CAL_MIN),
            toffset: f.f32(TOFFSET),
            descrip: f.text(DESCRIP, 80),
            aux_file: f.text(AUX_FILE, 24),
            qform_code: f.i16(QFORM_CODE) as i32,
            sform_code: f.i16(SFORM_CODE) as i32,
            quatern: f.f32s(QUATERN_B),
            qoffset: f.f32s(QOFFSET_X),
            srow_x: f.f32s(SROW_X),
            srow_y: f.f32s(SROW_Y),
            srow_z: f.f32s(SROW_Z),
            magic: f.text(MAGIC, 4),
            legacy: Some(LegacyFields {
                data_type: f.text(DATA_TYPE, 10),
                db_name: f.text(DB_NAME, 18),
                extents: f.i32(EXTENTS),
                session_error: f.i16(SESSION_ERROR),
                regular: f.text(REGULAR, 1),
                glmax: f.i32(GLMAX),
                glmin: f.i32(GLMIN),
            }),
            little_endian: true,
        })
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v2<E: ByteOrder>(f: Fields<'_, E>) -> Result<Self> {
        use offsets_v2::*;

        let magic = &f.bytes[MAGIC..MAGIC + 8];
        if magic != b"n+2\0\r\n\x1a\n" && magic != b"ni2\0\r\n\x1a\n" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let ndim = checked_ndim(f.i64(DIM))?;
        let dim: [i64; 7] = std::array::from_fn(|i| f.i64(DIM + 8 + i * 8));
        let datatype = DataType::from_code(f.i16(DATATYPE))?;
        let bitpix = checked_bitpix(datatype, f.i16(BITPIX))?;

        Ok(Self {
            version: NiftiVersion::Nifti2,
            ndim,
            dim,
            dim_info: f.u8(DIM_INFO),
            intent_p: f.f64s(INTENT_P1),
            intent_code: f.i32(INTENT_CODE),
            intent_name: f.text(INTENT_NAME, 16),
            datatype,
            bitpix,
            slice_start: f.i64(SLICE_START),
            slice_end: f.i64(SLICE_END),
            slice_code: f.i32(SLICE_CODE),
            slice_duration: f.f64(SLICE_DURATION),
            pixdim: f.f64s(PIXDIM),
            vox_offset: f.i64(VOX_OFFSET),
            scl_slope: f.f64(SCL_SLOPE),
            scl_inter: f.f64(SCL_INTER),
            xyzt_units: f.i32(XYZT_UNITS),
            cal_max: f.f64(CAL_MAX),
            cal_min: f.f64(CAL_MIN),
            toffset: f.f64(TOFFSET),
            descrip: f.text(DESCRIP, 80),
            aux_file: f.text(AUX_FILE, 24),
            qform_code: f.i32(QFORM_CODE),
            sform_code: f.i32(SFORM_CODE),
            quatern: f.f64s(QUATERN_B),
            qoffset: f.f64s(QOFFSET_X),
            srow_x: f.f64s(SROW_X),
            srow_y: f.f64s(SROW_Y),
            srow_z: f.f64s(SROW_Z),
            magic: f.text(MAGIC, 8),
            legacy: None,
            little_endian: true,
        })
    }

    /// Write header to little-endian bytes in this header's version.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.version {
            NiftiVersion::Nifti1 => self.to_bytes_v1(),
            NiftiVersion::Nifti2 => self.to_bytes_v2(),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn to_bytes_v1(&self) -> Vec<u8> {
        use offsets_v1::*;
        type E = LittleEndian;

        let mut buf = vec![0u8; Self::SIZE];
        E::write_i32(&mut buf[SIZEOF_HDR..], 348);

        if let Some(legacy) = &self.legacy {
            put_text(&mut buf, DATA_TYPE, 10, &legacy.data_type);
            put_text(&mut buf, DB_NAME, 18, &legacy.db_name);
            E::write_i32(&mut buf[EXTENTS..], legacy.extents);
            E::write_i16(&mut buf[SESSION_ERROR..], legacy.session_error);
            put_text(&mut buf, REGULAR, 1, &legacy.regular);
            E::write_i32(&mut buf[GLMAX..], legacy.glmax);
            E::write_i32(&mut buf[GLMIN..], legacy.glmin);
        }

        buf[DIM_INFO] = self.dim_info;
        E::write_i16(&mut buf[DIM..], self.ndim as i16);
        for (i, &d) in self.dim.iter().enumerate() {
            E::write_i16(&mut buf[DIM + 2 + i * 2..], d.min(i16::MAX as i64) as i16);
        }
        for (i, &p) in self.intent_p.iter().enumerate() {
            E::write_f32(&mut buf[INTENT_P1 + i * 4..], p as f32);
        }
        E::write_i16(&mut buf[INTENT_CODE..], self.intent_code as i16);
        E::write_i16(&mut buf[DATATYPE..], self.datatype as i16);
        E::write_i16(&mut buf[BITPIX..], (self.datatype.byte_size() * 8) as i16);
        E::write_i16(&mut buf[SLICE_START..], self.slice_start as i16);
        for (i, &p) in self.pixdim.iter().enumerate() {
            E::write_f32(&mut buf[PIXDIM + i * 4..], p as f32);
        }
        E::write_f32(&mut buf[VOX_OFFSET..], self.vox_offset as f32);
        E::write_f32(&mut buf[SCL_SLOPE..], self.scl_slope as f32);
        E::write_f32(&mut buf[SCL_INTER..], self.scl_inter as f32);
        E::write_i16(&mut buf[SLICE_END..], self.slice_end as i16);
        buf[SLICE_CODE] = self.slice_code as u8;
        buf[XYZT_UNITS] = self.xyzt_units as u8;
        E::write_f32(&mut buf[CAL_MAX..], self.cal_max as f32);
        E::write_f32(&mut buf[CAL_MIN..], self.cal_min as f32);
        E::write_f32(&mut buf[SLICE_DURATION..], self.slice_duration as f32);
        E::write_f32(&mut buf[TOFFSET..], self.toffset as f32);
        put_text(&mut buf, DESCRIP, 80, &self.descrip);
        put_text(&mut buf, AUX_FILE, 24, &self.aux_file);
        E::write_i16(&mut buf[QFORM_CODE..], self.qform_code as i16);
        E::write_i16(&mut buf[SFORM_CODE..], self.sform_code as i16);
        let floats = self.quatern.iter().chain(self.qoffset.iter());
        for (i, &v) in floats.enumerate() {
            E::write_f32(&mut buf[QUATERN_B + i * 4..], v as f32);
        }
        for (row, at) in [(&self.srow_x, SROW_X), (&self.srow_y, SROW_Y), (&self.srow_z, SROW_Z)] {
            for (i, &v) in row.iter().enumerate() {
                E::write_f32(&mut buf[at + i * 4..], v as f32);
            }
        }
        put_text(&mut buf, INTENT_NAME, 16, &self.intent_name);
        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");

        buf
    }

    #[allow(clippy::wildcard_imports)]
    fn to_bytes_v2(&self) -> Vec<u8> {
        use offsets_v2::*;
        type E = LittleEndian;

        let mut buf = vec![0u8; Self::SIZE_V2];
        E::write_i32(&mut buf[SIZEOF_HDR..], 540);
        buf[MAGIC..MAGIC + 8].copy_from_slice(b"n+2\0\r\n\x1a\n");
        E::write_i16(&mut buf[DATATYPE..], self.datatype as i16);
        E::write_i16(&mut buf[BITPIX..], (self.datatype.byte_size() * 8) as i16);
        E::write_i64(&mut buf[DIM..], self.ndim as i64);
        for (i, &d) in self.dim.iter().enumerate() {
            E::write_i64(&mut buf[DIM + 8 + i * 8..], d);
        }
        let floats = self.intent_p.iter().chain(self.pixdim.iter());
        for (i, &v) in floats.enumerate() {
            E::write_f64(&mut buf[INTENT_P1 + i * 8..], v);
        }
        E::write_i64(&mut buf[VOX_OFFSET..], self.vox_offset);
        let floats = [
            self.scl_slope,
            self.scl_inter,
            self.cal_max,
            self.cal_min,
            self.slice_duration,
            self.toffset,
        ];
        for (i, &v) in floats.iter().enumerate() {
            E::write_f64(&mut buf[SCL_SLOPE + i * 8..], v);
        }
        E::write_i64(&mut buf[SLICE_START..], self.slice_start);
        E::write_i64(&mut buf[SLICE_END..], self.slice_end);
        put_text(&mut buf, DESCRIP, 80, &self.descrip);
        put_text(&mut buf, AUX_FILE, 24, &self.aux_file);
        E::write_i32(&mut buf[QFORM_CODE..], self.qform_code);
        E::write_i32(&mut buf[SFORM_CODE..], self.sform_code);
        let floats = self.quatern.iter().chain(self.qoffset.iter());
        for (i, &v) in floats.enumerate() {
            E::write_f64(&mut buf[QUATERN_B + i * 8..], v);
        }
        for (row, at) in [(&self.srow_x, SROW_X), (&self.srow_y, SROW_Y), (&self.srow_z, SROW_Z)] {
            for (i, &v) in row.iter().enumerate() {
                E::write_f64(&mut buf[at + i * 8..], v);
            }
        }
        E::write_i32(&mut buf[SLICE_CODE..], self.slice_code);
        E::write_i32(&mut buf[XYZT_UNITS..], self.xyzt_units);
        E::write_i32(&mut buf[INTENT_CODE..], self.intent_code);
        put_text(&mut buf, INTENT_NAME, 16, &self.intent_name);
        buf[DIM_INFO] = self.dim_info;

        buf
    }

    /// The 4x4 voxel-to-world transform.
    ///
    /// sform takes precedence, then qform, then a diagonal of voxel sizes.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        if self.sform_code > 0 {
            [self.srow_x, self.srow_y, self.srow_z, [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_to_affine()
        } else {
            [
                [self.pixdim[1], 0.0, 0.0, 0.0],
                [0.0, self.pixdim[2], 0.0, 0.0],
                [0.0, 0.0, self.pixdim[3], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    /// Store a 4x4 transform as the sform and derive voxel sizes from it.
    pub fn set_affine(&mut self, affine: [[f64; 4]; 4]) {
        self.srow_x = affine[0];
        self.srow_y = affine[1];
        self.srow_z = affine[2];
        self.sform_code = 1;

        for axis in 0..3 {
            let norm = (0..3).map(|r| affine[r][axis] * affine[r][axis]).sum::<f64>();
            self.pixdim[axis + 1] = norm.sqrt();
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_to_affine(&self) -> [[f64; 4]; 4] {
        let [b, c, d] = self.quatern;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = [self.pixdim[1].abs(), self.pixdim[2], self.pixdim[3] * qfac];

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                self.qoffset[0],
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                self.qoffset[1],
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                self.qoffset[2],
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Image shape (up to ndim elements).
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Total size of image data in bytes.
    pub fn data_size(&self) -> usize {
        self.num_voxels() * self.datatype.byte_size()
    }

    /// Bytes a file must hold: `vox_offset` plus the voxel payload.
    pub fn file_size(&self) -> Result<usize> {
        let dims = &self.dim[..(self.ndim as usize).min(self.dim.len())];
        let data = dims.iter().try_fold(self.datatype.byte_size(), |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        });
        usize::try_from(self.vox_offset)
            .ok()
            .zip(data)
            .and_then(|(offset, data)| offset.checked_add(data))
            .ok_or_else(|| {
                Error::InvalidDimensions(format!(
                    "vox_offset {} plus the data size of {:?} overflows",
                    self.vox_offset, dims
                ))
            })
    }

    /// Returns true if file is little endian.
    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Validate header fields for basic NIfTI invariants.
    pub fn validate(&self) -> Result<()> {
        checked_ndim(self.ndim as i64)?;

        for (i, &d) in self.dim[..self.ndim as usize].iter().enumerate() {
            if d <= 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} must be positive, got {}",
                    i, d
                )));
            }
        }

        let min_offset = self.version.header_size() as i64;
        if self.vox_offset < min_offset {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset, min_offset
            )));
        }

        let mut voxels: usize = 1;
        for &d in &self.dim[..self.ndim as usize] {
            voxels = voxels
                .checked_mul(d as usize)
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| Error::InvalidDimensions("data size overflow".into()))?;
        self.file_size()?;

        Ok(())
    }
}

fn put_text(buf: &mut [u8], at: usize, width: usize, text: &[u8]) {
    let len = text.len().min(width);
    buf[at..at + len].copy_from_slice(&text[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold_header() -> NiftiHeader {
        NiftiHeader {
            ndim: 4,
            dim: [64, 64, 32, 120, 1, 1, 1],
            pixdim: [1.0, 3.0, 3.0, 3.5, 2.0, 0.0, 0.0, 0.0],
            descrip: b"task-rest".to_vec(),
            ..NiftiHeader::default()
        }
    }

    #[test]
    fn test_shape_returns_vec() {
        let header = bold_header();
        assert_eq!(header.shape(), vec![64usize, 64, 32, 120]);
        assert_eq!(header.num_voxels(), 64 * 64 * 32 * 120);
    }

    #[test]
    fn test_nifti1_roundtrip_keeps_every_field() {
        let mut header = bold_header();
        header.intent_name = b"none".to_vec();
        header.slice_duration = 0.5;
        header.legacy = Some(LegacyFields {
            db_name: b"sub-01".to_vec(),
            glmax: 4095,
            ..LegacyFields::default()
        });

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 348);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti1);
        assert_eq!(parsed.ndim, 4);
        assert_eq!(parsed.dim[..4], [64, 64, 32, 120]);
        assert_eq!(parsed.descrip, b"task-rest");
        assert_eq!(parsed.intent_name, b"none");
        assert_eq!(parsed.magic, b"n+1");
        assert_eq!(parsed.slice_duration, 0.5);
        let legacy = parsed.legacy.unwrap();
        assert_eq!(legacy.db_name, b"sub-01");
        assert_eq!(legacy.regular, b"r");
        assert_eq!(legacy.glmax, 4095);
    }

    #[test]
    fn test_nifti2_roundtrip() {
        let header = NiftiHeader {
            version: NiftiVersion::Nifti2,
            vox_offset: 544,
            legacy: None,
            ..bold_header()
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 540);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti2);
        assert_eq!(parsed.dim[3], 120);
        assert_eq!(parsed.pixdim[3], 3.5);
        assert!(parsed.legacy.is_none());
        assert_eq!(parsed.magic, b"n+2\0\r\n\x1a\n");
    }

    #[test]
    fn test_big_endian_detection() {
        let mut bytes = vec![0u8; 348];
        BigEndian::write_i32(&mut bytes[0..4], 348);
        BigEndian::write_i16(&mut bytes[40..42], 4);
        for i in 0..4 {
            BigEndian::write_i16(&mut bytes[42 + i * 2..], 8);
        }
        BigEndian::write_i16(&mut bytes[70..72], 4); // Int16
        BigEndian::write_i16(&mut bytes[72..74], 16);
        BigEndian::write_f32(&mut bytes[108..112], 352.0);
        bytes[344..348].copy_from_slice(b"n+1\0");

        let header = NiftiHeader::from_bytes(&bytes).unwrap();
        assert!(!header.is_little_endian());
        assert_eq!(header.shape(), vec![8, 8, 8, 8]);
        assert_eq!(header.datatype, DataType::Int16);
    }

    #[test]
    fn test_rejects_bad_magic_and_ndim() {
        let mut bytes = bold_header().to_bytes();
        bytes[344..348].copy_from_slice(b"BAD!");
        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("invalid NIfTI magic"));

        let mut bytes = bold_header().to_bytes();
        LittleEndian::write_i16(&mut bytes[40..42], 9);
        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("ndim must be 1..=7"));
    }

    #[test]
    fn test_rejects_bitpix_mismatch() {
        let mut bytes = bold_header().to_bytes();
        LittleEndian::write_i16(&mut bytes[72..74], 8);
        assert!(NiftiHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_offset_past_addressable_size() {
        let mut header = bold_header();
        header.version = NiftiVersion::Nifti2;
        header.legacy = None;
        header.ndim = 3;
        header.dim = [1 << 30, 1 << 30, 3, 1, 1, 1, 1];
        header.vox_offset = i64::MAX - 10;
        assert!(matches!(header.file_size(), Err(Error::InvalidDimensions(_))));

        let bytes = header.to_bytes();
        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions(_)));
    }

    #[test]
    fn test_file_size() {
        let header = bold_header();
        let expected = 352 + header.num_voxels() * 4;
        assert_eq!(header.file_size().unwrap(), expected);
    }

    #[test]
    fn test_affine_source_precedence() {
        let mut header = bold_header();
        header.srow_x = [2.0, 0.0, 0.0, -90.0];
        assert_eq!(header.affine()[0], [2.0, 0.0, 0.0, -90.0]);

        header.sform_code = 0;
        header.qform_code = 1;
        header.qoffset = [1.0, 2.0, 3.0];
        let affine = header.affine();
        assert_eq!(affine[0], [3.0, 0.0, 0.0, 1.0]);
        assert_eq!(affine[2], [0.0, 0.0, 3.5, 3.0]);

        header.qform_code = 0;
        assert_eq!(header.affine()[1], [0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_affine_updates_spacing() {
        let mut header = NiftiHeader::default();
        header.set_affine([
            [0.0, 2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 4.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(header.pixdim[1..4], [3.0, 2.0, 4.0]);
        assert_eq!(header.sform_code, 1);
    }
}
