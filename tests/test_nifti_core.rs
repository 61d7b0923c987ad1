//! Tests for NIfTI decoding as the validator sees it.
//!
//! Fixtures are written with the crate's own `nifti::save`, then
//! decompressed, patched and recompressed to exercise header failures.

use boldcheck::nifti::{self, DataType, NiftiHeader, NiftiImage};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{ArrayD, IxDyn};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::tempdir;

const IDENTITY: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Create a test image where voxel `i` (Fortran order) holds `i`.
fn create_test_image(shape: &[usize]) -> NiftiImage {
    let data = ArrayD::from_shape_fn(IxDyn(shape), |ix| {
        let mut linear = 0;
        for axis in (0..shape.len()).rev() {
            linear = linear * shape[axis] + ix[axis];
        }
        linear as f32
    });
    NiftiImage::from_array(data, IDENTITY)
}

/// Rewrite the decompressed bytes of a saved `.nii.gz` in place.
fn patch_gzip(path: &Path, patch: impl FnOnce(&mut Vec<u8>)) {
    let mut raw = Vec::new();
    GzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_end(&mut raw)
        .unwrap();
    patch(&mut raw);
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    std::fs::write(path, enc.finish().unwrap()).unwrap();
}

#[test]
fn test_load_invalid_magic_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");
    nifti::save(&create_test_image(&[2, 2, 1, 1]), &path).unwrap();

    patch_gzip(&path, |raw| raw[344..348].copy_from_slice(b"BAD!"));

    let err = nifti::load(&path).unwrap_err();
    assert!(err.to_string().contains("invalid NIfTI magic"));
}

#[test]
fn test_load_unsupported_data_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");
    nifti::save(&create_test_image(&[2, 2, 1, 1]), &path).unwrap();

    patch_gzip(&path, |raw| raw[70..72].copy_from_slice(&9999i16.to_le_bytes()));

    let err = nifti::load(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported data type"));
}

#[test]
fn test_load_roundtrip_preserves_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");

    let mut header = create_test_image(&[3, 4, 5, 6]).header().clone();
    header.pixdim[4] = 2.5;
    header.slice_duration = 0.0625;
    header.xyzt_units = 0x02 | 0x10;
    header.descrip = b"task-rest".to_vec();
    let img = NiftiImage::from_file_bytes(
        header.clone(),
        [
            header.to_bytes(),
            vec![0u8; 4],
            create_test_image(&[3, 4, 5, 6]).data_bytes().to_vec(),
        ]
        .concat(),
    )
    .unwrap();
    nifti::save(&img, &path).unwrap();

    let loaded = nifti::load(&path).unwrap();
    let h = loaded.header();
    assert_eq!(loaded.shape(), vec![3, 4, 5, 6]);
    assert_eq!(h.pixdim[4], 2.5);
    assert_eq!(h.slice_duration, 0.0625);
    assert_eq!(h.xyzt_units, 18);
    assert_eq!(h.descrip, b"task-rest");
    assert_eq!(h.sizeof_hdr(), 348);
    assert_eq!(h.affine(), IDENTITY);
}

#[test]
fn test_slices_follow_fortran_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");
    nifti::save(&create_test_image(&[4, 3, 2, 2]), &path).unwrap();

    let loaded = nifti::load(&path).unwrap();
    let z = loaded.slice(2, 1, 1).unwrap();
    assert_eq!(z.dim(), (4, 3));
    // x + 4y + 12z + 24t
    assert_eq!(z[[3, 2]], (3 + 8 + 12 + 24) as f64);
}

#[test]
fn test_big_endian_int16_volume() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");

    let mut header = NiftiHeader::default();
    header.ndim = 4;
    header.dim = [2, 2, 2, 1, 1, 1, 1];
    header.datatype = DataType::Int16;
    header.bitpix = 16;
    let mut raw = header.to_bytes();
    // flip every multi-byte field the reader needs to big-endian
    raw[0..4].copy_from_slice(&348i32.to_be_bytes());
    raw[40..42].copy_from_slice(&4i16.to_be_bytes());
    for (i, d) in [2i16, 2, 2, 1, 1, 1, 1].iter().enumerate() {
        raw[42 + 2 * i..44 + 2 * i].copy_from_slice(&d.to_be_bytes());
    }
    raw[70..72].copy_from_slice(&4i16.to_be_bytes());
    raw[72..74].copy_from_slice(&16i16.to_be_bytes());
    for i in 0..8 {
        raw[76 + 4 * i..80 + 4 * i].copy_from_slice(&1.0f32.to_be_bytes());
    }
    raw[108..112].copy_from_slice(&352.0f32.to_be_bytes());
    raw[112..116].copy_from_slice(&0.0f32.to_be_bytes());
    raw[254..256].copy_from_slice(&0i16.to_be_bytes());
    raw.extend_from_slice(&[0u8; 4]);
    for v in 0..8i16 {
        raw.extend_from_slice(&(v * 100).to_be_bytes());
    }
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    std::fs::write(&path, enc.finish().unwrap()).unwrap();

    let loaded = nifti::load(&path).unwrap();
    assert!(!loaded.header().is_little_endian());
    assert_eq!(loaded.header().datatype, DataType::Int16);
    let z = loaded.slice(2, 1, 0).unwrap();
    assert_eq!(z[[1, 1]], 700.0);
}

#[test]
fn test_uncompressed_file_is_not_gzip() {
    let dir = tempdir().unwrap();
    let gz = dir.path().join("bold.nii.gz");
    nifti::save(&create_test_image(&[2, 2, 2, 1]), &gz).unwrap();

    let plain = dir.path().join("bold.nii");
    let mut raw = Vec::new();
    GzDecoder::new(std::fs::File::open(&gz).unwrap())
        .read_to_end(&mut raw)
        .unwrap();
    std::fs::write(&plain, raw).unwrap();

    assert!(!nifti::is_gzip_framed(&plain).unwrap());
    let err = nifti::load(&plain).unwrap_err();
    assert_eq!(err.to_string(), "file doesn't look like a gzip-ed nifti");
}

#[test]
fn test_corrupted_file_handling() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");

    // gzip magic followed by garbage
    std::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef]).unwrap();
    assert!(nifti::is_gzip_framed(&path).unwrap());
    assert!(nifti::load(&path).is_err());

    // valid gzip, payload too short for a header
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&[0u8; 100]).unwrap();
    std::fs::write(&path, enc.finish().unwrap()).unwrap();
    assert!(nifti::load(&path).is_err());
}
