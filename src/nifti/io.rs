//! Gzip-framed NIfTI reading and writing.
//!
//! Decompression is single-shot with libdeflate, sized from the gzip ISIZE
//! trailer, and falls back to a streaming flate2 decoder when the trailer
//! under-reports (multi-member gzip or payloads over 4 GiB).

use super::header::NiftiHeader;
use super::image::NiftiImage;
use crate::error::{Error, Result};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use libdeflater::{DecompressionError, Decompressor};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Gzip member magic number.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

/// Check whether a file starts with the gzip magic number.
///
/// Files shorter than two bytes are reported as not gzip-framed.
pub fn is_gzip_framed<P: AsRef<Path>>(path: P) -> Result<bool> {
    let file = File::open(path.as_ref())?;
    let mut head = Vec::with_capacity(2);
    file.take(2).read_to_end(&mut head)?;
    Ok(head == GZIP_MAGIC)
}

/// Load a gzip-compressed NIfTI image.
///
/// # Example
/// ```ignore
/// let img = boldcheck::nifti::load("sub-01_task-rest_bold.nii.gz")?;
/// let axial = img.slice(2, img.shape()[2] / 2, 0)?;
/// ```
#[must_use = "this function returns a loaded image that should be used"]
pub fn load<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
    let compressed = std::fs::read(path.as_ref())?;
    if !compressed.starts_with(&GZIP_MAGIC) {
        return Err(Error::NotGzip);
    }

    let (mut output, used_streaming) = decompress_gzip_with_fallback(&compressed)?;
    let mut header = parse_decompressed_nifti(&output)?;

    if output.len() < header.file_size()? && !used_streaming {
        // ISIZE only covers the last member; re-read the whole stream
        output = decompress_gzip_streaming(&compressed)?;
        header = parse_decompressed_nifti(&output)?;
    }

    NiftiImage::from_file_bytes(header, output)
}

/// Save an image as gzip-compressed NIfTI.
pub fn save<P: AsRef<Path>>(image: &NiftiImage, path: P) -> Result<()> {
    let header = image.header();
    header.validate()?;

    let header_bytes = header.to_bytes();
    let padding = (header.vox_offset as usize).saturating_sub(header_bytes.len());

    let file = File::create(path.as_ref())?;
    let mut encoder = GzEncoder::new(
        BufWriter::with_capacity(1024 * 1024, file),
        Compression::fast(),
    );
    encoder.write_all(&header_bytes)?;
    encoder.write_all(&vec![0u8; padding])?;
    encoder.write_all(image.data_bytes())?;
    encoder.finish()?.flush()?;

    Ok(())
}

/// Deflate cannot expand input by more than this factor.
const MAX_DEFLATE_RATIO: usize = 1032;

fn estimate_gzip_uncompressed_size(compressed: &[u8]) -> usize {
    // ISIZE per RFC 1952: "original input size modulo 2^32"
    let trailer_size = if compressed.len() >= 4 {
        let trailer = &compressed[compressed.len() - 4..];
        u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize
    } else {
        compressed.len() * 4
    };
    // a corrupt trailer must not drive the allocation
    trailer_size.min(compressed.len().saturating_mul(MAX_DEFLATE_RATIO))
}

fn decompress_gzip_streaming(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, compressed));
    let mut output = Vec::with_capacity(estimate_gzip_uncompressed_size(compressed));
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

fn decompress_gzip_with_fallback(compressed: &[u8]) -> Result<(Vec<u8>, bool)> {
    let buffer_size = estimate_gzip_uncompressed_size(compressed).max(NiftiHeader::SIZE);
    let mut output = vec![0u8; buffer_size];

    match Decompressor::new().gzip_decompress(compressed, &mut output) {
        Ok(written) => {
            output.truncate(written);
            Ok((output, false))
        }
        Err(DecompressionError::InsufficientSpace) => {
            Ok((decompress_gzip_streaming(compressed)?, true))
        }
        Err(e) => Err(Error::Decompression(format!("{}", e))),
    }
}

fn parse_decompressed_nifti(bytes: &[u8]) -> Result<NiftiHeader> {
    if bytes.len() < NiftiHeader::SIZE {
        return Err(Error::Decompression(format!(
            "decompressed data too small for NIfTI header: {} bytes (need at least {})",
            bytes.len(),
            NiftiHeader::SIZE
        )));
    }
    NiftiHeader::from_bytes(bytes)
}
