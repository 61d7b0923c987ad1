//! Error types for boldcheck.

use thiserror::Error;

/// Errors raised while decoding, validating, staging or reporting.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header magic did not match NIfTI-1 or NIfTI-2.
    #[error("invalid NIfTI magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Datatype code outside the supported set.
    #[error("unsupported data type code: {0}")]
    UnsupportedDataType(i16),

    /// Header dimensions or offsets are inconsistent.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// File structure does not match what the header declares.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Gzip stream could not be inflated.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// The primary volume is not gzip-framed.
    #[error("file doesn't look like a gzip-ed nifti")]
    NotGzip,

    /// Job configuration could not be read or is incomplete.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A report value has no JSON representation.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Preview image encoding failed.
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// Tab-separated table could not be read.
    #[error("table read failed: {0}")]
    Table(#[from] csv::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
