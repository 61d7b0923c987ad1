//! `NIfTI` file format support.
//!
//! `NIfTI` (Neuroimaging Informatics Technology Initiative) is the standard
//! volumetric format for BOLD acquisitions. This module reads `.nii.gz` files,
//! exposes every header field, and decodes voxel slices on demand.

pub(crate) mod header;
pub(crate) mod image;
pub mod io;

pub use self::header::{DataType, LegacyFields, NiftiHeader, NiftiVersion};
pub use self::image::NiftiImage;
pub use self::io::{is_gzip_framed, load, save, GZIP_MAGIC};
