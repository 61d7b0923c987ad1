//! BOLD volume validation.
//!
//! Checks gzip framing, decodes the header into report metadata, checks
//! dimensionality and the orientation of the affine, and renders previews.
//! Nothing here fails the run: every problem becomes a report entry.

use crate::error::{Error, Result};
use crate::nifti::{self, NiftiHeader, NiftiVersion};
use crate::preview;
use crate::report::{MetaValue, ValidationReport};
use indexmap::IndexMap;
use ndarray::{arr1, arr2, ArrayD, ArrayView2};
use std::path::Path;

/// Metadata key holding the decoded header fields.
pub const HEADER_META_KEY: &str = "nifti_headers";

/// Prefix of every error raised while decoding or previewing the volume.
pub const BOLD_FAILURE: &str = "failed to validate bold ..  error code: ";

/// Dimensionality a BOLD series must declare.
pub const EXPECTED_NDIM: u8 = 4;

/// Validate the BOLD volume at `path` into `report`, rendering previews
/// into `preview_dir` when the volume is 4-D.
pub fn validate_bold(path: &Path, preview_dir: &Path, report: &mut ValidationReport) {
    tracing::info!("checking bold");

    match nifti::is_gzip_framed(path) {
        Ok(true) => {}
        Ok(false) => {
            report.error(Error::NotGzip.to_string());
            return;
        }
        Err(e) => {
            report.error(format!("{}{}", BOLD_FAILURE, e));
            return;
        }
    }

    if let Err(e) = check_volume(path, preview_dir, report) {
        report.error(format!("{}{}", BOLD_FAILURE, e));
    }
}

fn check_volume(path: &Path, preview_dir: &Path, report: &mut ValidationReport) -> Result<()> {
    let image = nifti::load(path)?;
    let header = image.header();

    report.set_meta(HEADER_META_KEY, header_metadata(header));

    if let Some(message) = check_dimensions(header) {
        report.error(message);
    }

    let affine = header.affine();
    let affine = arr2(&affine);
    for warning in check_affine(affine.view()) {
        report.warning(warning);
    }

    if header.ndim >= EXPECTED_NDIM {
        preview::render_previews(&image, preview_dir, report)?;
    } else {
        tracing::info!("skipping previews for {}-D volume", header.ndim);
    }
    Ok(())
}

/// Error message for a header that is not 4-D, if any.
pub fn check_dimensions(header: &NiftiHeader) -> Option<String> {
    (header.ndim != EXPECTED_NDIM).then(|| format!("bold should be 4D but has {}", header.ndim))
}

/// Compare the leading 3x3 block of `affine` against the identity.
///
/// Returns one warning per deviating cell, naming it as `row.column`.
/// Cells missing from a smaller matrix count as deviating.
pub fn check_affine(affine: ArrayView2<'_, f64>) -> Vec<String> {
    let mut warnings = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            let expected = if row == col { 1.0 } else { 0.0 };
            if affine.get((row, col)) != Some(&expected) {
                warnings.push(format!(
                    "transform matrix {}.{} is not {}",
                    row, col, expected
                ));
            }
        }
    }
    warnings
}

/// Every header field keyed by its NIfTI name, plus the affine as
/// `base_affine`.
///
/// Fields follow the NIfTI-1 layout order; the Analyze 7.5 fields appear
/// only for NIfTI-1 headers.
pub fn header_metadata(header: &NiftiHeader) -> IndexMap<String, MetaValue> {
    let mut fields: Vec<(&str, MetaValue)> = Vec::with_capacity(48);
    let legacy = header.legacy.as_ref();

    fields.push(("sizeof_hdr", header.sizeof_hdr().into()));
    if let Some(legacy) = legacy {
        fields.push(("data_type", legacy.data_type.as_slice().into()));
        fields.push(("db_name", legacy.db_name.as_slice().into()));
        fields.push(("extents", legacy.extents.into()));
        fields.push(("session_error", legacy.session_error.into()));
        fields.push(("regular", legacy.regular.as_slice().into()));
    }
    fields.push(("dim_info", header.dim_info.into()));

    let mut dim = vec![header.ndim as i64];
    dim.extend_from_slice(&header.dim);
    fields.push(("dim", arr1(&dim).into_dyn().into()));

    for (name, &p) in ["intent_p1", "intent_p2", "intent_p3"].into_iter().zip(&header.intent_p) {
        fields.push((name, p.into()));
    }
    fields.push(("intent_code", header.intent_code.into()));
    fields.push(("datatype", (header.datatype as i16).into()));
    fields.push(("bitpix", header.bitpix.into()));
    fields.push(("slice_start", header.slice_start.into()));
    fields.push(("pixdim", arr1(&header.pixdim).into_dyn().into()));
    let vox_offset = match header.version {
        NiftiVersion::Nifti1 => MetaValue::Float(header.vox_offset as f64),
        NiftiVersion::Nifti2 => MetaValue::Int(header.vox_offset),
    };
    fields.push(("vox_offset", vox_offset));
    fields.push(("scl_slope", header.scl_slope.into()));
    fields.push(("scl_inter", header.scl_inter.into()));
    fields.push(("slice_end", header.slice_end.into()));
    fields.push(("slice_code", header.slice_code.into()));
    fields.push(("xyzt_units", header.xyzt_units.into()));
    fields.push(("cal_max", header.cal_max.into()));
    fields.push(("cal_min", header.cal_min.into()));
    fields.push(("slice_duration", header.slice_duration.into()));
    fields.push(("toffset", header.toffset.into()));
    if let Some(legacy) = legacy {
        fields.push(("glmax", legacy.glmax.into()));
        fields.push(("glmin", legacy.glmin.into()));
    }
    fields.push(("descrip", header.descrip.as_slice().into()));
    fields.push(("aux_file", header.aux_file.as_slice().into()));
    fields.push(("qform_code", header.qform_code.into()));
    fields.push(("sform_code", header.sform_code.into()));

    let [b, c, d] = header.quatern;
    let [x, y, z] = header.qoffset;
    fields.push(("quatern_b", b.into()));
    fields.push(("quatern_c", c.into()));
    fields.push(("quatern_d", d.into()));
    fields.push(("qoffset_x", x.into()));
    fields.push(("qoffset_y", y.into()));
    fields.push(("qoffset_z", z.into()));
    fields.push(("srow_x", arr1(&header.srow_x).into_dyn().into()));
    fields.push(("srow_y", arr1(&header.srow_y).into_dyn().into()));
    fields.push(("srow_z", arr1(&header.srow_z).into_dyn().into()));
    fields.push(("intent_name", header.intent_name.as_slice().into()));
    fields.push(("magic", header.magic.as_slice().into()));

    let base_affine: ArrayD<f64> = arr2(&header.affine()).into_dyn();
    fields.push(("base_affine", base_affine.into()));

    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
