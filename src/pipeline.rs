//! One validation-and-staging run.

use crate::config::{JobConfig, Workspace};
use crate::error::Result;
use crate::report::ValidationReport;
use crate::stage;
use crate::validate;

/// Validate the BOLD input, stage every artifact, and write the report.
///
/// Validation and staging failures are recorded in the returned report.
/// Only a report that cannot be serialized or written is an error.
pub fn run(job: &JobConfig, workspace: &Workspace) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();

    let bold = workspace.resolve(&job.bold);
    validate::validate_bold(&bold, &workspace.preview_dir(), &mut report);

    let staged = stage::stage_artifacts(job, workspace, &mut report);

    report.write(workspace.product_path())?;
    tracing::info!(
        errors = report.errors().len(),
        warnings = report.warnings().len(),
        staged = staged.len(),
        "wrote {}",
        workspace.product_path().display()
    );
    Ok(report)
}
