//! Staging of validated inputs into the `output/` tree.
//!
//! Every artifact lands at a fixed destination as a relative symlink. An
//! existing entry at the destination is removed first, so re-running the
//! stager converges on the same links.

use crate::config::{JobConfig, Workspace};
use crate::error::Result;
use crate::report::ValidationReport;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A stageable input kind and its fixed destination under `output/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub name: &'static str,
    pub file_name: &'static str,
}

impl Artifact {
    pub const BOLD: Artifact = Artifact { name: "bold", file_name: "bold.nii.gz" };
    pub const EVENTS: Artifact = Artifact { name: "events", file_name: "events.tsv" };
    pub const SBREF: Artifact = Artifact { name: "sbref", file_name: "sbref.nii.gz" };
    pub const PHYSIO: Artifact = Artifact { name: "physio", file_name: "physio.tsv.gz" };
    pub const PHYSIO_JSON: Artifact = Artifact { name: "physio_json", file_name: "physio.json" };

    pub fn destination(&self, workspace: &Workspace) -> PathBuf {
        workspace.output_dir().join(self.file_name)
    }
}

/// A source it was linked from and the link that now points at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Lexically resolve `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path of `target` as seen from directory `base`, computed without
/// touching the filesystem.
///
/// Falls back to `target` itself when the two share no root.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = normalize(base);
    let target = normalize(target);
    if base.has_root() != target.has_root() {
        return target;
    }

    let base_parts: Vec<_> = base.components().collect();
    let target_parts: Vec<_> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let rest = &target_parts[common..];
    if matches!(rest.first(), Some(Component::Prefix(_) | Component::RootDir)) {
        return rest.iter().collect();
    }

    let mut relative: PathBuf = base_parts[common..]
        .iter()
        .map(|_| Component::ParentDir)
        .collect();
    relative.extend(rest);
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Replace whatever sits at `destination` with a relative symlink to `source`.
pub fn stage_link(source: &Path, destination: &Path) -> Result<StagedArtifact> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    // symlink_metadata also sees dangling links
    if let Ok(meta) = fs::symlink_metadata(destination) {
        if meta.is_dir() {
            fs::remove_dir_all(destination)?;
        } else {
            fs::remove_file(destination)?;
        }
    }

    let target = relative_path(parent, source);
    symlink(&target, destination)?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        destination = %destination.display(),
        "linked"
    );
    Ok(StagedArtifact {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
    })
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Read a tab-separated events table row by row. Returns the row count.
pub fn read_events(path: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        tracing::debug!(row = ?record.iter().collect::<Vec<_>>(), "events row");
        rows += 1;
    }
    Ok(rows)
}

/// Stage bold and every configured optional input that exists on disk.
///
/// Each artifact is its own failure boundary: a failure appends one error
/// naming the artifact and staging moves on to the next.
pub fn stage_artifacts(
    job: &JobConfig,
    workspace: &Workspace,
    report: &mut ValidationReport,
) -> Vec<StagedArtifact> {
    let mut staged = Vec::new();

    let bold = workspace.resolve(&job.bold);
    match stage_link(&bold, &Artifact::BOLD.destination(workspace)) {
        Ok(artifact) => staged.push(artifact),
        Err(e) => report.error(format!("failed to stage bold ..  error code: {}", e)),
    }

    if let Some(events) = existing(workspace, job.events.as_deref()) {
        tracing::info!("staging events");
        let result = read_events(&events)
            .and_then(|_| stage_link(&events, &Artifact::EVENTS.destination(workspace)));
        match result {
            Ok(artifact) => staged.push(artifact),
            Err(e) => report.error(format!("failed to validate events ..  error code: {}", e)),
        }
    }

    let opaque = [
        (Artifact::SBREF, job.sbref.as_deref()),
        (Artifact::PHYSIO, job.physio.as_deref()),
        (Artifact::PHYSIO_JSON, job.physio_json.as_deref()),
    ];
    for (artifact, configured) in opaque {
        let Some(source) = existing(workspace, configured) else {
            continue;
        };
        tracing::info!("staging {}", artifact.name);
        staged.extend(stage_opaque(
            artifact,
            &source,
            &artifact.destination(workspace),
            report,
        ));
    }

    staged
}

/// Link an artifact staged without content checks, recording any failure.
fn stage_opaque(
    artifact: Artifact,
    source: &Path,
    destination: &Path,
    report: &mut ValidationReport,
) -> Option<StagedArtifact> {
    stage_link(source, destination)
        .map_err(|e| {
            report.error(format!(
                "failed to stage {} ..  error code: {}",
                artifact.name, e
            ))
        })
        .ok()
}

fn existing(workspace: &Workspace, configured: Option<&Path>) -> Option<PathBuf> {
    let path = workspace.resolve(configured?);
    path.exists().then_some(path)
}
