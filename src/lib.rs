//! # boldcheck
//!
//! Validation and staging for a single BOLD fMRI acquisition.
//!
//! A run reads a job configuration, checks the BOLD volume (gzip framing,
//! dimensionality, orientation of the voxel-to-world transform), renders
//! mid-volume preview slices, links the accepted inputs into `output/`,
//! and writes everything it found to `product.json`.
//!
//! ## Quick start
//!
//! ```ignore
//! use boldcheck::{JobConfig, Workspace};
//!
//! let workspace = Workspace::new("/job");
//! let job = JobConfig::from_file(workspace.resolve("config.json".as_ref()))?;
//! let report = boldcheck::run(&job, &workspace)?;
//! for error in report.errors() {
//!     eprintln!("{}", error);
//! }
//! ```

pub mod config;
pub mod error;
pub mod nifti;
pub mod pipeline;
pub mod preview;
pub mod report;
pub mod stage;
pub mod validate;

pub use config::{JobConfig, Workspace};
pub use error::{Error, Result};
pub use pipeline::run;
pub use report::{MetaValue, ValidationReport};
pub use stage::StagedArtifact;
