//! Mirroring of a local file or directory tree onto a remote folder.
//!
//! [`ImportPlan::build`] walks the local tree once and produces an ordered
//! list of [`ImportTask`]s; [`Importer`] applies them one at a time, keeping
//! failures contained to the file or subtree they belong to.

mod executor;
mod plan;
mod report;

pub use executor::Importer;
pub use plan::{ImportPlan, ImportTask, Target, TaskId};
pub use report::{FailureStage, ImportError, ImportFailure, ImportOutcome, ImportReport, Severity};
