use std::fmt;
use std::io;
use std::path::PathBuf;

use papermerge_core::PapermergeError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is neither a regular file nor a directory", .0.display())]
    UnsupportedEntry(PathBuf),
    #[error("failed to resolve target folder: {0}")]
    Api(#[from] PapermergeError),
    #[error("{}", incomplete_message(.0))]
    Incomplete(Box<ImportReport>),
}

impl ImportError {
    /// True when the server rejected the credentials, for the command as a
    /// whole or for any entry of an incomplete import.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Api(err) => err.is_auth(),
            Self::Incomplete(report) => report.has_auth_failure(),
            Self::Io { .. } | Self::UnsupportedEntry(_) => false,
        }
    }
}

fn incomplete_message(report: &ImportReport) -> String {
    let paths: Vec<String> = report
        .errors()
        .map(|failure| failure.path.display().to_string())
        .collect();
    if paths.is_empty() {
        return "import cancelled before all entries were processed".to_string();
    }
    format!(
        "{} path(s) could not be imported: {}",
        paths.len(),
        paths.join(", ")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    Scan,
    MediaType,
    ReadLocal,
    CreateFolder,
    CreateDocument,
    UploadContent,
    DeleteLocal,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureStage::Scan => "scan",
            FailureStage::MediaType => "media type",
            FailureStage::ReadLocal => "read",
            FailureStage::CreateFolder => "create folder",
            FailureStage::CreateDocument => "create document",
            FailureStage::UploadContent => "upload content",
            FailureStage::DeleteLocal => "delete local",
        };
        f.write_str(label)
    }
}

/// `Error` means the entry (or subtree) was not imported; `Warning` means it
/// was imported but a follow-up step, such as local deletion, did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub stage: FailureStage,
    pub severity: Severity,
    pub message: String,
    #[serde(skip)]
    pub auth: bool,
}

impl ImportFailure {
    pub fn error(
        path: impl Into<PathBuf>,
        stage: FailureStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            stage,
            severity: Severity::Error,
            message: message.into(),
            auth: false,
        }
    }

    pub fn warning(
        path: impl Into<PathBuf>,
        stage: FailureStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(path, stage, message)
        }
    }

    pub fn remote(path: impl Into<PathBuf>, stage: FailureStage, err: &PapermergeError) -> Self {
        Self {
            auth: err.is_auth(),
            ..Self::error(path, stage, err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportOutcome {
    Complete,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub target: Uuid,
    pub documents: usize,
    pub folders: usize,
    pub deleted: usize,
    pub cancelled: bool,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn new(target: Uuid) -> Self {
        Self {
            target,
            documents: 0,
            folders: 0,
            deleted: 0,
            cancelled: false,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, failure: ImportFailure) {
        match failure.severity {
            Severity::Error => tracing::error!(
                path = %failure.path.display(),
                stage = %failure.stage,
                "{}",
                failure.message
            ),
            Severity::Warning => tracing::warn!(
                path = %failure.path.display(),
                stage = %failure.stage,
                "{}",
                failure.message
            ),
        }
        self.failures.push(failure);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ImportFailure> {
        self.failures
            .iter()
            .filter(|failure| failure.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ImportFailure> {
        self.failures
            .iter()
            .filter(|failure| failure.severity == Severity::Warning)
    }

    pub fn has_auth_failure(&self) -> bool {
        self.failures.iter().any(|failure| failure.auth)
    }

    pub fn outcome(&self) -> ImportOutcome {
        if self.cancelled {
            ImportOutcome::Cancelled
        } else if self.errors().next().is_none() {
            ImportOutcome::Complete
        } else if self.documents + self.folders == 0 {
            ImportOutcome::Failed
        } else {
            ImportOutcome::CompletedWithErrors
        }
    }

    /// Turns a report with failed entries into [`ImportError::Incomplete`].
    pub fn into_result(self) -> Result<ImportReport, ImportError> {
        if self.errors().next().is_none() && !self.cancelled {
            Ok(self)
        } else {
            Err(ImportError::Incomplete(Box::new(self)))
        }
    }
}
