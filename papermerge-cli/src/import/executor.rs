use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::plan::{ImportPlan, ImportTask, Target, TaskId, base_name};
use super::report::{FailureStage, ImportError, ImportFailure, ImportReport};
use crate::remote::NodeDirectory;
use crate::retry::RetryPolicy;

pub struct Importer<'a, D> {
    directory: &'a D,
    retry: RetryPolicy,
    delete_after_upload: bool,
    cancel: CancellationToken,
}

impl<'a, D: NodeDirectory> Importer<'a, D> {
    pub fn new(directory: &'a D, retry: RetryPolicy) -> Self {
        Self {
            directory,
            retry,
            delete_after_upload: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn delete_after_upload(mut self, delete: bool) -> Self {
        self.delete_after_upload = delete;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Imports `path` into `target`, or into the user's inbox when no target
    /// is given. Per-entry failures end up in the returned report.
    pub async fn import(
        &self,
        path: &Path,
        target: Option<Uuid>,
        progress: &mut dyn Write,
    ) -> Result<ImportReport, ImportError> {
        let plan = ImportPlan::build(path)?;
        let target = self.resolve_target(target).await?;
        Ok(self.execute(&plan, target, progress).await)
    }

    pub async fn resolve_target(&self, target: Option<Uuid>) -> Result<Uuid, ImportError> {
        match target {
            Some(id) => Ok(id),
            None => Ok(self.directory.current_user().await?.inbox_folder_id),
        }
    }

    pub async fn execute(
        &self,
        plan: &ImportPlan,
        root: Uuid,
        progress: &mut dyn Write,
    ) -> ImportReport {
        let mut report = ImportReport::new(root);
        for skipped in plan.skipped() {
            report.record(skipped.clone());
        }
        let mut folders: HashMap<TaskId, Uuid> = HashMap::new();
        let resolve = |folders: &HashMap<TaskId, Uuid>, target: &Target| match target {
            Target::Root => Some(root),
            Target::Folder(id) => folders.get(id).copied(),
        };

        for (id, task) in plan.tasks().iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(remaining = plan.tasks().len() - id, "import cancelled");
                report.cancelled = true;
                break;
            }
            match task {
                ImportTask::UploadFile { path, target } => {
                    // A missing parent means its folder failed and was already reported.
                    let Some(parent) = resolve(&folders, target) else {
                        continue;
                    };
                    writeln!(progress, "Importing {}", path.display()).ok();
                    match self.upload_file(path, parent).await {
                        Ok(document_id) => {
                            tracing::info!(
                                path = %path.display(),
                                %document_id,
                                "document uploaded"
                            );
                            report.documents += 1;
                            if self.delete_after_upload {
                                self.remove_file(path, &mut report).await;
                            }
                        }
                        Err(failure) => {
                            writeln!(progress, "Failed to import {}", path.display()).ok();
                            report.record(failure);
                        }
                    }
                }
                ImportTask::CreateFolder {
                    path,
                    title,
                    target,
                } => {
                    let Some(parent) = resolve(&folders, target) else {
                        continue;
                    };
                    let label = format!("create folder {}", path.display());
                    let created = self
                        .retry
                        .run(&label, &self.cancel, || {
                            self.directory.create_folder(parent, title)
                        })
                        .await;
                    match created {
                        Ok(folder_id) => {
                            tracing::info!(path = %path.display(), %folder_id, "folder created");
                            folders.insert(id, folder_id);
                            report.folders += 1;
                        }
                        Err(err) => {
                            writeln!(progress, "Failed to create folder '{title}'").ok();
                            let mut failure =
                                ImportFailure::remote(path, FailureStage::CreateFolder, &err);
                            failure.message = format!("{}; subtree skipped", failure.message);
                            report.record(failure);
                        }
                    }
                }
                ImportTask::FinishFolder { path, folder } => {
                    if self.delete_after_upload && folders.contains_key(folder) {
                        self.remove_dir_if_empty(path, &mut report).await;
                    }
                }
            }
        }
        report
    }

    /// Creates the document record, then uploads the content into it.
    async fn upload_file(&self, path: &Path, parent: Uuid) -> Result<Uuid, ImportFailure> {
        let file_name = base_name(path);
        let mime = mime_guess::from_path(path).first().ok_or_else(|| {
            ImportFailure::error(
                path,
                FailureStage::MediaType,
                format!("media type of {file_name} cannot be guessed"),
            )
        })?;
        // Opened once up front so an unreadable file never leaves an empty document behind.
        tokio::fs::File::open(path)
            .await
            .map_err(|err| ImportFailure::error(path, FailureStage::ReadLocal, err.to_string()))?;

        let label = format!("create document {}", path.display());
        let document_id = self
            .retry
            .run(&label, &self.cancel, || {
                self.directory.create_document(parent, &file_name)
            })
            .await
            .map_err(|err| ImportFailure::remote(path, FailureStage::CreateDocument, &err))?;

        let label = format!("upload {}", path.display());
        self.retry
            .run(&label, &self.cancel, || {
                self.directory
                    .upload_content(document_id, &file_name, path, mime.essence_str())
            })
            .await
            .map_err(|err| {
                let mut failure = ImportFailure::remote(path, FailureStage::UploadContent, &err);
                failure.message = format!(
                    "{}; empty document {document_id} left on server",
                    failure.message
                );
                failure
            })?;
        Ok(document_id)
    }

    async fn remove_file(&self, path: &Path, report: &mut ImportReport) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => report.deleted += 1,
            Err(err) => report.record(ImportFailure::warning(
                path,
                FailureStage::DeleteLocal,
                err.to_string(),
            )),
        }
    }

    async fn remove_dir_if_empty(&self, path: &Path, report: &mut ImportReport) {
        let empty = match tokio::fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(err) => {
                report.record(ImportFailure::warning(
                    path,
                    FailureStage::DeleteLocal,
                    err.to_string(),
                ));
                return;
            }
        };
        if !empty {
            tracing::debug!(path = %path.display(), "directory not empty; left in place");
            return;
        }
        match tokio::fs::remove_dir(path).await {
            Ok(()) => report.deleted += 1,
            Err(err) => report.record(ImportFailure::warning(
                path,
                FailureStage::DeleteLocal,
                err.to_string(),
            )),
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
