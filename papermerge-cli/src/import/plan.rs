use std::fs;
use std::path::{Path, PathBuf};

use super::report::{FailureStage, ImportError, ImportFailure};

/// Index of a [`ImportTask::CreateFolder`] within its plan.
pub type TaskId = usize;

/// Remote folder a task writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The folder the import was started against.
    Root,
    /// The folder produced by an earlier `CreateFolder` task.
    Folder(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTask {
    UploadFile { path: PathBuf, target: Target },
    CreateFolder {
        path: PathBuf,
        title: String,
        target: Target,
    },
    /// Emitted after every task of a folder's subtree.
    FinishFolder { path: PathBuf, folder: TaskId },
}

impl ImportTask {
    pub fn path(&self) -> &Path {
        match self {
            ImportTask::UploadFile { path, .. }
            | ImportTask::CreateFolder { path, .. }
            | ImportTask::FinishFolder { path, .. } => path,
        }
    }
}

/// Depth-first task list for one import.
///
/// A `CreateFolder` always precedes the tasks targeting it, and the matching
/// `FinishFolder` always follows them.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    tasks: Vec<ImportTask>,
    skipped: Vec<ImportFailure>,
}

impl ImportPlan {
    pub fn build(root: &Path) -> Result<Self, ImportError> {
        let meta = fs::metadata(root).map_err(|source| ImportError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let mut plan = Self::default();
        if meta.is_file() {
            plan.tasks.push(ImportTask::UploadFile {
                path: root.to_path_buf(),
                target: Target::Root,
            });
        } else if meta.is_dir() {
            plan.walk(root, Target::Root)?;
        } else {
            return Err(ImportError::UnsupportedEntry(root.to_path_buf()));
        }
        Ok(plan)
    }

    pub fn tasks(&self) -> &[ImportTask] {
        &self.tasks
    }

    /// Local entries that were found but cannot be imported.
    pub fn skipped(&self) -> &[ImportFailure] {
        &self.skipped
    }

    pub fn file_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| matches!(task, ImportTask::UploadFile { .. }))
            .count()
    }

    fn walk(&mut self, dir: &Path, target: Target) -> Result<(), ImportError> {
        let entries = fs::read_dir(dir).map_err(|source| ImportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut children = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => children.push(entry.path()),
                Err(err) => self.skipped.push(ImportFailure::error(
                    dir,
                    FailureStage::Scan,
                    format!("cannot read directory entry: {err}"),
                )),
            }
        }
        children.sort();

        for path in children {
            let kind = match classify(&path) {
                Ok(kind) => kind,
                Err(reason) => {
                    self.skipped
                        .push(ImportFailure::error(&path, FailureStage::Scan, reason));
                    continue;
                }
            };
            match kind {
                EntryKind::File => self.tasks.push(ImportTask::UploadFile { path, target }),
                EntryKind::Dir => self.push_folder(path, target),
            }
        }
        Ok(())
    }

    fn push_folder(&mut self, path: PathBuf, target: Target) {
        let id = self.tasks.len();
        let mark = self.skipped.len();
        self.tasks.push(ImportTask::CreateFolder {
            path: path.clone(),
            title: base_name(&path),
            target,
        });
        if let Err(err) = self.walk(&path, Target::Folder(id)) {
            // An unreadable directory is not mirrored at all.
            self.tasks.truncate(id);
            self.skipped.truncate(mark);
            self.skipped.push(ImportFailure::error(
                &path,
                FailureStage::Scan,
                err.to_string(),
            ));
            return;
        }
        self.tasks.push(ImportTask::FinishFolder { path, folder: id });
    }
}

enum EntryKind {
    File,
    Dir,
}

fn classify(path: &Path) -> Result<EntryKind, String> {
    let link = fs::symlink_metadata(path).map_err(|err| err.to_string())?;
    if link.file_type().is_symlink() {
        let target = fs::metadata(path).map_err(|err| format!("broken symlink: {err}"))?;
        return if target.is_file() {
            Ok(EntryKind::File)
        } else {
            Err("symlink to a directory or special file is not followed".to_string())
        };
    }
    if link.is_file() {
        Ok(EntryKind::File)
    } else if link.is_dir() {
        Ok(EntryKind::Dir)
    } else {
        Err("not a regular file or directory".to_string())
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
