use super::*;
use crate::import::{ImportOutcome, Severity};
use crate::retry::Backoff;
use papermerge_core::{PapermergeError, StatusCode, User};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

const ROOT: Uuid = Uuid::from_u128(1);
const INBOX: Uuid = Uuid::from_u128(2);

/// In-memory server that logs every attempt and fails the ones it was told to.
#[derive(Default)]
struct FakeDirectory {
    log: Mutex<Vec<String>>,
    titles: Mutex<HashMap<Uuid, String>>,
    failures: Mutex<HashMap<String, (u16, u32)>>,
}

impl FakeDirectory {
    fn fail(self, key: &str, status: u16, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), (status, times));
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn attempts(&self, key: &str) -> usize {
        self.log().iter().filter(|entry| *entry == key).count()
    }

    fn name_of(&self, id: Uuid) -> String {
        if id == ROOT {
            return "root".to_string();
        }
        if id == INBOX {
            return "inbox".to_string();
        }
        self.titles
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn attempt(&self, key: String) -> Result<(), PapermergeError> {
        self.log.lock().unwrap().push(key.clone());
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&key) {
            Some((status, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(PapermergeError::Api {
                    status: StatusCode::from_u16(*status).unwrap(),
                    body: String::new(),
                    retry_after: None,
                })
            }
            _ => Ok(()),
        }
    }

    fn create(&self, key: String, title: &str) -> Result<Uuid, PapermergeError> {
        self.attempt(key)?;
        let id = Uuid::new_v4();
        self.titles.lock().unwrap().insert(id, title.to_string());
        Ok(id)
    }
}

impl NodeDirectory for FakeDirectory {
    async fn current_user(&self) -> Result<User, PapermergeError> {
        Ok(User {
            id: Uuid::from_u128(3),
            username: "admin".into(),
            email: "admin@example.com".into(),
            created_at: None,
            updated_at: None,
            home_folder_id: Uuid::from_u128(4),
            inbox_folder_id: INBOX,
        })
    }

    async fn create_folder(&self, parent_id: Uuid, title: &str) -> Result<Uuid, PapermergeError> {
        self.create(format!("mkdir {title} in {}", self.name_of(parent_id)), title)
    }

    async fn create_document(
        &self,
        parent_id: Uuid,
        title: &str,
    ) -> Result<Uuid, PapermergeError> {
        self.create(format!("create {title} in {}", self.name_of(parent_id)), title)
    }

    async fn upload_content(
        &self,
        document_id: Uuid,
        file_name: &str,
        source: &Path,
        mime_type: &str,
    ) -> Result<(), PapermergeError> {
        assert_eq!(self.name_of(document_id), file_name);
        assert!(std::fs::metadata(source).unwrap().len() > 0);
        self.attempt(format!("upload {file_name} as {mime_type}"))
    }
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(10, Backoff::new(Duration::ZERO, Duration::ZERO, false))
}

/// invoice.pdf, sub/a.pdf, sub/b.pdf
fn scenario_tree() -> TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("invoice.pdf"), b"%PDF-invoice").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/a.pdf"), b"%PDF-a").unwrap();
    std::fs::write(dir.path().join("sub/b.pdf"), b"%PDF-b").unwrap();
    dir
}

async fn run_import(
    directory: &FakeDirectory,
    root: &Path,
    delete: bool,
) -> (ImportReport, String) {
    let mut progress = Vec::new();
    let report = Importer::new(directory, instant_retry())
        .delete_after_upload(delete)
        .import(root, Some(ROOT), &mut progress)
        .await
        .unwrap();
    (report, String::from_utf8(progress).unwrap())
}

#[tokio::test]
async fn mirrors_tree_in_walk_order() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default();

    let (report, progress) = run_import(&directory, dir.path(), false).await;

    assert_eq!(
        directory.log(),
        vec![
            "create invoice.pdf in root",
            "upload invoice.pdf as application/pdf",
            "mkdir sub in root",
            "create a.pdf in sub",
            "upload a.pdf as application/pdf",
            "create b.pdf in sub",
            "upload b.pdf as application/pdf",
        ]
    );
    assert_eq!(report.outcome(), ImportOutcome::Complete);
    assert_eq!((report.documents, report.folders, report.deleted), (3, 1, 0));
    assert!(progress.contains("Importing"));
    assert!(dir.path().join("sub/a.pdf").exists());
}

#[tokio::test]
async fn folder_client_error_skips_its_subtree_only() {
    let dir = scenario_tree();
    std::fs::write(dir.path().join("z.pdf"), b"%PDF-z").unwrap();
    let directory = FakeDirectory::default().fail("mkdir sub in root", 400, u32::MAX);

    let (report, _) = run_import(&directory, dir.path(), false).await;

    assert_eq!(
        directory.log(),
        vec![
            "create invoice.pdf in root",
            "upload invoice.pdf as application/pdf",
            "mkdir sub in root",
            "create z.pdf in root",
            "upload z.pdf as application/pdf",
        ]
    );
    assert_eq!(report.outcome(), ImportOutcome::CompletedWithErrors);
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].path.ends_with("sub"));
    assert_eq!(errors[0].stage, FailureStage::CreateFolder);
    assert!(errors[0].message.contains("subtree skipped"));

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("sub"));
}

#[tokio::test]
async fn failed_sibling_does_not_stop_the_next_one() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default().fail("create a.pdf in sub", 422, u32::MAX);

    let (report, _) = run_import(&directory, dir.path(), false).await;

    assert_eq!(directory.attempts("create a.pdf in sub"), 1);
    assert_eq!(directory.attempts("upload b.pdf as application/pdf"), 1);
    assert_eq!(report.documents, 2);
    assert_eq!(report.errors().count(), 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_attempts_run_out() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default().fail("mkdir sub in root", 502, u32::MAX);

    let (report, _) = run_import(&directory, dir.path(), false).await;

    assert_eq!(directory.attempts("mkdir sub in root"), 10);
    assert_eq!(directory.attempts("create a.pdf in sub"), 0);
    assert_eq!(report.documents, 1);
    assert_eq!(report.outcome(), ImportOutcome::CompletedWithErrors);
}

#[tokio::test]
async fn transient_upload_failure_recovers_without_new_document() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("invoice.pdf");
    std::fs::write(&file, b"%PDF").unwrap();
    let directory =
        FakeDirectory::default().fail("upload invoice.pdf as application/pdf", 503, 2);

    let (report, _) = run_import(&directory, &file, false).await;

    assert_eq!(directory.attempts("create invoice.pdf in root"), 1);
    assert_eq!(directory.attempts("upload invoice.pdf as application/pdf"), 3);
    assert_eq!(report.outcome(), ImportOutcome::Complete);
}

#[tokio::test]
async fn content_failure_names_the_empty_document() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("invoice.pdf");
    std::fs::write(&file, b"%PDF").unwrap();
    let directory =
        FakeDirectory::default().fail("upload invoice.pdf as application/pdf", 413, u32::MAX);

    let (report, _) = run_import(&directory, &file, true).await;

    assert_eq!(report.outcome(), ImportOutcome::Failed);
    assert_eq!(report.failures[0].stage, FailureStage::UploadContent);
    assert!(report.failures[0].message.contains("left on server"));
    assert!(file.exists());
}

#[tokio::test]
async fn delete_removes_only_confirmed_uploads() {
    let dir = scenario_tree();
    let directory =
        FakeDirectory::default().fail("upload b.pdf as application/pdf", 400, u32::MAX);

    let (report, _) = run_import(&directory, dir.path(), true).await;

    assert!(!dir.path().join("invoice.pdf").exists());
    assert!(!dir.path().join("sub/a.pdf").exists());
    assert!(dir.path().join("sub/b.pdf").exists());
    assert!(dir.path().join("sub").is_dir());
    assert_eq!(report.deleted, 2);
    assert_eq!(report.warnings().count(), 0);
}

#[tokio::test]
async fn delete_removes_emptied_directories_but_not_the_root() {
    let dir = scenario_tree();
    std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
    std::fs::write(dir.path().join("sub/deeper/c.pdf"), b"%PDF-c").unwrap();
    let directory = FakeDirectory::default();

    let (report, _) = run_import(&directory, dir.path(), true).await;

    assert_eq!(report.outcome(), ImportOutcome::Complete);
    assert!(!dir.path().join("sub").exists());
    assert!(dir.path().is_dir());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    // 4 files + deeper + sub
    assert_eq!(report.deleted, 6);
}

#[tokio::test]
async fn directory_whose_folder_failed_is_kept() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default().fail("mkdir sub in root", 400, u32::MAX);

    run_import(&directory, dir.path(), true).await;

    assert!(!dir.path().join("invoice.pdf").exists());
    assert!(dir.path().join("sub/a.pdf").exists());
}

#[tokio::test]
async fn unknown_media_type_fails_before_any_remote_call() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("README");
    std::fs::write(&file, b"plain").unwrap();
    let directory = FakeDirectory::default();

    let (report, _) = run_import(&directory, &file, true).await;

    assert!(directory.log().is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::MediaType);
    assert_eq!(report.failures[0].severity, Severity::Error);
    assert!(file.exists());
}

#[tokio::test]
async fn auth_failure_is_flagged_and_not_retried() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default().fail("mkdir sub in root", 401, u32::MAX);

    let (report, _) = run_import(&directory, dir.path(), false).await;

    assert_eq!(directory.attempts("mkdir sub in root"), 1);
    assert!(report.has_auth_failure());
}

#[tokio::test]
async fn missing_target_defaults_to_inbox() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("invoice.pdf");
    std::fs::write(&file, b"%PDF").unwrap();
    let directory = FakeDirectory::default();

    let report = Importer::new(&directory, instant_retry())
        .import(&file, None, &mut std::io::sink())
        .await
        .unwrap();

    assert_eq!(report.target, INBOX);
    assert_eq!(directory.log()[0], "create invoice.pdf in inbox");
}

#[tokio::test]
async fn cancelled_import_stops_before_next_task() {
    let dir = scenario_tree();
    let directory = FakeDirectory::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Importer::new(&directory, instant_retry())
        .with_cancellation(cancel)
        .import(dir.path(), Some(ROOT), &mut std::io::sink())
        .await
        .unwrap();

    assert!(directory.log().is_empty());
    assert_eq!(report.outcome(), ImportOutcome::Cancelled);
}

#[tokio::test]
async fn missing_local_path_is_fatal() {
    let dir = tempdir().unwrap();
    let directory = FakeDirectory::default();

    let err = Importer::new(&directory, instant_retry())
        .import(&dir.path().join("gone"), Some(ROOT), &mut std::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Io { .. }));
}
