use std::path::Path;

use papermerge_core::{Body, PapermergeClient, PapermergeError, User};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Remote operations the importer depends on.
///
/// Implemented by [`PapermergeClient`]; tests substitute an in-memory store.
#[allow(async_fn_in_trait)]
pub trait NodeDirectory {
    async fn current_user(&self) -> Result<User, PapermergeError>;

    async fn create_folder(&self, parent_id: Uuid, title: &str) -> Result<Uuid, PapermergeError>;

    async fn create_document(&self, parent_id: Uuid, title: &str) -> Result<Uuid, PapermergeError>;

    /// Sends the file at `source` as the document's content. Called once per
    /// attempt, so every call reads the file from the start.
    async fn upload_content(
        &self,
        document_id: Uuid,
        file_name: &str,
        source: &Path,
        mime_type: &str,
    ) -> Result<(), PapermergeError>;
}

impl NodeDirectory for PapermergeClient {
    async fn current_user(&self) -> Result<User, PapermergeError> {
        self.get_me().await
    }

    async fn create_folder(&self, parent_id: Uuid, title: &str) -> Result<Uuid, PapermergeError> {
        Ok(PapermergeClient::create_folder(self, parent_id, title)
            .await?
            .id)
    }

    async fn create_document(&self, parent_id: Uuid, title: &str) -> Result<Uuid, PapermergeError> {
        Ok(PapermergeClient::create_document(self, parent_id, title)
            .await?
            .id)
    }

    async fn upload_content(
        &self,
        document_id: Uuid,
        file_name: &str,
        source: &Path,
        mime_type: &str,
    ) -> Result<(), PapermergeError> {
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        self.upload_document_content(document_id, file_name, body, length, mime_type)
            .await
    }
}
