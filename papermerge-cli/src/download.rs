use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use futures_util::StreamExt;
use papermerge_core::{ArchiveType, PapermergeClient, PapermergeError, Response};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const FALLBACK_FILE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("at least one --node-id is required")]
    NoNodes,
    #[error(transparent)]
    Api(#[from] PapermergeError),
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_auth())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ArchiveFormat {
    #[default]
    Zip,
    Targz,
}

impl From<ArchiveFormat> for ArchiveType {
    fn from(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Zip => ArchiveType::Zip,
            ArchiveFormat::Targz => ArchiveType::Targz,
        }
    }
}

/// Picks where the archive is written: the caller's name as given, else the
/// server suggested name stripped to its last component, else `default`,
/// both inside `dir`.
pub fn output_path(dir: &Path, requested: Option<&Path>, suggested: Option<&str>) -> PathBuf {
    if let Some(requested) = requested {
        return requested.to_path_buf();
    }
    let name = suggested
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name != "..")
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    dir.join(name)
}

/// `<path>.partial`, next to the final file.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Downloads an archive of `node_ids` and returns the path it was saved to.
pub async fn download_archive(
    client: &PapermergeClient,
    node_ids: &[Uuid],
    format: ArchiveFormat,
    requested: Option<&Path>,
    dir: &Path,
) -> Result<PathBuf, DownloadError> {
    if node_ids.is_empty() {
        return Err(DownloadError::NoNodes);
    }
    let archive = client.download_nodes(node_ids, format.into()).await?;
    let path = output_path(dir, requested, archive.file_name.as_deref());
    let partial = partial_path(&path);
    match save(archive.into_response(), &partial).await {
        Ok(bytes) => {
            tokio::fs::rename(&partial, &path)
                .await
                .map_err(|source| DownloadError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(path = %path.display(), bytes, "archive saved");
            Ok(path)
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(err)
        }
    }
}

/// Streams the response body into `partial` and returns the byte count.
async fn save(response: Response, partial: &Path) -> Result<u64, DownloadError> {
    let io_error = |source: io::Error| DownloadError::Io {
        path: partial.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(partial).await.map_err(io_error)?;
    let mut stream = response.bytes_stream();
    let mut bytes = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(PapermergeError::from)?;
        file.write_all(&chunk).await.map_err(io_error)?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;
    Ok(bytes)
}
