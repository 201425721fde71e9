use papermerge_core::{Node, Paginator, PapermergeClient, PapermergeError, User};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 15;
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_ORDER_BY: &str = "-title";

#[derive(Debug, Error)]
pub enum ListError {
    #[error("page size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    InvalidPageSize(u32),
    #[error("page number must be at least 1")]
    InvalidPageNumber,
    #[error(transparent)]
    Api(#[from] PapermergeError),
}

impl ListError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_auth())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Folder to list; the user's home (or inbox) folder when unset.
    pub parent_id: Option<Uuid>,
    pub inbox: bool,
    pub page_number: u32,
    pub page_size: u32,
    pub order_by: Option<String>,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            parent_id: None,
            inbox: false,
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
            order_by: Some(DEFAULT_ORDER_BY.to_string()),
        }
    }
}

impl ListRequest {
    fn validate(&self) -> Result<(), ListError> {
        if self.page_number == 0 {
            return Err(ListError::InvalidPageNumber);
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ListError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }
}

/// An explicit parent wins over `--inbox`, which wins over the home folder.
pub fn resolve_parent(request: &ListRequest, user: &User) -> Uuid {
    match request.parent_id {
        Some(id) => id,
        None if request.inbox => user.inbox_folder_id,
        None => user.home_folder_id,
    }
}

/// Fetches one page of a folder's children. Listing is read-only and
/// user-observed, so errors are returned as-is without retry.
pub async fn list_nodes(
    client: &PapermergeClient,
    request: &ListRequest,
) -> Result<Paginator<Node>, ListError> {
    request.validate()?;
    let parent = match request.parent_id {
        Some(id) => id,
        None => resolve_parent(request, &client.get_me().await?),
    };
    tracing::debug!(%parent, page = request.page_number, "listing folder");
    Ok(client
        .list_children(
            parent,
            request.page_number,
            request.page_size,
            request.order_by.as_deref(),
        )
        .await?)
}
