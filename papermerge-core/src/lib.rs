mod client;
mod host;
mod models;

pub use client::{
    ApiErrorClass, ArchiveType, DownloadedArchive, PapermergeClient, PapermergeError,
};
pub use host::sanitize_host;
pub use models::{
    CreatedNode, DocumentNode, NewNode, Node, NodeKind, NodeType, OcrStatus, Paginator, Tag,
    User, Version,
};
pub use reqwest::{Body, Response, StatusCode};
