use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    Document,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Folder => "folder",
            NodeType::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OcrStatus {
    #[default]
    Unknown,
    Received,
    Started,
    Success,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub bg_color: String,
    pub fg_color: String,
}

/// OCR attributes carried only by document nodes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct DocumentNode {
    #[serde(default = "default_ocr")]
    pub ocr: bool,
    #[serde(default)]
    pub ocr_status: OcrStatus,
}

impl Default for DocumentNode {
    fn default() -> Self {
        Self {
            ocr: true,
            ocr_status: OcrStatus::Unknown,
        }
    }
}

fn default_ocr() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Document(DocumentNode),
}

/// A child entry returned by the node listing endpoint.
///
/// The wire format carries `ctype` and an optional `document` object side by
/// side; they are folded into [`NodeKind`] so that a folder can never hold
/// OCR fields.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: Uuid,
    pub title: String,
    pub kind: NodeKind,
    pub tags: Vec<Tag>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Folder => NodeType::Folder,
            NodeKind::Document(_) => NodeType::Document,
        }
    }

    pub fn document(&self) -> Option<&DocumentNode> {
        match &self.kind {
            NodeKind::Document(document) => Some(document),
            NodeKind::Folder => None,
        }
    }

    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.iter().map(|tag| tag.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawNode {
    id: Uuid,
    title: String,
    ctype: NodeType,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    parent_id: Option<Uuid>,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document: Option<DocumentNode>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        let kind = match raw.ctype {
            NodeType::Folder => NodeKind::Folder,
            NodeType::Document => NodeKind::Document(raw.document.unwrap_or_default()),
        };
        Self {
            id: raw.id,
            title: raw.title,
            kind,
            tags: raw.tags,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            parent_id: raw.parent_id,
            user_id: raw.user_id,
        }
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let (ctype, document) = match node.kind {
            NodeKind::Folder => (NodeType::Folder, None),
            NodeKind::Document(document) => (NodeType::Document, Some(document)),
        };
        Self {
            id: node.id,
            title: node.title,
            ctype,
            tags: node.tags,
            created_at: node.created_at,
            updated_at: node.updated_at,
            parent_id: node.parent_id,
            user_id: node.user_id,
            document,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub home_folder_id: Uuid,
    pub inbox_folder_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Paginator<T> {
    pub page_size: u32,
    pub page_number: u32,
    pub num_pages: u32,
    pub items: Vec<T>,
}

/// Body of `POST /api/nodes/`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewNode {
    pub title: String,
    pub ctype: NodeType,
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl NewNode {
    pub fn folder(title: impl Into<String>, parent_id: Uuid) -> Self {
        Self {
            title: title.into(),
            ctype: NodeType::Folder,
            parent_id: Some(parent_id),
            file_name: None,
        }
    }

    pub fn document(title: impl Into<String>, parent_id: Uuid) -> Self {
        let title = title.into();
        Self {
            file_name: Some(title.clone()),
            title,
            ctype: NodeType::Document,
            parent_id: Some(parent_id),
        }
    }
}

/// The part of a freshly created folder or document the client relies on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CreatedNode {
    pub id: Uuid,
    pub title: String,
    pub ctype: NodeType,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Version {
    pub version: String,
}
