use clap::ValueEnum;
use papermerge_core::{PapermergeClient, PapermergeError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TagAction {
    /// Replace every tag of the node.
    #[value(name = "assign-tags", alias = "replace-tags")]
    Assign,
    /// Keep existing tags and add the given ones.
    #[value(name = "add-tags", alias = "append-tags")]
    Add,
    #[value(name = "remove-tags", alias = "delete-tags")]
    Remove,
}

/// Trims names, drops blanks and repeats; first occurrence wins.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Issues exactly one request. Tag changes are not retried.
pub async fn apply_tags(
    client: &PapermergeClient,
    node_id: Uuid,
    tags: &[String],
    action: TagAction,
) -> Result<(), PapermergeError> {
    tracing::info!(%node_id, ?action, count = tags.len(), "updating tags");
    match action {
        TagAction::Assign => client.assign_tags(node_id, tags).await,
        TagAction::Add => client.add_tags(node_id, tags).await,
        TagAction::Remove => client.remove_tags(node_id, tags).await,
    }
}
