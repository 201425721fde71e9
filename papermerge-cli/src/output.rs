//! Table and JSON rendering of command results.

use std::io::{self, Write};

use papermerge_core::{Node, NodeType, Paginator, User, Version};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::import::ImportReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    Json,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "UUID")]
    id: String,
    #[tabled(rename = "Tags")]
    tags: String,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        let kind = match node.node_type() {
            NodeType::Folder => "folder".to_string(),
            NodeType::Document => match node.document() {
                Some(doc) => format!("document ({:?})", doc.ocr_status).to_lowercase(),
                None => "document".to_string(),
            },
        };
        Self {
            kind,
            title: node.title.clone(),
            id: node.id.to_string(),
            tags: node.tag_names().join(", "),
        }
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

pub fn write_nodes(
    out: &mut dyn Write,
    page: &Paginator<Node>,
    format: OutputFormat,
) -> io::Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, page);
    }
    if page.items.is_empty() {
        return writeln!(out, "Empty folder");
    }
    writeln!(out, "Page={} of {}", page.page_number, page.num_pages)?;
    let rows: Vec<NodeRow> = page.items.iter().map(NodeRow::from).collect();
    writeln!(out, "{}", Table::new(rows))
}

pub fn write_user(out: &mut dyn Write, user: &User, format: OutputFormat) -> io::Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, user);
    }
    writeln!(out, "  {:<16} {}", "ID:", user.id)?;
    writeln!(out, "  {:<16} {}", "Username:", user.username)?;
    writeln!(out, "  {:<16} {}", "Email:", user.email)?;
    writeln!(out, "  {:<16} {}", "Home folder:", user.home_folder_id)?;
    writeln!(out, "  {:<16} {}", "Inbox folder:", user.inbox_folder_id)
}

pub fn write_version(
    out: &mut dyn Write,
    version: &Version,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(out, version),
        OutputFormat::Table => writeln!(out, "REST API version: {}", version.version),
    }
}

pub fn write_import_report(
    out: &mut dyn Write,
    report: &ImportReport,
    format: OutputFormat,
) -> io::Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, report);
    }
    writeln!(
        out,
        "Imported {} document(s) and {} folder(s) into {}",
        report.documents, report.folders, report.target
    )?;
    if report.deleted > 0 {
        writeln!(out, "Deleted {} local entries", report.deleted)?;
    }
    if report.cancelled {
        writeln!(out, "Import cancelled before all entries were processed")?;
    }
    if report.failures.is_empty() {
        return Ok(());
    }
    let rows: Vec<FailureRow> = report
        .failures
        .iter()
        .map(|failure| FailureRow {
            path: failure.path.display().to_string(),
            stage: failure.stage.to_string(),
            severity: format!("{:?}", failure.severity).to_lowercase(),
            message: failure.message.clone(),
        })
        .collect();
    writeln!(out, "{}", Table::new(rows))
}
