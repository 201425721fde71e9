//! Command line surface and dispatch.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use papermerge_core::{PapermergeClient, PapermergeError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{CliConfig, EnvLookup, HOST_ENV, TOKEN_ENV, process_env};
use crate::download::{ArchiveFormat, DownloadError, download_archive};
use crate::import::{ImportError, ImportOutcome, Importer};
use crate::lister::{DEFAULT_ORDER_BY, ListError, ListRequest, list_nodes};
use crate::output::{OutputFormat, write_import_report, write_nodes, write_user, write_version};
use crate::tags::{TagAction, apply_tags, normalize_tags};

/// Exit status of an import that finished but left some entries behind.
pub const EXIT_COMPLETED_WITH_ERRORS: u8 = 2;
pub const EXIT_CANCELLED: u8 = 130;

/// Command line client for a Papermerge document management server
#[derive(Debug, Parser)]
#[command(name = "papermerge-cli", version, about, long_about = None)]
pub struct Cli {
    /// REST API host, e.g. http://localhost:8000
    #[arg(long, global = true, env = HOST_ENV, hide_env_values = true)]
    pub host: Option<String>,

    /// Authorization token
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Defaults to `ls` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a file or recursively a folder
    Import(ImportArgs),
    /// List the contents of a folder
    Ls(LsArgs),
    /// Show the current user
    Me,
    /// Change the tags of a node
    Node(NodeArgs),
    /// Show the REST API version of the server
    ServerVersion,
    /// Download nodes as a zip or tar.gz archive
    Download(DownloadArgs),
}

#[derive(Debug, clap::Args)]
pub struct ImportArgs {
    /// Local file or folder
    pub path: PathBuf,
    /// Remote folder to import into; the inbox when omitted
    #[arg(long)]
    pub target_id: Option<Uuid>,
    /// Delete local files and emptied folders after a successful upload
    #[arg(long)]
    pub delete: bool,
}

#[derive(Debug, clap::Args)]
pub struct LsArgs {
    /// Folder to list; the home folder when omitted
    #[arg(long)]
    pub parent_id: Option<Uuid>,
    /// List the inbox instead of the home folder
    #[arg(long)]
    pub inbox: bool,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub page_number: u32,
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: u32,
    /// Field to sort by; prefix with `-` for descending order
    #[arg(long, default_value = DEFAULT_ORDER_BY)]
    pub order_by: String,
}

impl From<LsArgs> for ListRequest {
    fn from(args: LsArgs) -> Self {
        Self {
            parent_id: args.parent_id,
            inbox: args.inbox,
            page_number: args.page_number,
            page_size: args.page_size,
            order_by: Some(args.order_by),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct NodeArgs {
    pub node_id: Uuid,
    #[arg(value_enum)]
    pub action: TagAction,
    #[arg(required = true, num_args = 1..)]
    pub tags: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct DownloadArgs {
    /// Node to include; repeat for several nodes
    #[arg(short = 'u', long = "node-id", required = true)]
    pub node_ids: Vec<Uuid>,
    /// Where to save the archive; the server's suggested name when omitted
    #[arg(short, long)]
    pub file_name: Option<PathBuf>,
    #[arg(short = 't', long, value_enum, default_value = "zip")]
    pub archive_type: ArchiveFormat,
}

pub fn exit_code(outcome: ImportOutcome) -> u8 {
    match outcome {
        ImportOutcome::Complete => 0,
        ImportOutcome::CompletedWithErrors => EXIT_COMPLETED_WITH_ERRORS,
        ImportOutcome::Failed => 1,
        ImportOutcome::Cancelled => EXIT_CANCELLED,
    }
}

pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    run_with_env(cli, &process_env, out).await
}

pub async fn run_with_env(
    cli: Cli,
    lookup: EnvLookup<'_>,
    out: &mut dyn Write,
) -> anyhow::Result<ExitCode> {
    let config = CliConfig::resolve(cli.host, cli.token, lookup)?;
    let client = config.client()?;
    let format = cli.format;

    match cli.command {
        None => list(&client, &ListRequest::default(), format, out).await?,
        Some(Commands::Ls(args)) => list(&client, &args.into(), format, out).await?,
        Some(Commands::Me) => write_user(out, &client.get_me().await?, format)?,
        Some(Commands::ServerVersion) => {
            write_version(out, &client.get_server_version().await?, format)?
        }
        Some(Commands::Node(args)) => {
            let tags = normalize_tags(&args.tags);
            if tags.is_empty() {
                anyhow::bail!("no tag names given");
            }
            apply_tags(&client, args.node_id, &tags, args.action).await?;
        }
        Some(Commands::Download(args)) => {
            let path = download_archive(
                &client,
                &args.node_ids,
                args.archive_type,
                args.file_name.as_deref(),
                Path::new("."),
            )
            .await?;
            writeln!(out, "Saved {}", path.display())?;
        }
        Some(Commands::Import(args)) => {
            let code = import(&client, &config, args, format, out).await?;
            return Ok(ExitCode::from(code));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn list(
    client: &PapermergeClient,
    request: &ListRequest,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let page = list_nodes(client, request).await?;
    write_nodes(out, &page, format)?;
    Ok(())
}

async fn import(
    client: &PapermergeClient,
    config: &CliConfig,
    args: ImportArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after the current request");
                cancel.cancel();
            }
        }
    });

    let importer = Importer::new(client, config.retry)
        .delete_after_upload(args.delete)
        .with_cancellation(cancel);
    let result = match format {
        OutputFormat::Table => importer.import(&args.path, args.target_id, out).await,
        OutputFormat::Json => {
            importer
                .import(&args.path, args.target_id, &mut io::sink())
                .await
        }
    };
    interrupt.abort();

    let report = result?;
    write_import_report(out, &report, format)?;
    let code = exit_code(report.outcome());
    let auth_failed = report.has_auth_failure();
    if let Err(err) = report.into_result() {
        eprintln!("Error: {err}");
    }
    if auth_failed {
        eprintln!("{}", auth_hint());
    }
    Ok(code)
}

fn auth_hint() -> String {
    format!("authentication failed; check {HOST_ENV} and {TOKEN_ENV}")
}

fn is_auth_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(err) = cause.downcast_ref::<PapermergeError>() {
            err.is_auth()
        } else if let Some(err) = cause.downcast_ref::<ListError>() {
            err.is_auth()
        } else if let Some(err) = cause.downcast_ref::<ImportError>() {
            err.is_auth()
        } else if let Some(err) = cause.downcast_ref::<DownloadError>() {
            err.is_auth()
        } else {
            false
        }
    })
}

/// Message shown for a command that failed as a whole.
pub fn describe_error(err: &anyhow::Error) -> String {
    if is_auth_error(err) {
        format!("{err}: {}", auth_hint())
    } else {
        format!("{err:#}")
    }
}
