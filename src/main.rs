//! Binary entry point for docvault.
//!
//! This binary provides the CLI interface for the docvault document store.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow match_same_arms for explicit command handling
#![allow(clippy::match_same_arms)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use docvault::config::DocvaultConfig;
use docvault::observability;
use docvault::storage::hybrid::reconcile_once;
use docvault::{
    Content, DiskBackend, Document, DocumentId, EmbeddedBackend, HybridStorage, Source,
    StorageBackend,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Docvault - git-backed document storage and query engine.
#[derive(Parser)]
#[command(name = "docvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Store a document.
    Store {
        /// Document id (generated when omitted).
        #[arg(long)]
        id: Option<String>,

        /// Source type (e.g. "arxiv", "web", "filesystem").
        #[arg(short, long)]
        source_type: String,

        /// Source URL.
        #[arg(short, long)]
        url: Option<String>,

        /// Source filesystem path.
        #[arg(short, long)]
        path: Option<String>,

        /// Read the extracted text from a file instead of --text.
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Extracted text.
        #[arg(short, long)]
        text: Option<String>,

        /// Metadata entries as key=value pairs.
        #[arg(short, long)]
        metadata: Vec<String>,
    },

    /// Retrieve a document by id.
    Get {
        /// The document id.
        id: String,
    },

    /// Run a GQL query.
    Query {
        /// The query string, e.g. `SELECT FROM documents WHERE source = arxiv`.
        gql: String,
    },

    /// Merge a branch into a backend's head.
    Merge {
        /// Branch name to merge.
        branch: String,

        /// Backend to merge in: "embedded" or "disk".
        #[arg(short, long, default_value = "embedded")]
        backend: String,
    },

    /// Run one reconciliation pass between the backends.
    Reconcile,

    /// Check backend health.
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match DocvaultConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                return ExitCode::FAILURE;
            },
        },
        None => DocvaultConfig::load_default(),
    };

    if let Err(e) = observability::init_logging(config.log_format, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

async fn run_command(cli: Cli, config: DocvaultConfig) -> anyhow::Result<()> {
    let embedded: Arc<dyn StorageBackend> =
        Arc::new(EmbeddedBackend::open(&config.embedded_repo_path)?);
    let disk: Arc<dyn StorageBackend> = Arc::new(DiskBackend::open(&config.disk_repo_path)?);
    let hybrid = HybridStorage::new(
        Arc::clone(&embedded),
        Arc::clone(&disk),
        config.hybrid.clone(),
    );

    match cli.command {
        Commands::Store {
            id,
            source_type,
            url,
            path,
            file,
            text,
            metadata,
        } => {
            let text = match (file, text) {
                (Some(file), _) => std::fs::read_to_string(&file)?,
                (None, Some(text)) => text,
                (None, None) => anyhow::bail!("one of --file or --text is required"),
            };
            let document = build_document(id, source_type, url, path, text, &metadata)?;
            let commit_id = hybrid.store(&document).await?;
            println!(
                "{}",
                serde_json::json!({
                    "id": document.id.as_str(),
                    "commit_id": commit_id,
                })
            );
        },
        Commands::Get { id } => {
            let document = hybrid.get(&DocumentId::new(id)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&document.metadata_file())?
            );
            println!("{}", document.content.text);
        },
        Commands::Query { gql } => {
            let result = hybrid.query(&gql).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        },
        Commands::Merge { branch, backend } => {
            let target = if backend.eq_ignore_ascii_case("disk") {
                &disk
            } else {
                &embedded
            };
            target.merge_branch(&branch)?;
            println!("Merged branch {branch}");
        },
        Commands::Reconcile => {
            let stats = reconcile_once(hybrid.primary(), hybrid.secondary()).await?;
            println!(
                "{}",
                serde_json::json!({
                    "copied_to_primary": stats.copied_to_primary,
                    "copied_to_secondary": stats.copied_to_secondary,
                })
            );
        },
        Commands::Health => {
            let embedded_status = status_label(embedded.health());
            let disk_status = status_label(disk.health());
            let overall = hybrid.health().await;
            println!("Embedded backend: {embedded_status}");
            println!("Disk backend:     {disk_status}");
            match overall {
                Ok(()) => println!("Overall:          healthy"),
                Err(e) => {
                    println!("Overall:          unhealthy");
                    anyhow::bail!(e);
                },
            }
        },
    }

    Ok(())
}

fn build_document(
    id: Option<String>,
    source_type: String,
    url: Option<String>,
    path: Option<String>,
    text: String,
    metadata: &[String],
) -> anyhow::Result<Document> {
    let mut parsed = HashMap::new();
    for entry in metadata {
        let Some((key, value)) = entry.split_once('=') else {
            anyhow::bail!("invalid metadata entry {entry:?}, expected key=value");
        };
        parsed.insert(key.to_string(), value.to_string());
    }

    let now = chrono::Utc::now();
    Ok(Document {
        id: DocumentId::new(id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
        source: Source {
            source_type,
            url,
            path,
        },
        content: Content {
            raw: None,
            text,
            metadata: parsed,
            embeddings: None,
        },
        created_at: now,
        updated_at: now,
    })
}

fn status_label<T>(result: docvault::Result<T>) -> &'static str {
    if result.is_ok() { "healthy" } else { "unhealthy" }
}
