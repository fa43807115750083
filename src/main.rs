//! # Docent CLI (`docent`)
//!
//! The `docent` binary runs the document pipeline from the command line and
//! starts the dashboard HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent validate <files>` | Check files against the upload policy |
//! | `docent extract <files>` | Extract text and print the processed files |
//! | `docent analyze <files>` | Run cross-document analysis |
//! | `docent chat "<question>"` | Ask a question about the given files |
//! | `docent serve` | Start the HTTP API |
//!
//! Commands fall back to built-in defaults when the config file does not
//! exist. `analyze` and `chat` need an API credential (see `[llm]`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docent::analysis::analyze_documents;
use docent::chat::ChatOrchestrator;
use docent::client::{backend_from_config, AnthropicClient};
use docent::config::{self, Config};
use docent::extract::{media_type_for, FileSource};
use docent::models::{ProcessedFile, UploadStatus};
use docent::processor::FileProcessor;
use docent::progress::ProgressMode;
use docent::request::AnalysisRequestBuilder;
use docent::server;
use docent::validate::{validate_file, FileDescriptor};

/// Docent: document ingestion and AI-assisted research analysis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docent.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Docent: document ingestion and AI-assisted research analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docent.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check files against the upload policy without reading them.
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract text from files.
    ///
    /// Prints the processed files as JSON on stdout. Progress goes to stderr.
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Progress output: `auto`, `human`, `json` or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Extract files and run cross-document analysis.
    ///
    /// Prints the analysis result as JSON on stdout.
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Ask a question about a set of files.
    Chat {
        question: String,

        /// Files to answer from. May be repeated.
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Start the HTTP API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Validate { files } => {
            run_validate(&cfg, &files)?;
        }
        Commands::Extract { files, progress } => {
            let processed = process_paths(&cfg, &files, parse_progress(&progress)?).await?;
            println!("{}", serde_json::to_string_pretty(&*processed)?);
        }
        Commands::Analyze { files, progress } => {
            // Fail on a missing credential before any file is processed.
            let client = AnthropicClient::from_config(&cfg.llm)?;
            let processed = process_paths(&cfg, &files, parse_progress(&progress)?).await?;
            let builder = AnalysisRequestBuilder::new(&cfg.llm, &cfg.pipeline);
            let result = analyze_documents(&client, &builder, &processed).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Chat {
            question,
            files,
            progress,
        } => {
            let processed = process_paths(&cfg, &files, parse_progress(&progress)?).await?;
            let chat = ChatOrchestrator::new(
                backend_from_config(&cfg.llm),
                AnalysisRequestBuilder::new(&cfg.llm, &cfg.pipeline),
            );
            println!("{}", chat.answer(&question, &processed, &[]).await);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn parse_progress(mode: &str) -> anyhow::Result<ProgressMode> {
    mode.parse().map_err(anyhow::Error::msg)
}

/// Name, size and implied media type of a local file, without reading it.
fn describe_path(path: &Path) -> anyhow::Result<FileDescriptor> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = media_type_for(&name);
    Ok(FileDescriptor::new(name, meta.len(), media_type))
}

fn run_validate(cfg: &Config, files: &[PathBuf]) -> anyhow::Result<()> {
    let policy = cfg.upload.policy();
    let mut rejected = 0;
    for path in files {
        let file = describe_path(path)?;
        match validate_file(&file, &policy) {
            Ok(()) => println!("ok        {}", file.name),
            Err(reason) => {
                rejected += 1;
                println!("rejected  {}: {}", file.name, reason);
            }
        }
    }
    if rejected > 0 {
        anyhow::bail!("{} of {} files rejected", rejected, files.len());
    }
    Ok(())
}

/// Runs `files` through the processor and returns the completed set.
/// Rejected and failed files are reported on stderr.
async fn process_paths(
    cfg: &Config,
    files: &[PathBuf],
    progress: ProgressMode,
) -> anyhow::Result<Arc<[ProcessedFile]>> {
    let processor = FileProcessor::new(cfg, progress.listener());
    for path in files {
        let file = describe_path(path)?;
        processor.enqueue(file, FileSource::Path(path.clone()));
    }
    processor.wait_idle().await;

    let snapshot = processor.snapshot();
    for upload in &snapshot.uploads {
        if upload.status == UploadStatus::Error {
            eprintln!(
                "{}: {}",
                upload.name,
                upload.error.as_deref().unwrap_or("processing failed")
            );
        }
    }
    tracing::info!(
        uploads = snapshot.uploads.len(),
        completed = snapshot.processed.len(),
        "processing finished"
    );
    Ok(snapshot.processed.clone())
}
