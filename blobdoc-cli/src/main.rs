mod config;
use anyhow::Context;
use blobdoc_core::DocumentStore;
use clap::{Parser, Subcommand};
use config::Config;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "blobdoc")]
#[command(about = "JSON documents on a versioned blob store")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "blobdoc.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a document and its version
    Read { path: String },

    /// Write a document from a file, or stdin when no file is given
    Write {
        path: String,

        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Change description recorded with the write
        #[arg(short, long, default_value = "update document")]
        message: String,
    },

    /// Delete a document, including every chunk of a split one
    Delete {
        path: String,

        #[arg(short, long, default_value = "delete document")]
        message: String,
    },

    /// List a directory
    List {
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blobdoc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let store = match build_store(&cfg) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to set up blob backend: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(&store, cli.command).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn build_store(cfg: &Config) -> anyhow::Result<DocumentStore> {
    let blob_api = cfg.blob_api_builder()?.build()?;
    tracing::debug!("Using {} blob backend", cfg.backend.kind.as_str());
    Ok(DocumentStore::new(blob_api, &cfg.store))
}

async fn run_command(store: &DocumentStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Read { path } => {
            let document = store
                .read(&path)
                .await
                .with_context(|| format!("reading {}", path))?;
            if !document.exists() {
                tracing::info!("{} does not exist", document.path);
            }
            let output = serde_json::json!({
                "path": document.path,
                "version": document.version,
                "content": document.content,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Write {
            path,
            file,
            message,
        } => {
            let raw = match file {
                Some(file) => std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    let mut raw = String::new();
                    std::io::stdin()
                        .read_to_string(&mut raw)
                        .context("reading document from stdin")?;
                    raw
                }
            };
            let content: serde_json::Value =
                serde_json::from_str(&raw).context("input is not valid JSON")?;

            let result = store
                .write(&path, content, &message)
                .await
                .with_context(|| format!("writing {}", path))?;
            tracing::info!(
                "Wrote {} as {:?} (version {}, {} stale blobs removed)",
                result.path,
                result.layout,
                result.version,
                result.cleaned_up
            );
        }
        Commands::Delete { path, message } => {
            let outcome = store
                .delete(&path, &message)
                .await
                .with_context(|| format!("deleting {}", path))?;
            tracing::info!("Delete {}: {:?}", path, outcome);
        }
        Commands::List { path } => {
            let entries = store
                .list_directory(&path)
                .await
                .with_context(|| format!("listing {}", path))?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}
