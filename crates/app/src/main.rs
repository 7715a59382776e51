use chrono::Utc;
use clap::{Parser, Subcommand};
use filevec_core::{ChunkStore, IndexConfig, Indexer};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "filevec", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config listing directories and extensions to index.
    #[arg(long, env = "FILEVEC_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Override the SQLite database path from the config.
    #[arg(long, env = "FILEVEC_DATABASE")]
    database: Option<PathBuf>,

    /// Log at debug level when RUST_LOG is not set.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Walk every configured directory and index new or changed files.
    Index,
    /// Rank stored chunks against a free-text query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Characters of chunk text to print per hit.
        #[arg(long, default_value = "200")]
        preview_chars: usize,
    },
    /// Print how many files and chunks are stored.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let mut config = IndexConfig::load(&cli.config)?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        database = %config.database_path.display(),
        "filevec boot"
    );

    match cli.command {
        Command::Index => {
            let mut indexer = Indexer::from_config(config)?;
            let report = indexer.run().await;

            for failed in &report.failed {
                warn!(path = %failed.path.display(), reason = %failed.reason, "not indexed");
            }

            println!(
                "run {}: {} files seen, {} indexed ({} chunks), {} unchanged, {} tracked without text, {} failed, {} walk errors, {} pruned",
                report.run_id,
                report.files_seen,
                report.indexed,
                report.chunks_written,
                report.unchanged,
                report.tracked_unsupported,
                report.failed.len(),
                report.walk_errors,
                report.pruned
            );
        }
        Command::Search {
            query,
            top_k,
            preview_chars,
        } => {
            let indexer = Indexer::from_config(config)?;
            let hits = indexer.search(&query, top_k).await?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no matching chunks");
            }
            for hit in hits {
                let preview: String = hit.content.chars().take(preview_chars).collect();
                println!(
                    "score={:.4} file={} chunk={}",
                    hit.score, hit.file_name, hit.chunk_index
                );
                println!("  {preview}");
            }
        }
        Command::Stats => {
            let store = ChunkStore::open(&config.database_path)?;
            println!(
                "{} files tracked, {} chunks stored",
                store.file_names()?.len(),
                store.count_chunks()?
            );
        }
    }

    Ok(())
}
