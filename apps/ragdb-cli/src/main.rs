//! ragdb command-line interface.
//!
//! ```bash
//! ragdb ingest ./data/documents --limit 10
//! ragdb search "how do cats hunt" -k 5 -t hybrid
//! ragdb --preload ./data/documents search "mice" --json
//! ragdb list
//! ragdb delete <document-id>
//! ```
//!
//! With the default in-memory backend nothing survives the process, so
//! `--preload` ingests a directory before the command runs.

mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ragdb_core::config::{expand_path, Config};
use ragdb_core::data_processor::DataProcessor;
use ragdb_core::traits::ChunkStore;
use ragdb_core::types::{SearchRequest, SearchType, DEFAULT_TOP_K};
use ragdb_hybrid::RetrievalContext;

#[derive(Parser)]
#[command(name = "ragdb", version, about = "Hybrid BM25 + vector retrieval over local documents")]
struct Cli {
    /// Ingest every .txt file under this directory before running the command
    #[arg(long, global = true)]
    preload: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index a directory of text files
    Ingest {
        /// Defaults to `data.documents_dir`
        dir: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Query the index
    Search {
        query: String,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(short = 't', long = "type", default_value = "hybrid")]
        search_type: SearchType,
        #[arg(long)]
        json: bool,
    },
    /// Remove a document and all of its chunks
    Delete { document_id: String },
    /// List indexed documents
    List,
    /// Show chunk and document counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    let ctx = RetrievalContext::from_settings(&settings).await?;
    ctx.warm_up().await?;

    if let Some(dir) = &cli.preload {
        ingest_dir(&ctx, dir, None).await?;
    }

    match cli.command {
        Command::Ingest { dir, limit } => {
            let dir = dir.unwrap_or_else(|| expand_path(&settings.data.documents_dir));
            let (docs, chunks) = ingest_dir(&ctx, &dir, limit).await?;
            println!("✅ Ingested {docs} documents ({chunks} chunks) from {}", dir.display());
        }
        Command::Search { query, top_k, search_type, json } => {
            let response = ctx.search(&SearchRequest::new(query, top_k, search_type)).await?;
            let rendered = if json { output::format_json(&response) } else { output::format_human(&response) };
            println!("{rendered}");
        }
        Command::Delete { document_id } => {
            let removed = ctx.delete_document(&document_id).await?;
            println!("🗑️  Deleted {document_id} ({removed} chunks)");
        }
        Command::List => {
            let docs = ctx.list_documents().await?;
            if docs.is_empty() {
                println!("No documents indexed");
            }
            for doc in docs {
                println!("{}  {}  {} chunks", doc.document_id, doc.filename.as_deref().unwrap_or("unknown"), doc.chunk_count);
            }
        }
        Command::Stats => {
            let stats = ctx.stats().await?;
            println!("📊 Collection: {}", stats.collection_name);
            println!("📊 Documents:  {}", stats.total_documents);
            println!("📊 Chunks:     {}", stats.total_chunks);
            println!("📊 Backend:    {}", ctx.store().backend());
        }
    }
    Ok(())
}

/// Ingests every document under `dir`; files that fail are logged and skipped.
async fn ingest_dir(ctx: &RetrievalContext, dir: &Path, limit: Option<usize>) -> Result<(usize, usize)> {
    let processor = DataProcessor::new();
    let documents = match limit {
        Some(limit) => processor.process_directory_limited(dir, limit)?,
        None => processor.process_directory(dir)?,
    };

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );

    let (mut docs, mut chunks) = (0, 0);
    for document in &documents {
        pb.set_message(document.filename().unwrap_or("unknown").to_string());
        match ctx.ingest_document(document).await {
            Ok(report) => {
                docs += 1;
                chunks += report.chunks;
            }
            Err(e) if e.is_upstream() => return Err(e.into()),
            Err(e) => warn!(path = %document.path.display(), error = %e, "skipping document"),
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    Ok((docs, chunks))
}
