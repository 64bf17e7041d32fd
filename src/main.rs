//! # DocQuest CLI (`docq`)
//!
//! The `docq` binary is the primary interface for DocQuest. It provides
//! commands for database initialization, document registration and
//! inspection, semantic search, grounded question answering, and
//! starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docq --config ./config/docquest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq init` | Create the SQLite database and run schema migrations |
//! | `docq add <file>` | Register a file and run the ingestion pipeline |
//! | `docq list` | List documents and their status |
//! | `docq get <id>` | Show one document's metadata and chunk counts |
//! | `docq delete <id>` | Delete a document, its file, and index entries |
//! | `docq index <id>` | Re-chunk and re-embed a completed document |
//! | `docq search "<query>"` | Semantic search over indexed chunks |
//! | `docq ask "<question>"` | Answer a question with cited sources |
//! | `docq serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docquest::config::{self, Config};
use docquest::db;
use docquest::documents;
use docquest::embedding::{Embedder, HttpEmbeddingProvider};
use docquest::extract::FileExtractor;
use docquest::generation::OpenAiChatProvider;
use docquest::migrate;
use docquest::models::DocStatus;
use docquest::pipeline::{self, AppContext};
use docquest::query;
use docquest::server;
use docquest::vector_index;

/// DocQuest CLI. All commands accept a `--config` flag pointing to a
/// TOML configuration file; see `config/docquest.example.toml`.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "DocQuest — a local-first document question-answering pipeline",
    version,
    long_about = "DocQuest ingests text and PDF files, chunks and embeds their content, \
    and answers natural-language questions grounded in the retrieved chunks, with cited \
    sources. Storage is a single SQLite database."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docquest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, embeddings). Idempotent.
    Init,

    /// Register a file and run the ingestion pipeline to completion.
    ///
    /// Copies the file into the upload directory, extracts its text,
    /// chunks it, and embeds the chunks. Prints the final status.
    Add {
        /// Path to a `.txt`, `.md`, or `.pdf` file.
        file: PathBuf,

        /// Display name; defaults to the file's basename.
        #[arg(long)]
        name: Option<String>,
    },

    /// List documents, newest first.
    List {
        /// Filter by status: pending, processing, completed, failed.
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of documents to show.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show one document's metadata and chunk counts.
    Get {
        /// Document id.
        id: i64,
    },

    /// Delete a document, its stored file, and its index entries.
    Delete {
        /// Document id.
        id: i64,
    },

    /// Re-chunk and re-embed a completed document.
    ///
    /// Replaces the document's existing chunks and embeddings. Useful
    /// after changing chunking settings or the embedding model.
    Index {
        /// Document id.
        id: i64,
    },

    /// Semantic search over indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum normalized similarity in [0, 1].
        #[arg(long)]
        min_similarity: Option<f64>,
    },

    /// Answer a question from indexed documents, with cited sources.
    ///
    /// Requires the generation provider's API key (by default the
    /// `GROQ_API_KEY` environment variable).
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve as context.
        #[arg(long)]
        k: Option<usize>,

        /// Override the configured generation model.
        #[arg(long)]
        model: Option<String>,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

async fn build_context(cfg: Config) -> anyhow::Result<Arc<AppContext>> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let provider = HttpEmbeddingProvider::new(cfg.embedding.clone())?;
    let generator = OpenAiChatProvider::new(cfg.generation.clone())?;

    Ok(Arc::new(AppContext {
        pool,
        extractor: Arc::new(FileExtractor),
        embedder: Arc::new(Embedder::new(Arc::new(provider))),
        generator: Arc::new(generator),
        config: cfg,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docquest=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add { file, name } => {
            let ctx = build_context(cfg).await?;
            let new_doc = documents::register_file(
                &ctx.config.storage.upload_dir,
                &file,
                name.as_deref(),
                None,
            )?;
            let id = documents::create(&ctx.pool, &new_doc).await?;
            println!("Registered document {} ({})", id, new_doc.original_name);

            // The CLI waits for the pipeline; the server fires and forgets.
            pipeline::spawn(ctx.clone(), id).await?;

            match documents::get(&ctx.pool, id).await? {
                Some(doc) if doc.status == DocStatus::Completed => {
                    let chunks = vector_index::get_document_chunks(&ctx.pool, id).await?;
                    println!("Processed: {} chunks indexed", chunks.len());
                }
                Some(doc) => {
                    println!(
                        "Processing ended with status {}: {}",
                        doc.status,
                        doc.error_message.unwrap_or_default()
                    );
                }
                None => println!("Document {} disappeared during processing", id),
            }
        }
        Commands::List { status, limit } => {
            let ctx = build_context(cfg).await?;
            let status = status.as_deref().map(DocStatus::parse).transpose()?;
            let docs = documents::list(&ctx.pool, status, limit).await?;

            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{:>5}  {:<11} {:>9}  {}",
                    doc.id,
                    doc.status,
                    doc.file_size.unwrap_or(0),
                    doc.original_name
                );
            }
        }
        Commands::Get { id } => {
            let ctx = build_context(cfg).await?;
            let doc = documents::get(&ctx.pool, id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("document {} not found", id))?;
            let chunks = vector_index::get_document_chunks(&ctx.pool, id).await?;

            println!("id:           {}", doc.id);
            println!("name:         {}", doc.original_name);
            println!("file:         {}", doc.file_path);
            println!("type:         {}", doc.file_type.unwrap_or_default());
            println!("status:       {}", doc.status);
            if let Some(method) = doc.extraction_method {
                println!("extraction:   {}", method);
            }
            if let Some(err) = doc.error_message {
                println!("error:        {}", err);
            }
            println!("chunks:       {}", chunks.len());
            if let Some(text) = doc.extracted_text {
                println!("text chars:   {}", text.len());
            }
        }
        Commands::Delete { id } => {
            let ctx = build_context(cfg).await?;
            documents::delete(&ctx.pool, id).await?;
            println!("Deleted document {}.", id);
        }
        Commands::Index { id } => {
            let ctx = build_context(cfg).await?;
            let summary = pipeline::index_document(&ctx, id).await?;
            println!(
                "Indexed document {}: {} chunks, {} embedded",
                id, summary.chunks, summary.embedded
            );
        }
        Commands::Search {
            query: q,
            limit,
            min_similarity,
        } => {
            let ctx = build_context(cfg).await?;
            let hits = query::search(&ctx, &q, limit, min_similarity).await?;

            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} (chunk {})",
                    i + 1,
                    hit.similarity,
                    hit.filename,
                    hit.chunk_index
                );
                let preview: String = hit.text.chars().take(160).collect();
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Commands::Ask { question, k, model } => {
            let ctx = build_context(cfg).await?;
            let answer = query::answer(&ctx, &question, k, model).await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, src) in answer.sources.iter().enumerate() {
                    println!(
                        "  {}. {} (similarity {:.4}, chunk {})",
                        i + 1,
                        src.filename,
                        src.similarity,
                        src.chunk_index
                    );
                }
            }
        }
        Commands::Serve => {
            let ctx = build_context(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}
