//! Background ingestion pipeline: extract, chunk, embed, index.
//!
//! Registration returns immediately; [`spawn`] runs the pipeline on a
//! detached task. Any stage error marks the document `failed` with the
//! error message and never unwinds into the caller.

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::chunker::{self, ChunkConfig};
use crate::config::Config;
use crate::documents;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::TextExtractor;
use crate::generation::GenerationProvider;
use crate::models::DocStatus;
use crate::vector_index;

/// Shared service context threaded through pipeline, query, and server.
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: Config,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<Embedder>,
    pub generator: Arc<dyn GenerationProvider>,
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, Copy)]
pub struct IndexSummary {
    pub chunks: usize,
    pub embedded: usize,
}

/// Run the full pipeline for a document on a background task.
///
/// The handle is returned for callers that want to await completion
/// (the CLI does); the HTTP server fires and forgets.
pub fn spawn(ctx: Arc<AppContext>, doc_id: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = process(&ctx, doc_id).await {
            error!(doc_id, error = %e, "document pipeline failed");
            documents::mark_failed(&ctx.pool, doc_id, &e.to_string()).await;
        }
    })
}

/// Extract a document's text, then chunk and embed it when eligible.
pub async fn process(ctx: &AppContext, doc_id: i64) -> Result<()> {
    let doc = documents::get(&ctx.pool, doc_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document {} not found", doc_id)))?;

    documents::begin_processing(&ctx.pool, doc_id).await?;

    let mime = doc.file_type.as_deref().unwrap_or("text/plain");
    let extraction = ctx.extractor.extract(Path::new(&doc.file_path), mime).await?;

    documents::complete_extraction(&ctx.pool, doc_id, &extraction.text, &extraction.method).await?;
    info!(
        doc_id,
        method = %extraction.method,
        chars = extraction.text.len(),
        "text extracted"
    );

    // Documents below the indexing gate stay completed but unindexed.
    if extraction.text.len() < ctx.config.chunking.min_index_chars {
        info!(doc_id, "extracted text too short to index");
        return Ok(());
    }

    let summary = index_document(ctx, doc_id).await?;
    info!(
        doc_id,
        chunks = summary.chunks,
        embedded = summary.embedded,
        "document indexed"
    );

    Ok(())
}

/// (Re)index a completed document: replace its chunks and embeddings.
///
/// Existing chunks are dropped first, so re-running is an idempotent
/// replace rather than an append.
pub async fn index_document(ctx: &AppContext, doc_id: i64) -> Result<IndexSummary> {
    let doc = documents::get(&ctx.pool, doc_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document {} not found", doc_id)))?;

    if doc.status != DocStatus::Completed {
        return Err(Error::StateConflict(format!(
            "document {} is {}, not completed",
            doc_id, doc.status
        )));
    }

    let text = doc.extracted_text.unwrap_or_default();
    if text.len() < ctx.config.chunking.min_index_chars {
        return Err(Error::InsufficientContent(format!(
            "document {} has {} chars of text, need at least {}",
            doc_id,
            text.len(),
            ctx.config.chunking.min_index_chars
        )));
    }

    let chunk_cfg = ChunkConfig {
        target_words: ctx.config.chunking.target_words,
        overlap_words: ctx.config.chunking.overlap_words,
        min_words: ctx.config.chunking.min_words,
    };
    let texts = chunker::chunk(&text, &chunk_cfg);
    if texts.is_empty() {
        return Err(Error::InsufficientContent(format!(
            "document {} produced no chunks",
            doc_id
        )));
    }

    vector_index::delete_for_document(&ctx.pool, doc_id).await?;
    let chunk_ids = vector_index::store_chunks(&ctx.pool, doc_id, &texts).await?;

    let vectors = ctx.embedder.embed_batch(&texts).await?;
    let embedded = vector_index::store_vectors(&ctx.pool, &chunk_ids, &vectors).await?;

    Ok(IndexSummary {
        chunks: chunk_ids.len(),
        embedded,
    })
}
