//! End-to-end pipeline tests against a real temp-dir SQLite database,
//! with stub embedding and generation providers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tempfile::TempDir;

use docquest::config::{
    ChunkingConfig, Config, DbConfig, EmbeddingConfig, GenerationConfig, RetrievalConfig,
    ServerConfig, StorageConfig,
};
use docquest::db;
use docquest::documents;
use docquest::embedding::{Embedder, EmbeddingProvider};
use docquest::error::{Error, Result};
use docquest::extract::FileExtractor;
use docquest::generation::{Generation, GenerationOptions, GenerationProvider};
use docquest::migrate;
use docquest::models::{DocStatus, NewDocument};
use docquest::pipeline::{self, AppContext};
use docquest::query;
use docquest::vector_index;

const DIMS: usize = 4;

/// Deterministic embedding stub: maps texts onto orthogonal topic axes
/// so similarity scores are predictable. Texts containing "failme" fail.
struct TopicEmbedding;

#[async_trait]
impl EmbeddingProvider for TopicEmbedding {
    fn model_name(&self) -> &str {
        "topic-stub"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        if lower.contains("failme") {
            return Err(Error::Service {
                service: "embedding",
                reason: "stub failure".to_string(),
            });
        }

        let mut v = vec![0.0f32; DIMS];
        if lower.contains("rust") {
            v[0] = 1.0;
        } else if lower.contains("python") {
            v[1] = 1.0;
        } else {
            v[2] = 1.0;
        }
        Ok(v)
    }
}

struct StubGenerator {
    available: bool,
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn available(&self) -> bool {
        self.available
    }

    async fn generate(&self, _prompt: &str, opts: &GenerationOptions) -> Result<Generation> {
        Ok(Generation {
            text: "stub answer".to_string(),
            model: opts.model.clone().unwrap_or_else(|| "stub-model".to_string()),
            tokens_generated: Some(7),
            time_ms: Some(1),
        })
    }
}

async fn setup(generator_available: bool) -> (TempDir, Arc<AppContext>) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config = Config {
        db: DbConfig {
            path: root.join("data/docquest.sqlite"),
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
        },
        chunking: ChunkingConfig {
            target_words: 12,
            overlap_words: 0,
            min_words: 2,
            min_index_chars: 10,
        },
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
        retrieval: RetrievalConfig {
            search_limit: 10,
            search_min_similarity: 0.6,
            answer_limit: 5,
            answer_min_similarity: 0.6,
        },
        server: ServerConfig::default(),
    };

    let pool = db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let ctx = Arc::new(AppContext {
        pool,
        config,
        extractor: Arc::new(FileExtractor),
        embedder: Arc::new(Embedder::new(Arc::new(TopicEmbedding))),
        generator: Arc::new(StubGenerator {
            available: generator_available,
        }),
    });

    (tmp, ctx)
}

/// Write a source file, register it, and run the pipeline to completion.
async fn ingest_file(ctx: &Arc<AppContext>, dir: &Path, name: &str, content: &str) -> i64 {
    let src = dir.join(name);
    fs::write(&src, content).unwrap();

    let new_doc =
        documents::register_file(&ctx.config.storage.upload_dir, &src, None, None).unwrap();
    let id = documents::create(&ctx.pool, &new_doc).await.unwrap();
    pipeline::process(ctx, id).await.unwrap();
    id
}

// Two paragraphs of eight words each; with target_words = 12 the
// chunker emits one chunk per paragraph.
const RUST_TEXT: &str = "Rust is a language for reliable systems software.\n\n\
                         The Rust borrow checker enforces memory safety rules.";
const PYTHON_TEXT: &str = "Python is a language for scripting and research.\n\n\
                           The Python ecosystem covers data science very well.";

async fn count(pool: &sqlx::SqlitePool, sql: &str) -> i64 {
    sqlx::query(sql).fetch_one(pool).await.unwrap().get(0)
}

#[tokio::test]
async fn pipeline_extracts_chunks_and_embeds() {
    let (tmp, ctx) = setup(true).await;
    let id = ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    let doc = documents::get(&ctx.pool, id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocStatus::Completed);
    assert_eq!(doc.extraction_method.as_deref(), Some("direct"));
    assert!(doc.processed_at.is_some());
    assert!(doc.extracted_text.unwrap().contains("borrow checker"));

    let chunks = vector_index::get_document_chunks(&ctx.pool, id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[1].chunk_index, 1);

    assert_eq!(count(&ctx.pool, "SELECT COUNT(*) FROM embeddings").await, 2);
}

#[tokio::test]
async fn failed_extraction_marks_document_failed() {
    let (tmp, ctx) = setup(true).await;
    let src = tmp.path().join("image.txt");
    fs::write(&src, "not really an image").unwrap();

    let new_doc = documents::register_file(
        &ctx.config.storage.upload_dir,
        &src,
        None,
        Some("image/png"),
    )
    .unwrap();
    let id = documents::create(&ctx.pool, &new_doc).await.unwrap();

    pipeline::spawn(ctx.clone(), id).await.unwrap();

    let doc = documents::get(&ctx.pool, id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocStatus::Failed);
    assert!(doc.error_message.unwrap().contains("unsupported"));
}

#[tokio::test]
async fn processing_claim_is_guarded() {
    let (tmp, ctx) = setup(true).await;
    let id = ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    // Already completed; a second pipeline run must not re-claim it.
    let err = pipeline::process(&ctx, id).await.unwrap_err();
    assert!(matches!(err, Error::StateConflict(_)));
}

#[tokio::test]
async fn processing_claim_of_missing_document_is_not_found() {
    let (_tmp, ctx) = setup(true).await;
    let err = documents::begin_processing(&ctx.pool, 4242).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn search_ranks_matching_topic_first() {
    let (tmp, ctx) = setup(true).await;
    ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;
    ingest_file(&ctx, tmp.path(), "python.txt", PYTHON_TEXT).await;

    let hits = query::search(&ctx, "tell me about rust", None, None)
        .await
        .unwrap();

    // Orthogonal topic vectors: python chunks score 0.5, below the
    // 0.6 threshold; only the two rust chunks survive.
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert_eq!(hit.filename, "rust.txt");
        assert!(hit.similarity > 0.99);
    }

    let limited = query::search(&ctx, "rust", Some(1), None).await.unwrap();
    assert_eq!(limited.len(), 1);
}

/// Register a completed document with no backing file, for tests that
/// drive the index directly with hand-built vectors.
async fn completed_document(ctx: &Arc<AppContext>, name: &str) -> i64 {
    let id = documents::create(
        &ctx.pool,
        &NewDocument {
            filename: name.to_string(),
            original_name: name.to_string(),
            file_path: format!("/nonexistent/{}", name),
            file_type: Some("text/plain".to_string()),
            file_size: None,
        },
    )
    .await
    .unwrap();
    documents::complete_extraction(&ctx.pool, id, "placeholder text long enough", "direct")
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn search_orders_by_similarity_with_id_tie_break() {
    let (_tmp, ctx) = setup(true).await;
    let id = completed_document(&ctx, "vectors.txt").await;

    let texts: Vec<String> = (0..4).map(|i| format!("chunk number {}", i)).collect();
    let chunk_ids = vector_index::store_chunks(&ctx.pool, id, &texts).await.unwrap();

    // Query axis is [1,0,0,0]: chunk 0 scores 0.5, chunk 1 scores 1.0,
    // chunks 2 and 3 tie at (1 + 1/sqrt(2)) / 2.
    let vectors = vec![
        Some(vec![0.0f32, 1.0, 0.0, 0.0]),
        Some(vec![1.0f32, 0.0, 0.0, 0.0]),
        Some(vec![1.0f32, 1.0, 0.0, 0.0]),
        Some(vec![1.0f32, 1.0, 0.0, 0.0]),
    ];
    vector_index::store_vectors(&ctx.pool, &chunk_ids, &vectors)
        .await
        .unwrap();

    let query_vec = vec![1.0f32, 0.0, 0.0, 0.0];
    let hits = vector_index::search_top_k(&ctx.pool, &query_vec, 10, 0.0)
        .await
        .unwrap();

    let got: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
    let want = vec![chunk_ids[1], chunk_ids[2], chunk_ids[3], chunk_ids[0]];
    assert_eq!(got, want);

    for pair in hits.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    assert!((hits[1].similarity - hits[2].similarity).abs() < 1e-12);
}

#[tokio::test]
async fn search_skips_vectors_with_mismatched_dims() {
    let (_tmp, ctx) = setup(true).await;
    let id = completed_document(&ctx, "mixed-dims.txt").await;

    let texts = vec!["three dim chunk".to_string(), "four dim chunk".to_string()];
    let chunk_ids = vector_index::store_chunks(&ctx.pool, id, &texts).await.unwrap();

    // The first vector was produced by a different model width; an
    // unguarded cosine would score it 0.5 and leak past low thresholds.
    let vectors = vec![
        Some(vec![1.0f32, 0.0, 0.0]),
        Some(vec![1.0f32, 0.0, 0.0, 0.0]),
    ];
    vector_index::store_vectors(&ctx.pool, &chunk_ids, &vectors)
        .await
        .unwrap();

    let query_vec = vec![1.0f32, 0.0, 0.0, 0.0];
    let hits = vector_index::search_top_k(&ctx.pool, &query_vec, 10, 0.0)
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, chunk_ids[1]);
}

#[tokio::test]
async fn search_rejects_empty_query() {
    let (_tmp, ctx) = setup(true).await;
    let err = query::search(&ctx, "   ", None, None).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn search_skips_documents_that_are_not_completed() {
    let (_tmp, ctx) = setup(true).await;

    let id = documents::create(
        &ctx.pool,
        &NewDocument {
            filename: "x.txt".to_string(),
            original_name: "x.txt".to_string(),
            file_path: "/nonexistent/x.txt".to_string(),
            file_type: Some("text/plain".to_string()),
            file_size: None,
        },
    )
    .await
    .unwrap();

    // Index entries exist but the document never completed.
    let texts = vec!["Rust content stuck in pending state.".to_string()];
    let chunk_ids = vector_index::store_chunks(&ctx.pool, id, &texts).await.unwrap();
    let vectors = ctx.embedder.embed_batch(&texts).await.unwrap();
    vector_index::store_vectors(&ctx.pool, &chunk_ids, &vectors)
        .await
        .unwrap();

    let hits = query::search(&ctx, "rust", None, None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn delete_removes_file_chunks_and_embeddings() {
    let (tmp, ctx) = setup(true).await;
    let id = ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    let doc = documents::get(&ctx.pool, id).await.unwrap().unwrap();
    let stored_path = doc.file_path.clone();
    assert!(Path::new(&stored_path).exists());

    documents::delete(&ctx.pool, id).await.unwrap();

    assert!(!Path::new(&stored_path).exists());
    assert!(documents::get(&ctx.pool, id).await.unwrap().is_none());
    assert_eq!(count(&ctx.pool, "SELECT COUNT(*) FROM chunks").await, 0);
    assert_eq!(count(&ctx.pool, "SELECT COUNT(*) FROM embeddings").await, 0);
}

#[tokio::test]
async fn delete_of_missing_document_is_not_found() {
    let (_tmp, ctx) = setup(true).await;
    let err = documents::delete(&ctx.pool, 4242).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn reindex_replaces_previous_chunks() {
    let (tmp, ctx) = setup(true).await;
    let id = ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    let before = vector_index::get_document_chunks(&ctx.pool, id).await.unwrap();
    let summary = pipeline::index_document(&ctx, id).await.unwrap();
    let after = vector_index::get_document_chunks(&ctx.pool, id).await.unwrap();

    assert_eq!(summary.chunks, before.len());
    assert_eq!(summary.embedded, before.len());
    assert_eq!(after.len(), before.len());

    // Same texts, fresh rows: the old chunk ids are gone.
    let before_ids: Vec<i64> = before.iter().map(|c| c.id).collect();
    for chunk in &after {
        assert!(!before_ids.contains(&chunk.id));
    }
    let texts_before: Vec<&str> = before.iter().map(|c| c.chunk_text.as_str()).collect();
    let texts_after: Vec<&str> = after.iter().map(|c| c.chunk_text.as_str()).collect();
    assert_eq!(texts_before, texts_after);

    assert_eq!(
        count(&ctx.pool, "SELECT COUNT(*) FROM embeddings").await,
        after.len() as i64
    );
}

#[tokio::test]
async fn reindex_requires_completed_document() {
    let (_tmp, ctx) = setup(true).await;
    let id = documents::create(
        &ctx.pool,
        &NewDocument {
            filename: "y.txt".to_string(),
            original_name: "y.txt".to_string(),
            file_path: "/nonexistent/y.txt".to_string(),
            file_type: Some("text/plain".to_string()),
            file_size: None,
        },
    )
    .await
    .unwrap();

    let err = pipeline::index_document(&ctx, id).await.unwrap_err();
    assert!(matches!(err, Error::StateConflict(_)));
}

#[tokio::test]
async fn short_text_is_completed_but_not_indexed() {
    let (tmp, ctx) = setup(true).await;
    // Nine chars, below the ten-char indexing gate.
    let id = ingest_file(&ctx, tmp.path(), "tiny.txt", "tiny note").await;

    let doc = documents::get(&ctx.pool, id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocStatus::Completed);
    assert_eq!(count(&ctx.pool, "SELECT COUNT(*) FROM chunks").await, 0);

    let err = pipeline::index_document(&ctx, id).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientContent(_)));
}

#[tokio::test]
async fn failed_embedding_leaves_chunk_without_vector() {
    let (tmp, ctx) = setup(true).await;
    let text = "Rust paragraph with enough words to stand alone here.\n\n\
                This failme paragraph cannot be embedded at all.";
    let id = ingest_file(&ctx, tmp.path(), "partial.txt", text).await;

    let chunks = vector_index::get_document_chunks(&ctx.pool, id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(count(&ctx.pool, "SELECT COUNT(*) FROM embeddings").await, 1);
}

#[tokio::test]
async fn store_vectors_validates_parallel_lengths() {
    let (_tmp, ctx) = setup(true).await;
    let err = vector_index::store_vectors(&ctx.pool, &[1, 2], &[None])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn answer_with_no_hits_is_a_success() {
    let (_tmp, ctx) = setup(true).await;
    let answer = query::answer(&ctx, "anything at all", None, None).await.unwrap();

    assert!(answer.no_results);
    assert_eq!(answer.chunks_retrieved, 0);
    assert!(answer.sources.is_empty());
    assert!(answer.answer.contains("couldn't find any relevant information"));
}

#[tokio::test]
async fn answer_cites_retrieved_sources() {
    let (tmp, ctx) = setup(true).await;
    ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    let answer = query::answer(&ctx, "what does rust enforce?", None, None)
        .await
        .unwrap();

    assert!(!answer.no_results);
    assert_eq!(answer.answer, "stub answer");
    assert_eq!(answer.chunks_retrieved, 2);
    assert_eq!(answer.sources.len(), 2);
    for src in &answer.sources {
        assert_eq!(src.filename, "rust.txt");
        assert!((0.0..=1.0).contains(&src.similarity));
        assert!(src.snippet.chars().count() <= 203);
    }
}

#[tokio::test]
async fn answer_fails_fast_without_generator() {
    let (tmp, ctx) = setup(false).await;
    ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;

    let err = query::answer(&ctx, "rust?", None, None).await.unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable { .. }));
}

#[tokio::test]
async fn document_and_index_stats_reflect_corpus() {
    let (tmp, ctx) = setup(true).await;
    ingest_file(&ctx, tmp.path(), "rust.txt", RUST_TEXT).await;
    ingest_file(&ctx, tmp.path(), "python.txt", PYTHON_TEXT).await;

    let doc_stats = documents::stats(&ctx.pool).await.unwrap();
    assert_eq!(doc_stats.total, 2);
    assert_eq!(doc_stats.completed, 2);
    assert!(doc_stats.total_size > 0);

    let index_stats = vector_index::stats(&ctx.pool).await.unwrap();
    assert_eq!(index_stats.indexed_documents, 2);
    assert_eq!(index_stats.total_chunks, 4);
    assert_eq!(index_stats.total_embeddings, 4);
    assert!(index_stats.avg_chunk_words > 0.0);
}
