//! Chunk and embedding persistence plus brute-force similarity search.
//!
//! Vectors are stored as little-endian `f32` BLOBs keyed by chunk id.
//! Search scans every embedding of every completed document, scores it
//! with normalized cosine similarity, and returns the top k above a
//! threshold. Exact and simple; fine at the corpus sizes this serves.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, normalized_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Chunk, IndexStats, SearchHit};

/// Insert a document's chunk texts in one transaction.
///
/// Chunk indexes are assigned 0-based in input order. Returns the new
/// chunk row ids, parallel to `texts`.
pub async fn store_chunks(pool: &SqlitePool, doc_id: i64, texts: &[String]) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(texts.len());

    for (i, text) in texts.iter().enumerate() {
        let words = crate::chunker::word_count(text) as i64;
        let result = sqlx::query(
            "INSERT INTO chunks (doc_id, chunk_index, chunk_text, word_count) VALUES (?, ?, ?, ?)",
        )
        .bind(doc_id)
        .bind(i as i64)
        .bind(text)
        .bind(words)
        .execute(&mut *tx)
        .await?;

        ids.push(result.last_insert_rowid());
    }

    tx.commit().await?;
    Ok(ids)
}

/// Insert embeddings for the given chunks in one transaction.
///
/// `vectors` must be parallel to `chunk_ids`; absent slots (failed
/// embeddings) are skipped. Returns the number of vectors stored.
pub async fn store_vectors(
    pool: &SqlitePool,
    chunk_ids: &[i64],
    vectors: &[Option<Vec<f32>>],
) -> Result<usize> {
    if chunk_ids.len() != vectors.len() {
        return Err(Error::Validation(format!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunk_ids.len(),
            vectors.len()
        )));
    }

    let mut tx = pool.begin().await?;
    let mut stored = 0usize;

    for (chunk_id, vector) in chunk_ids.iter().zip(vectors.iter()) {
        let Some(vector) = vector else { continue };

        sqlx::query("INSERT OR REPLACE INTO embeddings (chunk_id, dims, vector) VALUES (?, ?, ?)")
            .bind(chunk_id)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        stored += 1;
    }

    tx.commit().await?;
    Ok(stored)
}

/// Top-k similarity search over completed documents.
///
/// Results are sorted by similarity descending, ties broken by chunk id
/// ascending for deterministic output. Candidates whose stored
/// dimensionality differs from the query vector are skipped.
pub async fn search_top_k(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
    min_similarity: f64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.doc_id, c.chunk_index, c.chunk_text, c.word_count,
               d.original_name, e.dims, e.vector
        FROM embeddings e
        JOIN chunks c ON c.id = e.chunk_id
        JOIN documents d ON d.id = c.doc_id
        WHERE d.status = 'completed'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<SearchHit> = Vec::new();

    for row in rows {
        let dims: i64 = row.get("dims");
        if dims as usize != query_vec.len() {
            continue;
        }

        let blob: Vec<u8> = row.get("vector");
        let similarity = normalized_similarity(query_vec, &blob_to_vec(&blob));
        if similarity < min_similarity {
            continue;
        }

        hits.push(SearchHit {
            chunk_id: row.get("chunk_id"),
            doc_id: row.get("doc_id"),
            filename: row.get("original_name"),
            text: row.get("chunk_text"),
            chunk_index: row.get("chunk_index"),
            word_count: row.get("word_count"),
            similarity,
        });
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(k);

    Ok(hits)
}

/// Remove a document's chunks and embeddings. No-op when none exist.
pub async fn delete_for_document(pool: &SqlitePool, doc_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE doc_id = ?)")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// A document's current chunks, ordered by chunk index.
pub async fn get_document_chunks(pool: &SqlitePool, doc_id: i64) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT id, doc_id, chunk_index, chunk_text, word_count
         FROM chunks WHERE doc_id = ? ORDER BY chunk_index",
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Chunk {
            id: row.get("id"),
            doc_id: row.get("doc_id"),
            chunk_index: row.get("chunk_index"),
            chunk_text: row.get("chunk_text"),
            word_count: row.get("word_count"),
        })
        .collect())
}

/// Aggregate index counts.
pub async fn stats(pool: &SqlitePool) -> Result<IndexStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(DISTINCT doc_id) FROM chunks) AS indexed_documents,
            (SELECT COUNT(*) FROM chunks) AS total_chunks,
            (SELECT COUNT(*) FROM embeddings) AS total_embeddings,
            (SELECT COALESCE(AVG(word_count), 0.0) FROM chunks) AS avg_chunk_words
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(IndexStats {
        indexed_documents: row.get("indexed_documents"),
        total_chunks: row.get("total_chunks"),
        total_embeddings: row.get("total_embeddings"),
        avg_chunk_words: row.get("avg_chunk_words"),
    })
}
