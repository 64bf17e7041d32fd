//! Core data models used throughout DocQuest.
//!
//! These types represent the documents, chunks, and search hits that flow
//! through the ingestion and retrieval pipeline.

use serde::Serialize;

use crate::error::Error;

/// Lifecycle status of a document.
///
/// `pending → processing → {completed, failed}`. Terminal for a given
/// pipeline run; re-indexing replaces chunks/embeddings without changing
/// the document status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Pending => "pending",
            DocStatus::Processing => "processing",
            DocStatus::Completed => "completed",
            DocStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(DocStatus::Pending),
            "processing" => Ok(DocStatus::Processing),
            "completed" => Ok(DocStatus::Completed),
            "failed" => Ok(DocStatus::Failed),
            other => Err(Error::Validation(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a file being registered as a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Stored (on-disk) filename.
    pub filename: String,
    /// Original name as provided by the uploader.
    pub original_name: String,
    /// Path to the backing file.
    pub file_path: String,
    /// MIME type, if known.
    pub file_type: Option<String>,
    /// Size in bytes, if known.
    pub file_size: Option<i64>,
}

/// A document record as stored in SQLite.
///
/// Invariants: `extracted_text` is non-null iff `status = completed`;
/// `error_message` is non-null only when `status = failed`.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub extracted_text: Option<String>,
    pub extraction_method: Option<String>,
    pub status: DocStatus,
    pub error_message: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
}

/// A chunk of a document's extracted text, the unit of retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub doc_id: i64,
    /// 0-based, gapless within a document's current chunk set.
    pub chunk_index: i64,
    pub chunk_text: String,
    pub word_count: i64,
}

/// A similarity-search hit joined with its chunk and owning document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub doc_id: i64,
    pub filename: String,
    pub text: String,
    pub chunk_index: i64,
    pub word_count: i64,
    /// Normalized similarity in `[0, 1]`: `(1 + cosine) / 2`.
    pub similarity: f64,
}

/// A cited source attached to a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub document_id: i64,
    pub filename: String,
    /// Rounded to 4 decimal places.
    pub similarity: f64,
    /// At most 200 characters of the chunk text.
    pub snippet: String,
    pub chunk_index: i64,
}

/// The query orchestrator's response.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub model: Option<String>,
    pub sources: Vec<Source>,
    /// True when no chunk cleared the similarity threshold; this is a
    /// success response, not an error.
    pub no_results: bool,
    pub chunks_retrieved: usize,
    pub tokens_generated: Option<u32>,
    pub response_time_ms: Option<u64>,
}

/// Aggregate counts over the document table.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub total: i64,
    pub completed: i64,
    pub processing: i64,
    pub pending: i64,
    pub failed: i64,
    pub total_size: i64,
}

/// Aggregate counts over the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub indexed_documents: i64,
    pub total_chunks: i64,
    pub total_embeddings: i64,
    pub avg_chunk_words: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            DocStatus::Pending,
            DocStatus::Processing,
            DocStatus::Completed,
            DocStatus::Failed,
        ] {
            assert_eq!(DocStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(DocStatus::parse("archived").is_err());
    }
}
