//! Document store: CRUD and the ingestion lifecycle state machine.
//!
//! Status moves `pending -> processing -> {completed, failed}`. The
//! `processing` claim is a guarded UPDATE so two pipeline runs cannot
//! process the same document concurrently.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::error;

use crate::error::{Error, Result};
use crate::models::{DocStatus, Document, DocumentStats, NewDocument};

/// Stage a local file for ingestion: copy it into `upload_dir` under a
/// fresh UUID filename and build the registration record.
///
/// The MIME type is taken from `mime` when given, otherwise inferred
/// from the file extension.
pub fn register_file(
    upload_dir: &std::path::Path,
    src: &std::path::Path,
    original_name: Option<&str>,
    mime: Option<&str>,
) -> Result<NewDocument> {
    let meta = std::fs::metadata(src)
        .map_err(|_| Error::Validation(format!("file not found: {}", src.display())))?;
    if !meta.is_file() {
        return Err(Error::Validation(format!(
            "not a regular file: {}",
            src.display()
        )));
    }

    let basename = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("invalid file name: {}", src.display())))?;

    let extension = src.extension().and_then(|e| e.to_str());
    let file_type = match mime {
        Some(m) => m.to_string(),
        None => match extension.map(str::to_ascii_lowercase).as_deref() {
            Some("txt") | Some("md") => "text/plain".to_string(),
            Some("pdf") => "application/pdf".to_string(),
            other => {
                return Err(Error::Validation(format!(
                    "unsupported file extension: {}",
                    other.unwrap_or("(none)")
                )))
            }
        },
    };

    std::fs::create_dir_all(upload_dir)?;
    let filename = match extension {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
        None => uuid::Uuid::new_v4().to_string(),
    };
    let dest = upload_dir.join(&filename);
    std::fs::copy(src, &dest)?;

    Ok(NewDocument {
        filename,
        original_name: original_name.unwrap_or(basename).to_string(),
        file_path: dest.display().to_string(),
        file_type: Some(file_type),
        file_size: Some(meta.len() as i64),
    })
}

fn map_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        extracted_text: row.get("extracted_text"),
        extraction_method: row.get("extraction_method"),
        status: DocStatus::parse(&status)?,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        processed_at: row.get("processed_at"),
    })
}

/// Register a new document in `pending` state. Returns its id.
pub async fn create(pool: &SqlitePool, doc: &NewDocument) -> Result<i64> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO documents
            (filename, original_name, file_path, file_type, file_size, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&doc.filename)
    .bind(&doc.original_name)
    .bind(&doc.file_path)
    .bind(&doc.file_type)
    .bind(doc.file_size)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_document).transpose()
}

/// List documents, newest first, optionally filtered by status.
pub async fn list(
    pool: &SqlitePool,
    status: Option<DocStatus>,
    limit: Option<i64>,
) -> Result<Vec<Document>> {
    let limit = limit.unwrap_or(100);

    let rows = match status {
        Some(status) => {
            sqlx::query(
                "SELECT * FROM documents WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM documents ORDER BY created_at DESC, id DESC LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(map_document).collect()
}

/// Claim a pending document for processing.
///
/// Guarded transition: a missing document is `NotFound`; any status
/// other than `pending` is a state conflict.
pub async fn begin_processing(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query(
        "UPDATE documents SET status = 'processing', updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        if get(pool, id).await?.is_none() {
            return Err(Error::NotFound(format!("document {} not found", id)));
        }
        return Err(Error::StateConflict(format!(
            "document {} is not pending",
            id
        )));
    }
    Ok(())
}

/// Record successful extraction and mark the document `completed`.
pub async fn complete_extraction(
    pool: &SqlitePool,
    id: i64,
    text: &str,
    method: &str,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE documents
        SET status = 'completed', extracted_text = ?, extraction_method = ?,
            error_message = NULL, processed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(text)
    .bind(method)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a document `failed` with a message. Best effort: a failure to
/// record the failure is logged, never propagated, so the pipeline's
/// original error stays the one that surfaces.
pub async fn mark_failed(pool: &SqlitePool, id: i64, message: &str) {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE documents SET status = 'failed', error_message = ?, processed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(message)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        error!(doc_id = id, error = %e, "failed to record document failure");
    }
}

/// Delete a document, its backing file, and (via FK cascade) its chunks
/// and embeddings.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let doc = get(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document {} not found", id)))?;

    // A missing backing file is not an error; the record still goes.
    if let Err(e) = std::fs::remove_file(&doc.file_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(e.into());
        }
    }

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Counts by status plus total stored bytes.
pub async fn stats(pool: &SqlitePool) -> Result<DocumentStats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(status = 'completed'), 0) AS completed,
            COALESCE(SUM(status = 'processing'), 0) AS processing,
            COALESCE(SUM(status = 'pending'), 0) AS pending,
            COALESCE(SUM(status = 'failed'), 0) AS failed,
            COALESCE(SUM(file_size), 0) AS total_size
        FROM documents
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(DocumentStats {
        total: row.get("total"),
        completed: row.get("completed"),
        processing: row.get("processing"),
        pending: row.get("pending"),
        failed: row.get("failed"),
        total_size: row.get("total_size"),
    })
}
