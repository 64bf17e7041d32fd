//! Text extraction from registered files.
//!
//! Extraction is behind the [`TextExtractor`] trait so the pipeline can
//! be driven with a double in tests. [`FileExtractor`] handles plain
//! text (read directly) and PDF (native text layer via `pdf-extract`).

use std::path::Path;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Outcome of extracting text from one file.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    /// How the text was obtained, e.g. `"direct"` or `"native-pdf"`.
    pub method: String,
    /// Extractor's confidence in the text, 0-100, when it has one.
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, mime: &str) -> Result<Extraction>;
}

/// Extractor over local files, dispatching on MIME type.
pub struct FileExtractor;

impl FileExtractor {
    fn extract_plain_text(path: &Path) -> Result<Extraction> {
        let text = std::fs::read_to_string(path)?;
        let text = text.trim().to_string();

        if text.is_empty() {
            return Err(Error::Service {
                service: "extraction",
                reason: format!("{} contains no text", path.display()),
            });
        }

        Ok(Extraction {
            text,
            method: "direct".to_string(),
            confidence: Some(100.0),
        })
    }

    async fn extract_pdf(path: &Path) -> Result<Extraction> {
        let path = path.to_path_buf();

        // pdf-extract is synchronous and can chew on large files.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .map_err(|e| Error::Service {
                service: "extraction",
                reason: format!("extraction task failed: {}", e),
            })?
            .map_err(|e| Error::Service {
                service: "extraction",
                reason: format!("PDF text extraction failed: {}", e),
            })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::Service {
                service: "extraction",
                reason: "PDF has no extractable text layer".to_string(),
            });
        }

        Ok(Extraction {
            text,
            method: "native-pdf".to_string(),
            confidence: None,
        })
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, path: &Path, mime: &str) -> Result<Extraction> {
        match mime {
            "text/plain" => Self::extract_plain_text(path),
            "application/pdf" => Self::extract_pdf(path).await,
            other => Err(Error::Service {
                service: "extraction",
                reason: format!("unsupported file type: {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn plain_text_is_read_and_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  Hello from a text file.  ").unwrap();

        let out = FileExtractor
            .extract(file.path(), "text/plain")
            .await
            .unwrap();
        assert_eq!(out.text, "Hello from a text file.");
        assert_eq!(out.method, "direct");
    }

    #[tokio::test]
    async fn empty_file_is_an_extraction_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FileExtractor
            .extract(file.path(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Service { .. }));
    }

    #[tokio::test]
    async fn unsupported_mime_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FileExtractor
            .extract(file.path(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Service { .. }));
    }
}
