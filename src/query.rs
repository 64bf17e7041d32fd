//! Query orchestration: semantic search and grounded answering.
//!
//! `search` embeds the query and scans the vector index. `answer` goes
//! one step further: it assembles the retrieved chunks into a labeled
//! context block, asks the generation provider to answer strictly from
//! it, and returns the answer with cited sources.

use tracing::info;

use crate::error::{Error, Result};
use crate::generation::GenerationOptions;
use crate::models::{Answer, SearchHit, Source};
use crate::pipeline::AppContext;
use crate::vector_index;

const SNIPPET_CHARS: usize = 200;

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided document excerpts. \
Answer using only the information in the context. \
If the context does not contain the information needed, say so plainly instead of guessing. \
Cite the sources you used by their bracketed number.";

/// Free-text semantic search over all indexed documents.
pub async fn search(
    ctx: &AppContext,
    query: &str,
    limit: Option<usize>,
    min_similarity: Option<f64>,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Err(Error::Validation("search query must not be empty".to_string()));
    }

    let limit = limit.unwrap_or(ctx.config.retrieval.search_limit);
    let threshold = min_similarity.unwrap_or(ctx.config.retrieval.search_min_similarity);

    let query_vec = ctx.embedder.embed_one(query).await?;
    let hits = vector_index::search_top_k(&ctx.pool, &query_vec, limit, threshold).await?;

    info!(hits = hits.len(), "search completed");
    Ok(hits)
}

/// Answer a question from indexed documents, with cited sources.
///
/// Zero retrieval hits is a successful response with `no_results` set,
/// not an error. The generation provider is checked up front so a
/// missing API key fails before any embedding work.
pub async fn answer(
    ctx: &AppContext,
    question: &str,
    limit: Option<usize>,
    model: Option<String>,
) -> Result<Answer> {
    if question.trim().is_empty() {
        return Err(Error::Validation("question must not be empty".to_string()));
    }

    if !ctx.generator.available().await {
        return Err(Error::ServiceUnavailable {
            service: "generation",
            reason: "generation provider is not configured".to_string(),
        });
    }

    let limit = limit.unwrap_or(ctx.config.retrieval.answer_limit);
    let threshold = ctx.config.retrieval.answer_min_similarity;

    let query_vec = ctx.embedder.embed_one(question).await?;
    let hits = vector_index::search_top_k(&ctx.pool, &query_vec, limit, threshold).await?;

    if hits.is_empty() {
        return Ok(Answer {
            answer: "I couldn't find any relevant information in the indexed documents to answer \
                     your question."
                .to_string(),
            model: None,
            sources: Vec::new(),
            no_results: true,
            chunks_retrieved: 0,
            tokens_generated: None,
            response_time_ms: None,
        });
    }

    let context = build_context(&hits);
    let prompt = format!("Context:\n{}\n\nQuestion: {}", context, question);

    let generation = ctx
        .generator
        .generate(
            &prompt,
            &GenerationOptions {
                system: ANSWER_SYSTEM_PROMPT.to_string(),
                temperature: ctx.config.generation.temperature,
                max_tokens: ctx.config.generation.max_tokens,
                model,
            },
        )
        .await?;

    let sources = hits.iter().map(to_source).collect();

    info!(
        chunks = hits.len(),
        model = %generation.model,
        "question answered"
    );

    Ok(Answer {
        answer: generation.text,
        model: Some(generation.model),
        sources,
        no_results: false,
        chunks_retrieved: hits.len(),
        tokens_generated: generation.tokens_generated,
        response_time_ms: generation.time_ms,
    })
}

/// Label each chunk with its source document and join with separators.
fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}: {}]\n{}", i + 1, hit.filename, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn to_source(hit: &SearchHit) -> Source {
    Source {
        document_id: hit.doc_id,
        filename: hit.filename.clone(),
        similarity: (hit.similarity * 10000.0).round() / 10000.0,
        snippet: snippet(&hit.text),
        chunk_index: hit.chunk_index,
    }
}

/// First `SNIPPET_CHARS` characters on a char boundary, with an ellipsis
/// when truncated.
fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(i: i64, filename: &str, text: &str, similarity: f64) -> SearchHit {
        SearchHit {
            chunk_id: i,
            doc_id: i,
            filename: filename.to_string(),
            text: text.to_string(),
            chunk_index: 0,
            word_count: 5,
            similarity,
        }
    }

    #[test]
    fn context_labels_each_source() {
        let hits = vec![
            hit(1, "a.txt", "Alpha text.", 0.9),
            hit(2, "b.txt", "Beta text.", 0.8),
        ];
        let context = build_context(&hits);
        assert!(context.starts_with("[Source 1: a.txt]\nAlpha text."));
        assert!(context.contains("\n\n---\n\n[Source 2: b.txt]\nBeta text."));
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let short = "short text";
        assert_eq!(snippet(short), short);

        let long = "é".repeat(250);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn source_similarity_is_rounded_to_four_decimals() {
        let s = to_source(&hit(1, "a.txt", "text", 0.87654321));
        assert_eq!(s.similarity, 0.8765);
    }
}
