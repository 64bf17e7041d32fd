//! Pure text chunker: splits extracted document text into overlapping,
//! bounded-size segments for retrieval.
//!
//! Text is first normalized (line endings unified, whitespace runs
//! collapsed), then split into semantic units: blank-line-separated
//! paragraphs, or sentences when the text has no paragraph structure.
//! Units are accumulated greedily up to a word budget and never split
//! mid-unit; consecutive chunks share a trailing-unit overlap for
//! contextual continuity.

/// Word-budget knobs for [`chunk`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Flush the running chunk before its word count would exceed this.
    pub target_words: usize,
    /// Trailing words of a flushed chunk carried into the next one.
    pub overlap_words: usize,
    /// Chunks below this word count are dropped.
    pub min_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_words: 500,
            overlap_words: 100,
            min_words: 50,
        }
    }
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Normalize whitespace: CRLF/CR to LF, horizontal whitespace runs to a
/// single space, three-or-more newlines to a paragraph break, trimmed.
pub fn preprocess(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut pending_newlines = 0usize;
    let mut pending_space = false;

    for ch in unified.chars() {
        match ch {
            '\n' => {
                pending_newlines += 1;
                pending_space = false;
            }
            c if c.is_whitespace() => {
                pending_space = true;
            }
            c => {
                if pending_newlines > 0 {
                    if !out.is_empty() {
                        out.push_str(if pending_newlines >= 2 { "\n\n" } else { "\n" });
                    }
                    pending_newlines = 0;
                } else if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }

    out
}

/// Split normalized text into overlapping chunks. Deterministic and pure.
///
/// Returns an empty vec for empty/whitespace input. A single unit longer
/// than `target_words` is emitted as one oversized chunk rather than
/// being split. If no chunk clears `min_words` but the whole text does,
/// the whole text is emitted as a single fallback chunk.
pub fn chunk(text: &str, cfg: &ChunkConfig) -> Vec<String> {
    let normalized = preprocess(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let (units, sep) = split_units(&normalized);

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for unit in &units {
        let unit_words = word_count(unit);

        if current_words + unit_words > cfg.target_words && !current.is_empty() {
            flush(&mut chunks, &current, sep, cfg.min_words);

            let (kept, kept_words) = overlap_tail(&current, cfg.overlap_words);
            current = kept;
            current_words = kept_words;
        }

        current.push(unit);
        current_words += unit_words;
    }

    if !current.is_empty() {
        flush(&mut chunks, &current, sep, cfg.min_words);
    }

    // Small texts: everything fell below min_words, but the whole text
    // may still be worth indexing as one chunk.
    if chunks.is_empty() && word_count(&normalized) >= cfg.min_words {
        chunks.push(normalized);
    }

    chunks
}

/// Semantic units and the separator used to rejoin them: paragraphs when
/// the text has blank-line structure, sentences otherwise.
fn split_units(normalized: &str) -> (Vec<String>, &'static str) {
    let paragraphs: Vec<String> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if paragraphs.len() > 1 {
        return (paragraphs, "\n\n");
    }

    let sentences = split_sentences(normalized);
    if sentences.len() > 1 {
        (sentences, " ")
    } else {
        (paragraphs, "\n\n")
    }
}

/// Terminal-punctuation sentence split: break after `.`/`!`/`?` followed
/// by whitespace or end of input.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let at_boundary = match iter.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence.to_string());
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }

    out
}

fn flush(chunks: &mut Vec<String>, current: &[&str], sep: &str, min_words: usize) {
    let text = current.join(sep);
    if word_count(&text) >= min_words {
        chunks.push(text);
    }
}

/// Trailing units of a flushed chunk whose accumulated word count stays
/// within the overlap budget, preserving original order.
fn overlap_tail<'a>(current: &[&'a str], overlap_words: usize) -> (Vec<&'a str>, usize) {
    let mut kept: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for unit in current.iter().rev() {
        let w = word_count(unit);
        if total + w <= overlap_words {
            kept.push(unit);
            total += w;
        } else {
            break;
        }
    }

    kept.reverse();
    (kept, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(target: usize, overlap: usize, min: usize) -> ChunkConfig {
        ChunkConfig {
            target_words: target,
            overlap_words: overlap,
            min_words: min,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk("", &ChunkConfig::default()).is_empty());
        assert!(chunk("   \n\t  \n\n ", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn preprocess_normalizes_whitespace() {
        assert_eq!(preprocess("a\r\nb\n\n\n\nc   d\t e"), "a\nb\n\nc d e");
        assert_eq!(preprocess("  leading and trailing  "), "leading and trailing");
    }

    #[test]
    fn short_text_below_min_is_dropped() {
        let chunks = chunk("Too short.", &cfg(100, 10, 50));
        assert!(chunks.is_empty());
    }

    #[test]
    fn small_text_falls_back_to_single_chunk() {
        let text = "One two three four five six.";
        let chunks = chunk(text, &cfg(100, 10, 3));
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn sentence_units_respect_word_budget() {
        let text = "The sky is blue. Water is wet. Cats are mammals.";
        let chunks = chunk(text, &cfg(5, 2, 2));
        assert_eq!(
            chunks,
            vec![
                "The sky is blue.".to_string(),
                "Water is wet.".to_string(),
                "Cats are mammals.".to_string(),
            ]
        );
        for c in &chunks {
            assert!(word_count(c) >= 2);
        }
    }

    #[test]
    fn paragraph_units_are_never_split() {
        let p1 = "Alpha beta gamma delta epsilon zeta.";
        let p2 = "Eta theta iota kappa lambda mu.";
        let p3 = "Nu xi omicron pi rho sigma.";
        let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);

        let chunks = chunk(&text, &cfg(10, 0, 2));
        assert_eq!(chunks, vec![p1.to_string(), p2.to_string(), p3.to_string()]);
    }

    #[test]
    fn overlap_carries_trailing_units_forward() {
        let p1 = "Alpha beta gamma delta epsilon zeta.";
        let p2 = "Eta theta iota kappa lambda mu.";
        let p3 = "Nu xi omicron pi rho sigma.";
        let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);

        // Each paragraph is 6 words; overlap budget fits exactly one.
        let chunks = chunk(&text, &cfg(10, 6, 2));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], p1);
        assert!(chunks[1].starts_with(p1), "expected overlap seed: {}", chunks[1]);
        assert!(chunks[1].ends_with(p2));
        assert!(chunks[2].starts_with(p2));
        assert!(chunks[2].ends_with(p3));
    }

    #[test]
    fn oversized_single_unit_is_emitted_whole() {
        let text = "one two three four five six seven eight nine ten \
                    eleven twelve thirteen fourteen fifteen";
        let chunks = chunk(text, &cfg(5, 2, 2));
        assert_eq!(chunks.len(), 1);
        assert_eq!(word_count(&chunks[0]), 15);
    }

    #[test]
    fn chunks_below_min_words_are_filtered() {
        // First sentence (2 words) is flushed below min and dropped.
        let text = "One two. Three four five six.";
        let chunks = chunk(text, &cfg(3, 0, 3));
        assert_eq!(chunks, vec!["Three four five six.".to_string()]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "First paragraph here with words.\n\nSecond paragraph follows along.\n\n\
                    Third paragraph closes it out.";
        let c = cfg(8, 3, 2);
        assert_eq!(chunk(text, &c), chunk(text, &c));
    }

    #[test]
    fn every_chunk_meets_min_words() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} has exactly six words.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let c = cfg(50, 10, 10);
        for chunk_text in chunk(&text, &c) {
            assert!(word_count(&chunk_text) >= 10);
        }
    }
}
