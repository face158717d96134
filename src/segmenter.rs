//! Deterministic sentence-boundary text segmentation.
//!
//! Splits a document into bounded-length chunks along sentence boundaries,
//! keeping terminal punctuation attached to the preceding sentence. Sentences
//! longer than the limit are hard-sliced into fixed-size pieces. The function
//! is total: degenerate input degrades to a sentinel chunk or plain slicing,
//! never an error, because downstream indexing needs at least one chunk.

/// The chunk emitted for an empty or whitespace-only document.
///
/// Byte-identical to the sentinel earlier cache generations wrote into
/// `chunks.txt`, so reloading old entries stays consistent.
pub const EMPTY_DOC_SENTINEL: &str = "空文档";

/// Sentence-terminal punctuation, CJK and Latin.
const SENTENCE_ENDERS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

/// Split `text` into chunks of at most `max_length` characters along sentence
/// boundaries.
///
/// Sentences are accumulated greedily: when appending the next sentence would
/// exceed `max_length` and the buffer is non-empty, the buffer is flushed as
/// one chunk. A single sentence longer than `max_length` flushes any pending
/// buffer and is hard-sliced into `max_length`-character pieces.
///
/// Empty or whitespace-only input yields exactly one [`EMPTY_DOC_SENTINEL`]
/// chunk, never an empty vector. Same input always yields the same chunks,
/// in source order.
pub fn split(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);

    if text.trim().is_empty() {
        return vec![EMPTY_DOC_SENTINEL.to_string()];
    }

    let sentences: Vec<&str> =
        split_sentences(text).into_iter().map(str::trim).filter(|s| !s.is_empty()).collect();

    if sentences.is_empty() {
        // No sentence units at all; fall back to slicing the raw text.
        return hard_slice(text.trim(), max_length);
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();

        if sentence_len > max_length {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            chunks.extend(hard_slice(sentence, max_length));
            continue;
        }

        if buf_len + sentence_len > max_length && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        buf.push_str(sentence);
        buf_len += sentence_len;
    }

    if !buf.trim().is_empty() {
        chunks.push(buf);
    }

    if chunks.is_empty() {
        // Sentences existed but packing produced nothing; slice the raw text.
        return hard_slice(text.trim(), max_length);
    }

    chunks
}

/// Split at sentence-terminal punctuation, keeping the punctuation attached
/// to the preceding unit.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;

    for (pos, ch) in text.char_indices() {
        if SENTENCE_ENDERS.contains(&ch) {
            let end = pos + ch.len_utf8();
            units.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        units.push(&text[start..]);
    }

    units
}

/// Slice `text` into pieces of exactly `max_length` characters (the last may
/// be shorter). No sentence awareness.
fn hard_slice(text: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_length).map(|piece| piece.iter().collect()).collect()
}
