use std::sync::{Mutex, MutexGuard};

use crate::operations::OperationError;
use crate::placement::Point;
use crate::utils::floor_char_boundary;

pub const MAX_TRANSCRIPT_LENGTH: usize = 10_000;

/// The editor that owns the document text. The core only reads snapshots and
/// proposes replacements; persistence and debouncing stay on the host side.
pub trait DocumentHost: Send + Sync {
    fn content(&self) -> String;

    fn propose_content(&self, content: String);

    fn insert_at_caret(&self, text: &str);

    fn caret_anchor_point(&self) -> Option<Point>;
}

/// Replaces `[start, end)` of `content` with `replacement`, but only when that
/// span still reads `expected`.
pub fn splice_checked(
    content: &str,
    start: usize,
    end: usize,
    expected: &str,
    replacement: &str,
) -> Result<String, OperationError> {
    if start > end
        || end > content.len()
        || !content.is_char_boundary(start)
        || !content.is_char_boundary(end)
        || &content[start..end] != expected
    {
        return Err(OperationError::StaleSelection);
    }

    let mut spliced = String::with_capacity(content.len() - (end - start) + replacement.len());
    spliced.push_str(&content[..start]);
    spliced.push_str(replacement);
    spliced.push_str(&content[end..]);
    Ok(spliced)
}

pub fn replace_first(content: &str, token: &str, replacement: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    let position = content.find(token)?;
    let mut replaced = String::with_capacity(content.len() - token.len() + replacement.len());
    replaced.push_str(&content[..position]);
    replaced.push_str(replacement);
    replaced.push_str(&content[position + token.len()..]);
    Some(replaced)
}

pub fn normalize_transcript(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    let trimmed = cleaned.trim();

    match trimmed.char_indices().nth(MAX_TRANSCRIPT_LENGTH) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocument {
    inner: Mutex<MemoryDocumentState>,
}

#[derive(Debug, Default)]
struct MemoryDocumentState {
    content: String,
    caret: usize,
    caret_anchor: Option<Point>,
    proposals: usize,
}

impl MemoryDocument {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let caret = content.len();
        Self {
            inner: Mutex::new(MemoryDocumentState {
                content,
                caret,
                caret_anchor: None,
                proposals: 0,
            }),
        }
    }

    pub fn set_content(&self, content: impl Into<String>) {
        let mut state = self.lock();
        state.content = content.into();
        state.caret = floor_char_boundary(&state.content, state.caret);
    }

    pub fn set_caret(&self, caret: usize) {
        let mut state = self.lock();
        state.caret = floor_char_boundary(&state.content, caret);
    }

    pub fn set_caret_anchor(&self, anchor: Option<Point>) {
        self.lock().caret_anchor = anchor;
    }

    pub fn proposal_count(&self) -> usize {
        self.lock().proposals
    }

    fn lock(&self) -> MutexGuard<'_, MemoryDocumentState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentHost for MemoryDocument {
    fn content(&self) -> String {
        self.lock().content.clone()
    }

    fn propose_content(&self, content: String) {
        let mut state = self.lock();
        state.caret = floor_char_boundary(&content, state.caret);
        state.content = content;
        state.proposals += 1;
    }

    fn insert_at_caret(&self, text: &str) {
        let mut state = self.lock();
        let caret = floor_char_boundary(&state.content, state.caret);
        state.content.insert_str(caret, text);
        state.caret = caret + text.len();
    }

    fn caret_anchor_point(&self) -> Option<Point> {
        self.lock().caret_anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_replaces_matching_span() {
        let result = splice_checked("abcdef", 1, 4, "bcd", "BCD");
        assert_eq!(result, Ok("aBCDef".to_string()));
    }

    #[test]
    fn splice_rejects_changed_span() {
        let result = splice_checked("abXdef", 1, 4, "bcd", "BCD");
        assert_eq!(result, Err(OperationError::StaleSelection));
    }

    #[test]
    fn splice_rejects_out_of_range_and_split_chars() {
        assert_eq!(
            splice_checked("abc", 2, 9, "c", "C"),
            Err(OperationError::StaleSelection)
        );
        // byte 2 falls inside `é`
        assert_eq!(
            splice_checked("aé", 2, 3, "", "x"),
            Err(OperationError::StaleSelection)
        );
    }

    #[test]
    fn splice_handles_multibyte_neighbours() {
        let result = splice_checked("héllo wörld", 7, 13, "wörld", "WÖRLD");
        assert_eq!(result, Ok("héllo WÖRLD".to_string()));
    }

    #[test]
    fn replace_first_only_touches_first_occurrence() {
        let result = replace_first("a [T] b [T]", "[T]", "x");
        assert_eq!(result.as_deref(), Some("a x b [T]"));
        assert_eq!(replace_first("nothing here", "[T]", "x"), None);
        assert_eq!(replace_first("abc", "", "x"), None);
    }

    #[test]
    fn normalize_strips_controls_and_trims() {
        assert_eq!(normalize_transcript("  hello\u{0007} world \n"), "hello world");
        assert_eq!(normalize_transcript("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn normalize_bounds_length() {
        let long = "é".repeat(MAX_TRANSCRIPT_LENGTH + 25);
        assert_eq!(
            normalize_transcript(&long).chars().count(),
            MAX_TRANSCRIPT_LENGTH
        );
    }

    #[test]
    fn memory_document_inserts_at_caret_and_tracks_proposals() {
        let document = MemoryDocument::new("hello world");
        document.set_caret(5);
        document.insert_at_caret(",");
        assert_eq!(document.content(), "hello, world");

        document.propose_content("replaced".to_string());
        assert_eq!(document.content(), "replaced");
        assert_eq!(document.proposal_count(), 1);
    }
}
