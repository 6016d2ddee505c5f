//! Lexicon-based entity recognition
//!
//! Scans the input text for catalog surface forms, longest form first so
//! "romaine lettuce" wins over "lettuce" at the same position. Matches must
//! be whole words. Spans fully contained in an already-accepted span are
//! suppressed; partial overlaps are kept and left to downstream stages.

use crate::catalog::{IngredientCatalog, SurfaceForm};
use crate::error::StageError;
use crate::types::{EntityRecognizer, RawSpan, SpanLabel};
use std::sync::Arc;

/// Recognizer backed by the catalog lexicon
pub struct LexiconRecognizer {
    forms: Vec<SurfaceForm>,
}

impl LexiconRecognizer {
    /// Build a recognizer from the catalog's surface forms
    pub fn new(catalog: Arc<IngredientCatalog>) -> Self {
        Self {
            forms: catalog.surface_forms(),
        }
    }

    fn scan(&self, text: &str) -> Vec<RawSpan> {
        // ASCII lowercasing preserves byte offsets into the original text
        let scan = text.to_ascii_lowercase();
        let mut accepted: Vec<RawSpan> = Vec::new();

        for form in &self.forms {
            if form.term.is_empty() {
                continue;
            }
            for (start, matched) in scan.match_indices(form.term.as_str()) {
                let end = start + matched.len();
                if !is_word_aligned(&scan, start, end) {
                    continue;
                }
                if let Some(existing) = accepted
                    .iter_mut()
                    .find(|span| span.start == start && span.end == end)
                {
                    if form.confidence > existing.raw_confidence {
                        existing.raw_confidence = form.confidence;
                    }
                    continue;
                }
                let contained = accepted
                    .iter()
                    .any(|span| span.start <= start && end <= span.end);
                if contained {
                    continue;
                }
                accepted.push(RawSpan::new(
                    &text[start..end],
                    start,
                    end,
                    SpanLabel::Ingredient,
                    form.confidence,
                ));
            }
        }

        accepted.sort_by_key(|span| (span.start, span.end));
        accepted
    }
}

/// Whether [start, end) sits on word boundaries in the scanned text
fn is_word_aligned(scan: &str, start: usize, end: usize) -> bool {
    let before_ok = scan[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = scan[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before_ok && after_ok
}

#[async_trait::async_trait]
impl EntityRecognizer for LexiconRecognizer {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    async fn recognize(&self, text: &str) -> Result<Vec<RawSpan>, StageError> {
        Ok(self.scan(text))
    }
}
