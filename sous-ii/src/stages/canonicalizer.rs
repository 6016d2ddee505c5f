//! Canonicalization stage
//!
//! Resolves each recognized span against the catalog. Produces one match
//! per span, in span order, so downstream stages can zip the two
//! sequences. Unresolved spans get a zero-confidence match and stay in
//! the run.

use crate::catalog::IngredientCatalog;
use crate::types::{CanonicalMatch, MatchMethod, RawSpan};

/// Canonicalization result for a span sequence
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalizationOutcome {
    /// One match per input span, same order
    pub matches: Vec<CanonicalMatch>,
    /// Spans resolved by exact canonical name
    pub exact: usize,
    /// Spans resolved through the synonym table
    pub synonym: usize,
    /// Spans resolved by fuzzy similarity
    pub fuzzy: usize,
    /// Spans left unresolved
    pub unresolved: usize,
}

/// Resolve every span against the catalog
pub fn canonicalize_spans(
    catalog: &IngredientCatalog,
    spans: &[RawSpan],
) -> CanonicalizationOutcome {
    let mut outcome = CanonicalizationOutcome {
        matches: Vec::with_capacity(spans.len()),
        exact: 0,
        synonym: 0,
        fuzzy: 0,
        unresolved: 0,
    };

    for span in spans {
        let m = catalog.lookup(&span.text);
        match m.match_method {
            MatchMethod::Exact => outcome.exact += 1,
            MatchMethod::Synonym => outcome.synonym += 1,
            MatchMethod::Fuzzy => outcome.fuzzy += 1,
            MatchMethod::Unresolved => outcome.unresolved += 1,
        }
        outcome.matches.push(m);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogId, SpanLabel};

    fn span(text: &str, start: usize) -> RawSpan {
        RawSpan::new(text, start, start + text.len(), SpanLabel::Ingredient, 0.9)
    }

    #[test]
    fn test_matches_parallel_to_spans() {
        let catalog = IngredientCatalog::builtin();
        let spans = vec![
            span("romaine lettuce", 0),
            span("tomatoes", 20),
            span("dragonfruit compote", 40),
        ];
        let outcome = canonicalize_spans(&catalog, &spans);

        assert_eq!(outcome.matches.len(), 3);
        assert_eq!(
            outcome.matches[0].catalog_id,
            Some(CatalogId::new("romaine-lettuce"))
        );
        assert_eq!(outcome.matches[1].catalog_id, Some(CatalogId::new("tomato")));
        assert_eq!(outcome.matches[2].catalog_id, None);

        assert_eq!(outcome.exact, 1);
        assert_eq!(outcome.synonym, 1);
        assert_eq!(outcome.fuzzy, 0);
        assert_eq!(outcome.unresolved, 1);
    }

    #[test]
    fn test_empty_spans() {
        let catalog = IngredientCatalog::builtin();
        let outcome = canonicalize_spans(&catalog, &[]);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.exact + outcome.synonym + outcome.fuzzy + outcome.unresolved, 0);
    }
}
