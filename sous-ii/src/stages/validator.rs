//! Validation stage
//!
//! The last stage owns the final entity list. It combines per-stage
//! evidence into one confidence per entity, merges duplicates, clears
//! implausible quantities while keeping their entities, and drops
//! entities below the confidence floor. Order is preserved: extracted
//! entities in appearance order, then inferred ones.

use crate::catalog::IngredientCatalog;
use crate::config::PipelineConfig;
use crate::stages::quantity::{to_base_amount, UnitClass};
use crate::types::{
    CanonicalMatch, Ingredient, IngredientSource, InferredIngredient, QuantityAnnotation, RawSpan,
    SpanLabel,
};
use sous_common::text::normalize;
use std::collections::{BTreeMap, HashMap};

/// Largest plausible volume in milliliters
const MAX_VOLUME_ML: f64 = 12_000.0;

/// Largest plausible mass in grams
const MAX_MASS_G: f64 = 5_000.0;

/// Largest plausible discrete count
const MAX_COUNT: f64 = 100.0;

/// Validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput {
    /// Surviving entities
    pub entities: Vec<Ingredient>,
    /// Duplicate entities merged away
    pub merged_duplicates: usize,
    /// Implausible quantities cleared
    pub quantities_rejected: usize,
    /// Entities dropped below the confidence floor
    pub dropped_below_floor: usize,
}

/// Run validation over the collected stage outputs
///
/// `matches` must be parallel to `spans`. Inferred ingredients whose
/// catalog id duplicates an extracted one should already have been
/// removed; any duplicates that remain are merged here.
pub fn validate_entities(
    config: &PipelineConfig,
    catalog: &IngredientCatalog,
    spans: &[RawSpan],
    matches: &[CanonicalMatch],
    annotations: &BTreeMap<(usize, usize), QuantityAnnotation>,
    inferred: &[InferredIngredient],
) -> ValidatedOutput {
    // Each candidate carries its recognition confidence so duplicate
    // merging can rank extractions by it; inferred candidates have none
    let mut candidates: Vec<(Ingredient, Option<f64>)> =
        Vec::with_capacity(spans.len() + inferred.len());

    for (span, m) in spans.iter().zip(matches) {
        let annotation = annotations.get(&(span.start, span.end));
        let confidence = config.weights.combine(
            Some(span.raw_confidence),
            Some(m.match_confidence),
            None,
        );
        candidates.push((
            Ingredient {
                text: span.text.clone(),
                label: span.label,
                confidence,
                quantity: annotation.and_then(|a| a.value),
                unit: annotation.and_then(|a| a.unit.clone()),
                source: IngredientSource::Extracted,
                catalog_id: m.catalog_id.clone(),
            },
            Some(span.raw_confidence),
        ));
    }

    for item in inferred {
        let canonical_evidence = item
            .catalog_id
            .as_ref()
            .filter(|id| catalog.contains(id))
            .map(|_| 1.0);
        let confidence =
            config
                .weights
                .combine(None, canonical_evidence, Some(item.plausibility));
        candidates.push((
            Ingredient {
                text: item.name.clone(),
                label: SpanLabel::Ingredient,
                confidence,
                quantity: item.quantity,
                unit: item.unit.clone(),
                source: IngredientSource::Inferred,
                catalog_id: item.catalog_id.clone(),
            },
            None,
        ));
    }

    // Merge duplicates onto the first occurrence
    let mut merged: Vec<Ingredient> = Vec::with_capacity(candidates.len());
    let mut merged_raw: Vec<Option<f64>> = Vec::with_capacity(candidates.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged_duplicates = 0usize;

    for (candidate, raw) in candidates {
        let key = dedup_key(&candidate);
        match positions.get(&key) {
            Some(&at) => {
                merged_duplicates += 1;
                merge_into(&mut merged[at], &mut merged_raw[at], candidate, raw);
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(candidate);
                merged_raw.push(raw);
            }
        }
    }

    // Clear implausible quantities, keeping the entity
    let mut quantities_rejected = 0usize;
    for entity in &mut merged {
        let Some(value) = entity.quantity else { continue };
        if !quantity_plausible(value, entity.unit.as_deref()) {
            entity.quantity = None;
            entity.unit = None;
            quantities_rejected += 1;
        }
    }

    // Confidence floor; zero confidence never survives
    let mut dropped_below_floor = 0usize;
    let entities: Vec<Ingredient> = merged
        .into_iter()
        .filter(|entity| {
            let keep = entity.confidence >= config.min_confidence_floor && entity.confidence > 0.0;
            if !keep {
                dropped_below_floor += 1;
            }
            keep
        })
        .collect();

    ValidatedOutput {
        entities,
        merged_duplicates,
        quantities_rejected,
        dropped_below_floor,
    }
}

fn dedup_key(entity: &Ingredient) -> String {
    match &entity.catalog_id {
        Some(id) => format!("id:{}", id),
        None => format!("text:{}", normalize(&entity.text)),
    }
}

/// Fold `incoming` into the entity already holding its dedup key
///
/// Extracted entities lead over inferred ones. Duplicate extractions keep
/// the one with the higher recognition confidence, so a strongly recognized
/// mention is not displaced by a weaker one that happened to canonicalize
/// better. The merged confidence is the higher combined value either way,
/// and a missing quantity is filled from the other side.
fn merge_into(
    existing: &mut Ingredient,
    existing_raw: &mut Option<f64>,
    incoming: Ingredient,
    incoming_raw: Option<f64>,
) {
    let lead_incoming = if existing.source == incoming.source {
        match (incoming_raw, *existing_raw) {
            (Some(a), Some(b)) if a != b => a > b,
            _ => incoming.confidence > existing.confidence,
        }
    } else {
        incoming.source == IngredientSource::Extracted
    };
    let confidence = existing.confidence.max(incoming.confidence);

    let (mut primary, secondary, primary_raw) = if lead_incoming {
        (incoming, existing.clone(), incoming_raw)
    } else {
        (existing.clone(), incoming, *existing_raw)
    };
    primary.confidence = confidence;
    if primary.quantity.is_none() && secondary.quantity.is_some() {
        primary.quantity = secondary.quantity;
        primary.unit = secondary.unit;
    }
    *existing = primary;
    *existing_raw = primary_raw;
}

fn quantity_plausible(value: f64, unit: Option<&str>) -> bool {
    if value < 0.0 || value.is_nan() {
        return false;
    }
    match unit {
        Some(u) => match to_base_amount(value, u) {
            Some((UnitClass::Volume, base)) => base <= MAX_VOLUME_ML,
            Some((UnitClass::Mass, base)) => base <= MAX_MASS_G,
            Some((UnitClass::Count, count)) => count <= MAX_COUNT,
            None => true,
        },
        None => value <= MAX_COUNT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogId, MatchMethod};

    fn span(text: &str, start: usize, raw: f64) -> RawSpan {
        RawSpan::new(text, start, start + text.len(), SpanLabel::Ingredient, raw)
    }

    fn exact(id: &str, name: &str) -> CanonicalMatch {
        CanonicalMatch {
            catalog_id: Some(CatalogId::new(id)),
            canonical_name: name.to_string(),
            match_confidence: 1.0,
            match_method: MatchMethod::Exact,
        }
    }

    fn unresolved(text: &str) -> CanonicalMatch {
        CanonicalMatch {
            catalog_id: None,
            canonical_name: text.to_string(),
            match_confidence: 0.0,
            match_method: MatchMethod::Unresolved,
        }
    }

    fn annotation(start: usize, end: usize, value: f64, unit: Option<&str>) -> QuantityAnnotation {
        QuantityAnnotation {
            value: Some(value),
            unit: unit.map(|u| u.to_string()),
            is_range: false,
            span_start: start,
            span_end: end,
        }
    }

    fn validate(
        spans: &[RawSpan],
        matches: &[CanonicalMatch],
        annotations: &BTreeMap<(usize, usize), QuantityAnnotation>,
        inferred: &[InferredIngredient],
    ) -> ValidatedOutput {
        validate_entities(
            &PipelineConfig::default(),
            &IngredientCatalog::builtin(),
            spans,
            matches,
            annotations,
            inferred,
        )
    }

    #[test]
    fn test_extracted_confidence_combination() {
        let spans = vec![span("tomato", 0, 0.9)];
        let matches = vec![exact("tomato", "tomato")];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        assert_eq!(out.entities.len(), 1);
        // (0.5 * 0.9 + 0.3 * 1.0) / 0.8
        assert!((out.entities[0].confidence - 0.9375).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_counts_as_zero_evidence() {
        let spans = vec![span("dragonfruit", 0, 0.8)];
        let matches = vec![unresolved("dragonfruit")];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        assert_eq!(out.entities.len(), 1);
        // (0.5 * 0.8 + 0.3 * 0.0) / 0.8
        assert!((out.entities[0].confidence - 0.5).abs() < 1e-9);
        assert_eq!(out.entities[0].catalog_id, None);
    }

    #[test]
    fn test_duplicates_merge_keeping_higher_confidence() {
        let spans = vec![span("tomato", 0, 0.9), span("tomatoes", 20, 0.7)];
        let matches = vec![exact("tomato", "tomato"), exact("tomato", "tomato")];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.merged_duplicates, 1);
        assert_eq!(out.entities[0].text, "tomato");
        // Higher-confidence duplicate wins
        assert!((out.entities[0].confidence - 0.9375).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_extractions_rank_by_recognition_confidence() {
        // The weaker recognition hit canonicalizes better; the stronger
        // hit still leads the merge and the higher combined value is kept
        let spans = vec![span("tomato", 0, 0.86), span("tomatos", 20, 0.90)];
        let matches = vec![
            exact("tomato", "tomato"),
            CanonicalMatch {
                catalog_id: Some(CatalogId::new("tomato")),
                canonical_name: "tomato".to_string(),
                match_confidence: 0.85,
                match_method: MatchMethod::Fuzzy,
            },
        ];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.merged_duplicates, 1);
        assert_eq!(out.entities[0].text, "tomatos");
        // max of (0.5*0.86 + 0.3*1.0)/0.8 and (0.5*0.90 + 0.3*0.85)/0.8
        assert!((out.entities[0].confidence - 0.9125).abs() < 1e-9);
    }

    #[test]
    fn test_extracted_wins_merge_and_takes_inferred_quantity() {
        let spans = vec![span("romaine lettuce", 0, 0.92)];
        let matches = vec![exact("romaine-lettuce", "romaine lettuce")];
        let inferred = vec![InferredIngredient {
            name: "romaine lettuce".to_string(),
            catalog_id: Some(CatalogId::new("romaine-lettuce")),
            plausibility: 0.95,
            quantity: Some(2.0),
            unit: Some("cup".to_string()),
        }];
        let out = validate(&spans, &matches, &BTreeMap::new(), &inferred);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.merged_duplicates, 1);
        assert_eq!(out.entities[0].source, IngredientSource::Extracted);
        assert_eq!(out.entities[0].quantity, Some(2.0));
        assert_eq!(out.entities[0].unit.as_deref(), Some("cup"));
    }

    #[test]
    fn test_negative_quantity_cleared_entity_kept() {
        let spans = vec![span("flour", 8, 0.88)];
        let matches = vec![exact("flour", "flour")];
        let mut annotations = BTreeMap::new();
        annotations.insert((8, 13), annotation(8, 13, -5.0, Some("cup")));
        let out = validate(&spans, &matches, &annotations, &[]);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.quantities_rejected, 1);
        assert_eq!(out.entities[0].quantity, None);
        assert_eq!(out.entities[0].unit, None);
    }

    #[test]
    fn test_volume_bound() {
        let spans = vec![span("flour", 0, 0.88), span("milk", 10, 0.88)];
        let matches = vec![exact("flour", "flour"), exact("milk", "milk")];
        let mut annotations = BTreeMap::new();
        // 50 cups is about 11.8 liters, inside the bound
        annotations.insert((0, 5), annotation(0, 5, 50.0, Some("cup")));
        // 60 cups is past it
        annotations.insert((10, 14), annotation(10, 14, 60.0, Some("cup")));
        let out = validate(&spans, &matches, &annotations, &[]);
        assert_eq!(out.quantities_rejected, 1);
        assert_eq!(out.entities[0].quantity, Some(50.0));
        assert_eq!(out.entities[1].quantity, None);
    }

    #[test]
    fn test_bare_count_bound() {
        let spans = vec![span("egg", 0, 0.9)];
        let matches = vec![exact("egg", "egg")];
        let mut annotations = BTreeMap::new();
        annotations.insert((0, 3), annotation(0, 3, 150.0, None));
        let out = validate(&spans, &matches, &annotations, &[]);
        assert_eq!(out.quantities_rejected, 1);

        // The same number as a mass is fine
        let mut annotations = BTreeMap::new();
        annotations.insert((0, 3), annotation(0, 3, 150.0, Some("g")));
        let out = validate(&spans, &matches, &annotations, &[]);
        assert_eq!(out.quantities_rejected, 0);
        assert_eq!(out.entities[0].quantity, Some(150.0));
    }

    #[test]
    fn test_floor_drops_and_counts() {
        let spans = vec![span("tomato", 0, 0.9), span("odd thing", 10, 0.2)];
        let matches = vec![exact("tomato", "tomato"), unresolved("odd thing")];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        // (0.5 * 0.2) / 0.8 = 0.125 < 0.3
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.dropped_below_floor, 1);
        assert_eq!(out.entities[0].text, "tomato");
    }

    #[test]
    fn test_zero_confidence_dropped_even_without_floor() {
        let config = PipelineConfig {
            min_confidence_floor: 0.0,
            ..Default::default()
        };
        let spans = vec![span("nothing", 0, 0.0)];
        let matches = vec![unresolved("nothing")];
        let out = validate_entities(
            &config,
            &IngredientCatalog::builtin(),
            &spans,
            &matches,
            &BTreeMap::new(),
            &[],
        );
        assert!(out.entities.is_empty());
        assert_eq!(out.dropped_below_floor, 1);
    }

    #[test]
    fn test_inferred_confidence_with_catalog_evidence() {
        let inferred = vec![InferredIngredient {
            name: "croutons".to_string(),
            catalog_id: Some(CatalogId::new("croutons")),
            plausibility: 0.9,
            quantity: Some(0.5),
            unit: Some("cup".to_string()),
        }];
        let out = validate(&[], &[], &BTreeMap::new(), &inferred);
        assert_eq!(out.entities.len(), 1);
        // (0.3 * 1.0 + 0.2 * 0.9) / 0.5
        assert!((out.entities[0].confidence - 0.96).abs() < 1e-9);
        assert_eq!(out.entities[0].source, IngredientSource::Inferred);
    }

    #[test]
    fn test_inferred_confidence_without_catalog_entry() {
        let inferred = vec![InferredIngredient {
            name: "secret sauce".to_string(),
            catalog_id: Some(CatalogId::new("not-in-catalog")),
            plausibility: 0.9,
            quantity: None,
            unit: None,
        }];
        let out = validate(&[], &[], &BTreeMap::new(), &inferred);
        assert_eq!(out.entities.len(), 1);
        // Plausibility is the only evidence
        assert!((out.entities[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_extracted_order_preserved() {
        let spans = vec![
            span("flour", 0, 0.88),
            span("egg", 10, 0.9),
            span("milk", 20, 0.88),
        ];
        let matches = vec![
            exact("flour", "flour"),
            exact("egg", "egg"),
            exact("milk", "milk"),
        ];
        let out = validate(&spans, &matches, &BTreeMap::new(), &[]);
        let texts: Vec<&str> = out.entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["flour", "egg", "milk"]);
    }
}
