//! End-to-end pipeline tests
//!
//! Drive complete analysis runs through the public API and check entity
//! output, stage diagnostics, degradation behavior, and cancellation.

use sous_common::events::EventBus;
use sous_ii::catalog::IngredientCatalog;
use sous_ii::config::PipelineConfig;
use sous_ii::error::StageError;
use sous_ii::knowledge::DishKnowledge;
use sous_ii::pipeline::IngredientPipeline;
use sous_ii::stages::recognizer::LexiconRecognizer;
use sous_ii::types::{
    DishInference, EntityRecognizer, IngredientSource, InferredIngredient, RawSpan, SpanLabel,
    StageReport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn pipeline() -> IngredientPipeline {
    IngredientPipeline::new(PipelineConfig::default()).expect("default config is valid")
}

struct FixedRecognizer {
    spans: Vec<RawSpan>,
}

#[async_trait::async_trait]
impl EntityRecognizer for FixedRecognizer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn recognize(&self, _text: &str) -> Result<Vec<RawSpan>, StageError> {
        Ok(self.spans.clone())
    }
}

struct FailingRecognizer;

#[async_trait::async_trait]
impl EntityRecognizer for FailingRecognizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn recognize(&self, _text: &str) -> Result<Vec<RawSpan>, StageError> {
        Err(StageError::Unavailable("recognizer offline".to_string()))
    }
}

struct FailingInference;

#[async_trait::async_trait]
impl DishInference for FailingInference {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn infer_from_dish(
        &self,
        _description: &str,
    ) -> Result<Vec<InferredIngredient>, StageError> {
        Err(StageError::Unavailable(
            "knowledge source offline".to_string(),
        ))
    }
}

fn with_recognizer(recognizer: Arc<dyn EntityRecognizer>) -> IngredientPipeline {
    let catalog = Arc::new(IngredientCatalog::builtin());
    let knowledge = Arc::new(DishKnowledge::builtin());
    IngredientPipeline::with_stages(
        PipelineConfig::default(),
        catalog,
        recognizer,
        Arc::new(sous_ii::stages::inference::RecipeInference::new(knowledge)),
    )
    .expect("default config is valid")
}

#[tokio::test]
async fn test_direct_extraction_with_quantities() {
    let result = pipeline()
        .analyze(
            "2 cups romaine lettuce, 1 chicken breast, caesar dressing",
            Some("caesar salad"),
        )
        .await;

    assert!(result.error.is_none());
    assert_eq!(result.entities.len(), 3);

    let romaine = &result.entities[0];
    assert_eq!(romaine.text, "romaine lettuce");
    assert_eq!(romaine.quantity, Some(2.0));
    assert_eq!(romaine.unit.as_deref(), Some("cup"));
    assert_eq!(romaine.source, IngredientSource::Extracted);

    let chicken = &result.entities[1];
    assert_eq!(chicken.text, "chicken breast");
    assert_eq!(chicken.quantity, Some(1.0));
    assert_eq!(chicken.unit, None);

    let dressing = &result.entities[2];
    assert_eq!(dressing.text, "caesar dressing");
    assert_eq!(dressing.quantity, None);

    for entity in &result.entities {
        assert!(entity.confidence > 0.0 && entity.confidence <= 1.0);
        assert!(entity.catalog_id.is_some());
    }
    assert!(result.confidence > 0.9);

    // Three high-confidence direct entities mean inference stays out
    match result.stage_results.get("dish_inference") {
        Some(StageReport::DishInference {
            engaged, skipped, ..
        }) => {
            assert!(!engaged);
            assert!(skipped.is_some());
        }
        other => panic!("missing dish inference report: {:?}", other),
    }
}

#[tokio::test]
async fn test_sparse_extraction_engages_inference() {
    let result = pipeline()
        .analyze("dinner tonight", Some("caesar salad"))
        .await;

    assert!(result.error.is_none());
    assert_eq!(result.entities.len(), 4);
    for entity in &result.entities {
        assert_eq!(entity.source, IngredientSource::Inferred);
        assert!(entity.confidence > 0.0 && entity.confidence <= 1.0);
    }

    let romaine = result
        .entities
        .iter()
        .find(|e| e.text == "romaine lettuce")
        .expect("romaine lettuce should be inferred");
    assert_eq!(romaine.quantity, Some(2.0));
    assert_eq!(romaine.unit.as_deref(), Some("cup"));

    match result.stage_results.get("dish_inference") {
        Some(StageReport::DishInference {
            engaged, proposed, ..
        }) => {
            assert!(engaged);
            assert_eq!(*proposed, 4);
        }
        other => panic!("missing dish inference report: {:?}", other),
    }
}

#[tokio::test]
async fn test_inferred_duplicates_of_direct_entities_dropped() {
    // One low-confidence mention keeps inference engaged while romaine is
    // already extracted directly
    let result = pipeline()
        .analyze("some croutons maybe", Some("caesar salad"))
        .await;

    assert!(result.error.is_none());
    let crouton_entities = result
        .entities
        .iter()
        .filter(|e| e.text.to_lowercase().contains("croutons"))
        .count();
    assert_eq!(crouton_entities, 1, "croutons must not appear twice");

    match result.stage_results.get("dish_inference") {
        Some(StageReport::DishInference {
            engaged,
            deduplicated,
            ..
        }) => {
            assert!(engaged);
            assert_eq!(*deduplicated, 1);
        }
        other => panic!("missing dish inference report: {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_mentions_merge() {
    let result = pipeline().analyze("tomato and tomatoes", None).await;

    assert!(result.error.is_none());
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].text, "tomato");

    match result.stage_results.get("validation") {
        Some(StageReport::Validation {
            merged_duplicates, ..
        }) => assert_eq!(*merged_duplicates, 1),
        other => panic!("missing validation report: {:?}", other),
    }
}

#[tokio::test]
async fn test_range_quantity_normalized_to_midpoint() {
    let result = pipeline().analyze("2-3 cups flour", None).await;

    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].quantity, Some(2.5));
    assert_eq!(result.entities[0].unit.as_deref(), Some("cup"));

    match result.stage_results.get("quantity_parsing") {
        Some(StageReport::QuantityParsing { range_count, .. }) => assert_eq!(*range_count, 1),
        other => panic!("missing quantity report: {:?}", other),
    }
}

#[tokio::test]
async fn test_negative_quantity_cleared_entity_survives() {
    let result = pipeline().analyze("-5 cups flour", None).await;

    assert!(result.error.is_none());
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].text, "flour");
    assert_eq!(result.entities[0].quantity, None);
    assert_eq!(result.entities[0].unit, None);

    match result.stage_results.get("validation") {
        Some(StageReport::Validation {
            quantities_rejected,
            ..
        }) => assert_eq!(*quantities_rejected, 1),
        other => panic!("missing validation report: {:?}", other),
    }
}

#[tokio::test]
async fn test_low_confidence_entity_filtered() {
    let recognizer = Arc::new(FixedRecognizer {
        spans: vec![RawSpan::new(
            "mystery goo",
            0,
            11,
            SpanLabel::Ingredient,
            0.16,
        )],
    });
    let result = with_recognizer(recognizer).analyze("mystery goo", None).await;

    // (0.5 * 0.16) / 0.8 = 0.1, below the 0.3 floor
    assert!(result.error.is_none());
    assert!(result.entities.is_empty());
    assert_eq!(result.confidence, 0.0);

    match result.stage_results.get("validation") {
        Some(StageReport::Validation {
            dropped_below_floor,
            ..
        }) => assert_eq!(*dropped_below_floor, 1),
        other => panic!("missing validation report: {:?}", other),
    }
}

#[tokio::test]
async fn test_unresolved_entity_surfaced_with_zero_match() {
    let recognizer = Arc::new(FixedRecognizer {
        spans: vec![RawSpan::new(
            "dragonfruit",
            0,
            11,
            SpanLabel::Ingredient,
            0.9,
        )],
    });
    let result = with_recognizer(recognizer).analyze("dragonfruit", None).await;

    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].text, "dragonfruit");
    assert_eq!(result.entities[0].catalog_id, None);
    // (0.5 * 0.9 + 0.3 * 0.0) / 0.8
    assert!((result.entities[0].confidence - 0.5625).abs() < 1e-9);

    match result.stage_results.get("canonicalization") {
        Some(StageReport::Canonicalization { unresolved, .. }) => assert_eq!(*unresolved, 1),
        other => panic!("missing canonicalization report: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_input_is_an_error_result() {
    let result = pipeline().analyze("   \n", None).await;

    assert!(result.error.is_some());
    assert_eq!(
        result.error.as_deref(),
        Some("invalid input: text is empty")
    );
    assert!(result.entities.is_empty());
    assert_eq!(result.confidence, 0.0);
    assert!(result.stage_results.is_empty());
}

#[tokio::test]
async fn test_empty_text_with_dish_runs_inference_only() {
    let result = pipeline().analyze("", Some("caesar salad")).await;

    assert!(result.error.is_none());
    assert_eq!(result.entities.len(), 4);
    assert!(result
        .entities
        .iter()
        .all(|e| e.source == IngredientSource::Inferred));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let result = pipeline()
        .analyze_cancellable("2 cups flour", None, token)
        .await;

    assert_eq!(result.error.as_deref(), Some("run cancelled"));
    assert!(result.entities.is_empty());
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn test_recognizer_failure_degrades_and_inference_covers() {
    let catalog = Arc::new(IngredientCatalog::builtin());
    let knowledge = Arc::new(DishKnowledge::builtin());
    let p = IngredientPipeline::with_stages(
        PipelineConfig::default(),
        catalog,
        Arc::new(FailingRecognizer),
        Arc::new(sous_ii::stages::inference::RecipeInference::new(knowledge)),
    )
    .expect("default config is valid");

    let result = p
        .analyze("2 cups romaine lettuce", Some("caesar salad"))
        .await;

    assert!(result.error.is_none(), "recognition failure must not be fatal");
    match result.stage_results.get("recognition") {
        Some(StageReport::Recognition {
            degraded,
            spans_found,
            detail,
            ..
        }) => {
            assert!(degraded);
            assert_eq!(*spans_found, 0);
            assert!(detail.as_deref().unwrap_or("").contains("offline"));
        }
        other => panic!("missing recognition report: {:?}", other),
    }
    // With no direct entities, inference carries the run
    assert_eq!(result.entities.len(), 4);
    assert!(result
        .entities
        .iter()
        .all(|e| e.source == IngredientSource::Inferred));
}

#[tokio::test]
async fn test_inference_failure_skips_silently() {
    let catalog = Arc::new(IngredientCatalog::builtin());
    let p = IngredientPipeline::with_stages(
        PipelineConfig::default(),
        catalog.clone(),
        Arc::new(LexiconRecognizer::new(catalog)),
        Arc::new(FailingInference),
    )
    .expect("default config is valid");

    let result = p.analyze("fresh basil", Some("caesar salad")).await;

    assert!(result.error.is_none(), "inference failure must not be fatal");
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].source, IngredientSource::Extracted);

    match result.stage_results.get("dish_inference") {
        Some(StageReport::DishInference {
            engaged,
            proposed,
            skipped,
            ..
        }) => {
            assert!(engaged);
            assert_eq!(*proposed, 0);
            assert!(skipped.is_some());
        }
        other => panic!("missing dish inference report: {:?}", other),
    }
}

#[tokio::test]
async fn test_repeated_analysis_is_deterministic() {
    let p = pipeline();
    let first = p.analyze("2 cups flour and 3 eggs", None).await;
    let second = p.analyze("2 cups flour and 3 eggs", None).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.entities, second.entities);
    assert_eq!(first.confidence, second.confidence);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let p = Arc::new(pipeline());
    let (a, b) = tokio::join!(
        p.analyze("2 cups flour", None),
        p.analyze("3 eggs", None)
    );

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.entities.len(), 1);
    assert_eq!(a.entities[0].text, "flour");
    assert_eq!(a.entities[0].quantity, Some(2.0));
    assert_eq!(b.entities.len(), 1);
    assert_eq!(b.entities[0].text, "eggs");
    assert_eq!(b.entities[0].quantity, Some(3.0));
}

#[tokio::test]
async fn test_events_emitted_in_order() {
    let bus = EventBus::new(100);
    let mut rx = bus.subscribe();
    let p = IngredientPipeline::new(PipelineConfig::default())
        .expect("default config is valid")
        .with_events(bus);

    let result = p.analyze("2 cups flour", None).await;
    assert!(result.error.is_none());

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id(), result.run_id);
        types.push(event.event_type().to_string());
    }

    assert_eq!(types.first().map(String::as_str), Some("RunStarted"));
    assert_eq!(types.last().map(String::as_str), Some("RunCompleted"));
    // recognition, quantity parsing, canonicalization, validation
    assert_eq!(types.iter().filter(|t| *t == "StageStarted").count(), 4);
    assert_eq!(types.iter().filter(|t| *t == "StageCompleted").count(), 4);
}

#[tokio::test]
async fn test_stage_reports_present_for_successful_run() {
    let result = pipeline().analyze("2 cups flour", None).await;

    assert!(result.error.is_none());
    for stage in [
        "recognition",
        "quantity_parsing",
        "canonicalization",
        "validation",
    ] {
        assert!(
            result.stage_results.contains_key(stage),
            "missing stage report: {}",
            stage
        );
    }
    // No dish description, so no inference report
    assert!(!result.stage_results.contains_key("dish_inference"));
    assert!(result.processing_time >= 0.0);
}
