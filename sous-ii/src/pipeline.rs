//! Pipeline orchestrator
//!
//! Drives one analysis run through its stages:
//! - Phase 1: entity recognition and quantity scanning, concurrently
//! - Phase 2: quantity association
//! - Phase 3: canonicalization and (when engaged) dish inference, concurrently
//! - Phase 4: validation
//!
//! # Error Handling
//! - Recognition, quantity parsing, and dish inference degrade: on failure
//!   or timeout the run continues with empty output from that stage
//! - Canonicalization and validation are fatal: their loss would corrupt
//!   the result rather than thin it
//! - Fatal errors surface as a `ProcessingResult` with `error` set, never
//!   as a panic
//!
//! # Example
//! ```rust,ignore
//! let pipeline = IngredientPipeline::new(PipelineConfig::default())?;
//! let result = pipeline.analyze("2 cups romaine lettuce", None).await;
//! ```

use crate::catalog::IngredientCatalog;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageError};
use crate::knowledge::DishKnowledge;
use crate::stages::canonicalizer::canonicalize_spans;
use crate::stages::inference::RecipeInference;
use crate::stages::quantity;
use crate::stages::recognizer::LexiconRecognizer;
use crate::stages::validator::validate_entities;
use crate::types::{
    stage_names, CatalogId, DishInference, EntityRecognizer, Ingredient, InferredIngredient,
    PipelineRun, ProcessingResult, RunState, StageReport,
};
use sous_common::events::{EventBus, PipelineEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ingredient extraction pipeline
///
/// Cheap to share behind an `Arc`; `analyze` takes `&self` and concurrent
/// runs do not affect each other.
pub struct IngredientPipeline {
    config: PipelineConfig,
    catalog: Arc<IngredientCatalog>,
    recognizer: Arc<dyn EntityRecognizer>,
    inference: Arc<dyn DishInference>,
    events: Option<EventBus>,
}

impl IngredientPipeline {
    /// Create a pipeline with the built-in catalog and dish knowledge
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` when the configuration is
    /// invalid.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_sources(
            config,
            Arc::new(IngredientCatalog::builtin()),
            Arc::new(DishKnowledge::builtin()),
        )
    }

    /// Create a pipeline over specific catalog and knowledge sources
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` when the configuration is
    /// invalid.
    pub fn with_sources(
        config: PipelineConfig,
        catalog: Arc<IngredientCatalog>,
        knowledge: Arc<DishKnowledge>,
    ) -> Result<Self, PipelineError> {
        let recognizer = Arc::new(LexiconRecognizer::new(Arc::clone(&catalog)));
        let inference = Arc::new(RecipeInference::new(knowledge));
        Self::with_stages(config, catalog, recognizer, inference)
    }

    /// Create a pipeline with substituted recognition and inference backends
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` when the configuration is
    /// invalid.
    pub fn with_stages(
        config: PipelineConfig,
        catalog: Arc<IngredientCatalog>,
        recognizer: Arc<dyn EntityRecognizer>,
        inference: Arc<dyn DishInference>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            recognizer,
            inference,
            events: None,
        })
    }

    /// Attach an event bus for run and stage progress events
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze text, optionally with a dish description
    pub async fn analyze(&self, text: &str, dish_description: Option<&str>) -> ProcessingResult {
        self.analyze_cancellable(text, dish_description, CancellationToken::new())
            .await
    }

    /// Analyze text with caller-controlled cancellation
    ///
    /// Cancelling the token makes the run fail with a cancellation error at
    /// the next stage boundary; in-flight stage futures are dropped.
    pub async fn analyze_cancellable(
        &self,
        text: &str,
        dish_description: Option<&str>,
        cancel: CancellationToken,
    ) -> ProcessingResult {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut run = PipelineRun::new(run_id);
        let mut stage_results: HashMap<String, StageReport> = HashMap::new();

        info!(
            run_id = %run_id,
            text_len = text.len(),
            has_dish = dish_description.is_some(),
            "starting ingredient analysis"
        );
        self.emit(PipelineEvent::RunStarted {
            run_id,
            text_len: text.len(),
            has_dish_description: dish_description.is_some(),
            timestamp: chrono::Utc::now(),
        });

        let outcome = self
            .run_stages(
                run_id,
                text,
                dish_description,
                &cancel,
                &mut run,
                &mut stage_results,
            )
            .await;

        let processing_time = started.elapsed().as_secs_f64();
        match outcome {
            Ok(entities) => {
                run.transition_to(RunState::Completed);
                let confidence = mean_confidence(&entities);
                info!(
                    run_id = %run_id,
                    entities = entities.len(),
                    confidence,
                    "analysis complete"
                );
                self.emit(PipelineEvent::RunCompleted {
                    run_id,
                    entity_count: entities.len(),
                    confidence,
                    processing_time,
                    timestamp: chrono::Utc::now(),
                });
                ProcessingResult {
                    run_id,
                    entities,
                    confidence,
                    processing_time,
                    stage_results,
                    error: None,
                }
            }
            Err(err) => {
                run.transition_to(RunState::Failed);
                let message = err.to_string();
                warn!(run_id = %run_id, error = %message, "analysis failed");
                match err {
                    PipelineError::Cancelled => self.emit(PipelineEvent::RunCancelled {
                        run_id,
                        timestamp: chrono::Utc::now(),
                    }),
                    _ => self.emit(PipelineEvent::RunFailed {
                        run_id,
                        error: message.clone(),
                        timestamp: chrono::Utc::now(),
                    }),
                }
                ProcessingResult {
                    run_id,
                    entities: Vec::new(),
                    confidence: 0.0,
                    processing_time,
                    stage_results,
                    error: Some(message),
                }
            }
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        text: &str,
        dish_description: Option<&str>,
        cancel: &CancellationToken,
        run: &mut PipelineRun,
        stage_results: &mut HashMap<String, StageReport>,
    ) -> Result<Vec<Ingredient>, PipelineError> {
        let dish = dish_description.map(str::trim).filter(|d| !d.is_empty());
        if text.trim().is_empty() && dish.is_none() {
            return Err(PipelineError::Input("text is empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Phase 1: recognition and quantity scanning run concurrently on
        // the raw text
        run.transition_to(RunState::Recognizing);
        self.emit_stage_started(run_id, stage_names::RECOGNITION);
        self.emit_stage_started(run_id, stage_names::QUANTITY_PARSING);

        let recognize_fut = async {
            let stage_started = Instant::now();
            let outcome = timeout(
                Duration::from_millis(self.config.timeouts.recognition_ms),
                self.recognizer.recognize(text),
            )
            .await;
            (stage_started.elapsed(), outcome)
        };
        let scan_fut = async {
            let stage_started = Instant::now();
            let outcome = timeout(
                Duration::from_millis(self.config.timeouts.quantity_ms),
                async { quantity::scan(text) },
            )
            .await;
            (stage_started.elapsed(), outcome)
        };

        let ((recognize_elapsed, recognize_outcome), (scan_elapsed, scan_outcome)) = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = async { tokio::join!(recognize_fut, scan_fut) } => joined,
        };

        let (mut spans, recognition_degraded, recognition_detail) = match recognize_outcome {
            Ok(Ok(spans)) => (spans, false, None),
            Ok(Err(err)) => {
                warn!(run_id = %run_id, error = %err, "recognition failed, continuing without spans");
                (Vec::new(), true, Some(err.to_string()))
            }
            Err(_) => {
                let err = StageError::Timeout {
                    ms: self.config.timeouts.recognition_ms,
                };
                warn!(run_id = %run_id, "recognition timed out, continuing without spans");
                (Vec::new(), true, Some(err.to_string()))
            }
        };

        // Substituted recognizers may return spans outside the text
        let before = spans.len();
        spans.retain(|span| span.start < span.end && span.end <= text.len());
        if spans.len() < before {
            warn!(
                run_id = %run_id,
                removed = before - spans.len(),
                "discarded spans with offsets outside the text"
            );
        }

        let mean_raw = if spans.is_empty() {
            0.0
        } else {
            spans.iter().map(|s| s.raw_confidence).sum::<f64>() / spans.len() as f64
        };
        let recognition_elapsed_ms = recognize_elapsed.as_millis() as u64;
        stage_results.insert(
            stage_names::RECOGNITION.to_string(),
            StageReport::Recognition {
                elapsed_ms: recognition_elapsed_ms,
                spans_found: spans.len(),
                mean_raw_confidence: mean_raw,
                degraded: recognition_degraded,
                detail: recognition_detail,
            },
        );
        self.emit_stage_completed(
            run_id,
            stage_names::RECOGNITION,
            recognition_elapsed_ms,
            recognition_degraded,
        );

        let (matches, quantity_degraded, quantity_detail) = match scan_outcome {
            Ok(matches) => (matches, false, None),
            Err(_) => {
                let err = StageError::Timeout {
                    ms: self.config.timeouts.quantity_ms,
                };
                warn!(run_id = %run_id, "quantity scan timed out, continuing without quantities");
                (Vec::new(), true, Some(err.to_string()))
            }
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Phase 2: attach scanned quantities to the recognized spans
        run.transition_to(RunState::Parsing);
        let associate_started = Instant::now();
        let span_ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        let (annotations, dropped_unattached) = quantity::associate(text, &span_ranges, &matches);
        let range_count = matches.iter().filter(|m| m.is_range).count();

        let quantity_elapsed_ms = (scan_elapsed + associate_started.elapsed()).as_millis() as u64;
        stage_results.insert(
            stage_names::QUANTITY_PARSING.to_string(),
            StageReport::QuantityParsing {
                elapsed_ms: quantity_elapsed_ms,
                matches_found: matches.len(),
                attached: annotations.len(),
                dropped_unattached,
                range_count,
                degraded: quantity_degraded,
                detail: quantity_detail,
            },
        );
        self.emit_stage_completed(
            run_id,
            stage_names::QUANTITY_PARSING,
            quantity_elapsed_ms,
            quantity_degraded,
        );

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Inference engages only when direct extraction was sparse
        let high_confidence = spans
            .iter()
            .filter(|s| s.raw_confidence >= self.config.high_confidence_threshold)
            .count();
        let inference_engaged =
            dish.is_some() && high_confidence < self.config.min_direct_entities_for_dish_skip;

        // Phase 3: canonicalization, with dish inference alongside when engaged
        run.transition_to(RunState::Canonicalizing);
        self.emit_stage_started(run_id, stage_names::CANONICALIZATION);
        if inference_engaged {
            self.emit_stage_started(run_id, stage_names::DISH_INFERENCE);
        }

        let canonicalize_fut = async {
            let stage_started = Instant::now();
            let outcome = timeout(
                Duration::from_millis(self.config.timeouts.canonicalization_ms),
                async { canonicalize_spans(&self.catalog, &spans) },
            )
            .await;
            (stage_started.elapsed(), outcome)
        };
        let infer_fut = async {
            let stage_started = Instant::now();
            let outcome = match dish {
                Some(d) if inference_engaged => Some(
                    timeout(
                        Duration::from_millis(self.config.timeouts.inference_ms),
                        self.inference.infer_from_dish(d),
                    )
                    .await,
                ),
                _ => None,
            };
            (stage_started.elapsed(), outcome)
        };

        let ((canonicalize_elapsed, canonicalize_outcome), (infer_elapsed, infer_outcome)) = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = async { tokio::join!(canonicalize_fut, infer_fut) } => joined,
        };

        let canonicalization = match canonicalize_outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(PipelineError::Stage {
                    stage: stage_names::CANONICALIZATION,
                    source: StageError::Timeout {
                        ms: self.config.timeouts.canonicalization_ms,
                    },
                });
            }
        };
        let canonicalization_elapsed_ms = canonicalize_elapsed.as_millis() as u64;
        stage_results.insert(
            stage_names::CANONICALIZATION.to_string(),
            StageReport::Canonicalization {
                elapsed_ms: canonicalization_elapsed_ms,
                exact: canonicalization.exact,
                synonym: canonicalization.synonym,
                fuzzy: canonicalization.fuzzy,
                unresolved: canonicalization.unresolved,
            },
        );
        self.emit_stage_completed(
            run_id,
            stage_names::CANONICALIZATION,
            canonicalization_elapsed_ms,
            false,
        );

        let mut inferred: Vec<InferredIngredient> = Vec::new();
        let mut proposed = 0usize;
        let mut deduplicated = 0usize;
        let mut skipped: Option<String> = None;

        if inference_engaged {
            run.transition_to(RunState::InferringDish);
            if let Some(outcome) = infer_outcome {
                match outcome {
                    Ok(Ok(items)) => {
                        proposed = items.len();
                        // Proposals already extracted from the text add no
                        // information and are dropped
                        let direct_ids: HashSet<&CatalogId> = canonicalization
                            .matches
                            .iter()
                            .filter_map(|m| m.catalog_id.as_ref())
                            .collect();
                        for item in items {
                            let duplicate = item
                                .catalog_id
                                .as_ref()
                                .is_some_and(|id| direct_ids.contains(id));
                            if duplicate {
                                deduplicated += 1;
                            } else {
                                inferred.push(item);
                            }
                        }
                        debug!(
                            run_id = %run_id,
                            proposed,
                            deduplicated,
                            "dish inference proposed ingredients"
                        );
                    }
                    Ok(Err(err)) => {
                        warn!(run_id = %run_id, error = %err, "dish inference unavailable, skipping");
                        skipped = Some(err.to_string());
                    }
                    Err(_) => {
                        let err = StageError::Timeout {
                            ms: self.config.timeouts.inference_ms,
                        };
                        warn!(run_id = %run_id, "dish inference timed out, skipping");
                        skipped = Some(err.to_string());
                    }
                }
            }
        } else if dish.is_some() {
            debug!(
                run_id = %run_id,
                high_confidence,
                "skipping dish inference, direct extraction sufficient"
            );
            skipped = Some(format!(
                "{} high-confidence entities already extracted",
                high_confidence
            ));
        }

        if dish.is_some() {
            let inference_elapsed_ms = if inference_engaged {
                infer_elapsed.as_millis() as u64
            } else {
                0
            };
            stage_results.insert(
                stage_names::DISH_INFERENCE.to_string(),
                StageReport::DishInference {
                    elapsed_ms: inference_elapsed_ms,
                    engaged: inference_engaged,
                    proposed,
                    deduplicated,
                    skipped: skipped.clone(),
                },
            );
            if inference_engaged {
                self.emit_stage_completed(
                    run_id,
                    stage_names::DISH_INFERENCE,
                    inference_elapsed_ms,
                    skipped.is_some(),
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Phase 4: validation produces the final entity list
        run.transition_to(RunState::Validating);
        self.emit_stage_started(run_id, stage_names::VALIDATION);
        let validate_fut = async {
            let stage_started = Instant::now();
            let outcome = timeout(
                Duration::from_millis(self.config.timeouts.validation_ms),
                async {
                    validate_entities(
                        &self.config,
                        &self.catalog,
                        &spans,
                        &canonicalization.matches,
                        &annotations,
                        &inferred,
                    )
                },
            )
            .await;
            (stage_started.elapsed(), outcome)
        };
        let (validate_elapsed, validate_outcome) = validate_fut.await;
        let validated = match validate_outcome {
            Ok(validated) => validated,
            Err(_) => {
                return Err(PipelineError::Stage {
                    stage: stage_names::VALIDATION,
                    source: StageError::Timeout {
                        ms: self.config.timeouts.validation_ms,
                    },
                });
            }
        };

        let validation_elapsed_ms = validate_elapsed.as_millis() as u64;
        stage_results.insert(
            stage_names::VALIDATION.to_string(),
            StageReport::Validation {
                elapsed_ms: validation_elapsed_ms,
                merged_duplicates: validated.merged_duplicates,
                quantities_rejected: validated.quantities_rejected,
                dropped_below_floor: validated.dropped_below_floor,
                survivors: validated.entities.len(),
            },
        );
        self.emit_stage_completed(run_id, stage_names::VALIDATION, validation_elapsed_ms, false);

        Ok(validated.entities)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }

    fn emit_stage_started(&self, run_id: Uuid, stage: &str) {
        self.emit(PipelineEvent::StageStarted {
            run_id,
            stage: stage.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_stage_completed(&self, run_id: Uuid, stage: &str, elapsed_ms: u64, degraded: bool) {
        self.emit(PipelineEvent::StageCompleted {
            run_id,
            stage: stage.to_string(),
            elapsed_ms,
            degraded,
            timestamp: chrono::Utc::now(),
        });
    }
}

fn mean_confidence(entities: &[Ingredient]) -> f64 {
    if entities.is_empty() {
        0.0
    } else {
        entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64
    }
}
