//! Core types and trait definitions for the ingredient pipeline
//!
//! Defines the data model flowing between the stages:
//! - Recognition produces [`RawSpan`]s
//! - Quantity parsing attaches [`QuantityAnnotation`]s to spans
//! - Canonicalization produces one [`CanonicalMatch`] per span
//! - Dish inference proposes [`InferredIngredient`]s
//! - Validation emits the final [`Ingredient`] entities
//!
//! Also defines the run state machine ([`RunState`]) and the capability
//! traits ([`EntityRecognizer`], [`DishInference`]) behind which the
//! recognition and inference backends sit, so tests and deployments can
//! substitute their own.

use crate::error::StageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable catalog identifier (kebab-case slug, e.g. "romaine-lettuce")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    /// Create catalog id from a slug
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Slug as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Stage data model
// ============================================================================

/// Entity label attached to recognized spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanLabel {
    /// Food ingredient mention
    Ingredient,
}

/// A candidate ingredient mention located in the input text
///
/// Offsets are byte offsets into the analyzed text and always satisfy
/// `start < end <= text.len()`. Overlapping spans are permitted; downstream
/// stages resolve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    /// Matched text, verbatim from the input
    pub text: String,
    /// Byte offset of the span start
    pub start: usize,
    /// Byte offset one past the span end
    pub end: usize,
    /// Entity label
    pub label: SpanLabel,
    /// Recognizer confidence (0.0-1.0)
    pub raw_confidence: f64,
}

impl RawSpan {
    /// Create a span with confidence clamped to 0.0-1.0
    pub fn new(
        text: impl Into<String>,
        start: usize,
        end: usize,
        label: SpanLabel,
        raw_confidence: f64,
    ) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            label,
            raw_confidence: raw_confidence.clamp(0.0, 1.0),
        }
    }
}

/// Quantity and unit attached to a recognized span
///
/// `span_start`/`span_end` reference the annotated span by its offsets, not
/// by ownership, so annotations serialize independently of spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityAnnotation {
    /// Numeric value (ranges are normalized to their midpoint)
    pub value: Option<f64>,
    /// Canonical unit token ("cup", "gram", ...), absent for bare counts
    pub unit: Option<String>,
    /// Whether the value came from a range expression ("2-3")
    pub is_range: bool,
    /// Start offset of the annotated span
    pub span_start: usize,
    /// End offset of the annotated span
    pub span_end: usize,
}

/// How a span text was resolved against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Case-insensitive canonical name match
    Exact,
    /// Synonym table match (including inverted "tail, head" forms)
    Synonym,
    /// Fuzzy similarity above threshold
    Fuzzy,
    /// No catalog entry found; not a rejection
    Unresolved,
}

/// Canonicalization outcome for one span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMatch {
    /// Resolved catalog entry, absent when unresolved
    pub catalog_id: Option<CatalogId>,
    /// Canonical display name (input text when unresolved)
    pub canonical_name: String,
    /// Match confidence (0.0-1.0; 0.0 when unresolved)
    pub match_confidence: f64,
    /// Resolution method
    pub match_method: MatchMethod,
}

/// Ingredient proposed by dish inference rather than found in the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredIngredient {
    /// Canonical ingredient name
    pub name: String,
    /// Catalog entry the knowledge source refers to
    pub catalog_id: Option<CatalogId>,
    /// Plausibility that the dish contains this ingredient (0.0-1.0)
    pub plausibility: f64,
    /// Typical quantity from the knowledge source, never synthesized
    pub quantity: Option<f64>,
    /// Unit for the typical quantity
    pub unit: Option<String>,
}

/// Provenance of a final entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngredientSource {
    /// Found directly in the input text
    Extracted,
    /// Proposed by dish inference
    Inferred,
}

/// Final surfaced ingredient entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Surface text (verbatim mention for extracted, canonical name for inferred)
    pub text: String,
    /// Entity label
    pub label: SpanLabel,
    /// Combined confidence (0.0-1.0)
    pub confidence: f64,
    /// Numeric quantity, absent when none was found or it was rejected
    pub quantity: Option<f64>,
    /// Canonical unit token
    pub unit: Option<String>,
    /// Provenance
    pub source: IngredientSource,
    /// Resolved catalog entry
    pub catalog_id: Option<CatalogId>,
}

// ============================================================================
// Stage diagnostics
// ============================================================================

/// Stage name constants for `ProcessingResult::stage_results` keys and events
pub mod stage_names {
    /// Entity recognition stage
    pub const RECOGNITION: &str = "recognition";
    /// Quantity/unit parsing stage
    pub const QUANTITY_PARSING: &str = "quantity_parsing";
    /// Canonicalization stage
    pub const CANONICALIZATION: &str = "canonicalization";
    /// Dish inference stage
    pub const DISH_INFERENCE: &str = "dish_inference";
    /// Validation stage
    pub const VALIDATION: &str = "validation";
}

/// Per-stage diagnostic record, tagged by stage
///
/// Each variant carries the diagnostics of its stage only, so the
/// `stage_results` payload stays structured without forcing every stage into
/// one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
    /// Entity recognition diagnostics
    Recognition {
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Spans produced
        spans_found: usize,
        /// Mean raw confidence over produced spans (0.0 when none)
        mean_raw_confidence: f64,
        /// Whether the stage degraded to empty output after a failure
        degraded: bool,
        /// Failure detail when degraded
        detail: Option<String>,
    },
    /// Quantity/unit parsing diagnostics
    QuantityParsing {
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Quantity expressions found in the text
        matches_found: usize,
        /// Expressions attached to a span
        attached: usize,
        /// Expressions dropped for lack of a span in range
        dropped_unattached: usize,
        /// Expressions that were ranges, normalized to midpoints
        range_count: usize,
        /// Whether the stage degraded to empty output after a failure
        degraded: bool,
        /// Failure detail when degraded
        detail: Option<String>,
    },
    /// Canonicalization diagnostics
    Canonicalization {
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Spans resolved by exact canonical name
        exact: usize,
        /// Spans resolved through the synonym table
        synonym: usize,
        /// Spans resolved by fuzzy similarity
        fuzzy: usize,
        /// Spans left unresolved
        unresolved: usize,
    },
    /// Dish inference diagnostics
    DishInference {
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Whether the stage was engaged at all
        engaged: bool,
        /// Ingredients proposed by the knowledge source
        proposed: usize,
        /// Proposals dropped because the catalog id was already extracted
        deduplicated: usize,
        /// Reason the stage was skipped or degraded, when it was
        skipped: Option<String>,
    },
    /// Validation diagnostics
    Validation {
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Duplicate entities merged away
        merged_duplicates: usize,
        /// Implausible quantities cleared
        quantities_rejected: usize,
        /// Entities dropped below the confidence floor
        dropped_below_floor: usize,
        /// Entities surviving validation
        survivors: usize,
    },
}

impl StageReport {
    /// Stage name this report belongs under in `stage_results`
    pub fn stage_name(&self) -> &'static str {
        match self {
            StageReport::Recognition { .. } => stage_names::RECOGNITION,
            StageReport::QuantityParsing { .. } => stage_names::QUANTITY_PARSING,
            StageReport::Canonicalization { .. } => stage_names::CANONICALIZATION,
            StageReport::DishInference { .. } => stage_names::DISH_INFERENCE,
            StageReport::Validation { .. } => stage_names::VALIDATION,
        }
    }
}

// ============================================================================
// Run result
// ============================================================================

/// Result of one analysis run
///
/// Created per run and immutable after return. Fatal failures produce a
/// result with empty entities, zero confidence, and `error` set; the
/// pipeline never panics or returns a bare error across its public boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Run identifier, correlating with emitted events
    pub run_id: Uuid,
    /// Surviving entities: extracted in appearance order, then inferred
    pub entities: Vec<Ingredient>,
    /// Mean confidence over entities (0.0 when none)
    pub confidence: f64,
    /// Total wall-clock time in seconds
    pub processing_time: f64,
    /// Diagnostics for the stages that ran, keyed by stage name
    pub stage_results: HashMap<String, StageReport>,
    /// Fatal error message, when the run failed
    pub error: Option<String>,
}

impl ProcessingResult {
    /// Whether the run failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Run state machine
// ============================================================================

/// Analysis run state
///
/// Runs progress Pending → Recognizing → Parsing → Canonicalizing →
/// InferringDish (when engaged) → Validating → Completed. Failed is terminal
/// and reachable from any non-terminal state; cancellation also lands there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Run accepted, no stage started
    Pending,
    /// Entity recognition in progress
    Recognizing,
    /// Quantity/unit parsing in progress
    Parsing,
    /// Canonicalization in progress
    Canonicalizing,
    /// Dish inference in progress
    InferringDish,
    /// Validation in progress
    Validating,
    /// Run finished successfully
    Completed,
    /// Run failed or was cancelled
    Failed,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Current run state
    pub state: RunState,

    /// Run start time
    pub started_at: DateTime<Utc>,

    /// Run end time (set on terminal states)
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create new run in Pending state
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Pending,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        // Set end time for terminal states
        match new_state {
            RunState::Completed | RunState::Failed => {
                self.ended_at = Some(Utc::now());
            }
            _ => {}
        }

        transition
    }

    /// Check if run is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::Failed)
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Entity recognition backend
///
/// The built-in [`LexiconRecognizer`](crate::stages::recognizer::LexiconRecognizer)
/// scans the catalog lexicon; deployments and tests may substitute any
/// implementation. Spans returned must lie within the input text.
#[async_trait::async_trait]
pub trait EntityRecognizer: Send + Sync {
    /// Recognizer name for diagnostics
    fn name(&self) -> &'static str;

    /// Recognize ingredient mentions in the text
    ///
    /// # Errors
    /// Returns `StageError` when the backend is unavailable or fails; the
    /// orchestrator degrades the run to an empty span sequence.
    async fn recognize(&self, text: &str) -> Result<Vec<RawSpan>, StageError>;
}

/// Dish inference backend
///
/// Proposes likely ingredients from a dish description when direct
/// extraction was sparse. The built-in
/// [`RecipeInference`](crate::stages::inference::RecipeInference) consults
/// the dish knowledge source.
#[async_trait::async_trait]
pub trait DishInference: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Infer likely ingredients from a dish description
    ///
    /// # Errors
    /// Returns `StageError` when the knowledge source is unavailable; the
    /// orchestrator silently skips inference in that case.
    async fn infer_from_dish(
        &self,
        description: &str,
    ) -> Result<Vec<InferredIngredient>, StageError>;
}

// ============================================================================
// Tests
// ============================================================================
