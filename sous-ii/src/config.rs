//! Pipeline configuration
//!
//! All thresholds and timeouts the orchestrator consults live here, with
//! defaults suitable for interactive use. Configuration loads from TOML and
//! every field is optional; absent fields take their defaults.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights for combining per-stage evidence into one entity confidence
///
/// When a stage contributed no evidence for an entity its weight is
/// excluded and the remaining weights are renormalized, so partial evidence
/// still yields a 0.0-1.0 confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Weight of recognizer confidence
    pub recognition: f64,
    /// Weight of canonical match confidence
    pub canonicalization: f64,
    /// Weight of inference plausibility
    pub inference: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            recognition: 0.5,
            canonicalization: 0.3,
            inference: 0.2,
        }
    }
}

impl ConfidenceWeights {
    /// Combine the evidence present for one entity into a single confidence
    ///
    /// Each argument is `Some` when the corresponding stage produced evidence,
    /// `None` when it did not. Returns 0.0 when no evidence is present.
    pub fn combine(
        &self,
        recognition: Option<f64>,
        canonicalization: Option<f64>,
        inference: Option<f64>,
    ) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;

        if let Some(value) = recognition {
            weighted += self.recognition * value;
            total += self.recognition;
        }
        if let Some(value) = canonicalization {
            weighted += self.canonicalization * value;
            total += self.canonicalization;
        }
        if let Some(value) = inference {
            weighted += self.inference * value;
            total += self.inference;
        }

        if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let weights = [
            ("recognition", self.recognition),
            ("canonicalization", self.canonicalization),
            ("inference", self.inference),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        let sum = self.recognition + self.canonicalization + self.inference;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PipelineError::Configuration(format!(
                "confidence weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Per-stage timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    /// Entity recognition timeout
    pub recognition_ms: u64,
    /// Quantity parsing timeout
    pub quantity_ms: u64,
    /// Canonicalization timeout
    pub canonicalization_ms: u64,
    /// Dish inference timeout
    pub inference_ms: u64,
    /// Validation timeout
    pub validation_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            recognition_ms: 2000,
            quantity_ms: 2000,
            canonicalization_ms: 2000,
            inference_ms: 2000,
            validation_ms: 2000,
        }
    }
}

impl StageTimeouts {
    fn validate(&self) -> Result<(), PipelineError> {
        let timeouts = [
            ("recognition_ms", self.recognition_ms),
            ("quantity_ms", self.quantity_ms),
            ("canonicalization_ms", self.canonicalization_ms),
            ("inference_ms", self.inference_ms),
            ("validation_ms", self.validation_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(PipelineError::Configuration(format!(
                    "timeout '{}' must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Pipeline tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Entities with combined confidence below this are dropped
    pub min_confidence_floor: f64,

    /// Raw confidence at or above which a span counts as high-confidence
    /// when deciding whether dish inference is needed
    pub high_confidence_threshold: f64,

    /// With at least this many high-confidence spans, dish inference is
    /// skipped even when a dish description is present
    pub min_direct_entities_for_dish_skip: usize,

    /// Per-stage timeouts
    pub timeouts: StageTimeouts,

    /// Confidence combination weights
    pub weights: ConfidenceWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence_floor: 0.3,
            high_confidence_threshold: 0.7,
            min_direct_entities_for_dish_skip: 2,
            timeouts: StageTimeouts::default(),
            weights: ConfidenceWeights::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` describing the first invalid
    /// field found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.min_confidence_floor) {
            return Err(PipelineError::Configuration(format!(
                "min_confidence_floor must be within 0.0-1.0, got {}",
                self.min_confidence_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.high_confidence_threshold) {
            return Err(PipelineError::Configuration(format!(
                "high_confidence_threshold must be within 0.0-1.0, got {}",
                self.high_confidence_threshold
            )));
        }
        self.timeouts.validate()?;
        self.weights.validate()?;
        Ok(())
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| PipelineError::Configuration(format!("invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` when the file cannot be read
    /// or fails to parse or validate.
    pub fn from_toml_path(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }
}
