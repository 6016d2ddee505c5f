//! sous-ii library interface
//!
//! Exposes the ingredient pipeline, its stages, and supporting types for
//! embedding and integration testing.

pub mod catalog;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use crate::catalog::IngredientCatalog;
pub use crate::config::PipelineConfig;
pub use crate::error::{PipelineError, StageError};
pub use crate::knowledge::DishKnowledge;
pub use crate::pipeline::IngredientPipeline;
pub use crate::types::{Ingredient, IngredientSource, ProcessingResult, StageReport};
