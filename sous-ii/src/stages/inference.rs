//! Dish inference stage
//!
//! Adapts the [`DishKnowledge`] source to the [`DishInference`] trait the
//! orchestrator works against. The built-in source is in-memory and never
//! unavailable; substituted backends surface `StageError::Unavailable`
//! and the orchestrator skips inference for that run.

use crate::error::StageError;
use crate::knowledge::DishKnowledge;
use crate::types::{DishInference, InferredIngredient};
use std::sync::Arc;

/// Inference backed by the dish knowledge source
pub struct RecipeInference {
    knowledge: Arc<DishKnowledge>,
}

impl RecipeInference {
    /// Build inference over a knowledge source
    pub fn new(knowledge: Arc<DishKnowledge>) -> Self {
        Self { knowledge }
    }
}

#[async_trait::async_trait]
impl DishInference for RecipeInference {
    fn name(&self) -> &'static str {
        "recipe_knowledge"
    }

    async fn infer_from_dish(
        &self,
        description: &str,
    ) -> Result<Vec<InferredIngredient>, StageError> {
        Ok(self.knowledge.infer(description))
    }
}
