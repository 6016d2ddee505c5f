//! Dish knowledge source for ingredient inference
//!
//! Maps dish descriptions to their typical component ingredients. Matching
//! is phrase based: a dish entry applies when any of its trigger phrases
//! appears in the normalized description. Protein words mentioned in the
//! description are proposed as well, since "chicken caesar salad" implies
//! chicken even though no knowledge entry lists it, and named sauce and
//! dressing styles propose their sauce ("chicken alfredo" implies alfredo
//! sauce).

use crate::error::PipelineError;
use crate::types::{CatalogId, InferredIngredient};
use serde::Deserialize;
use sous_common::text::normalize;
use std::path::Path;

/// Plausibility assigned to protein words found in the description
const PROTEIN_MARKER_PLAUSIBILITY: f64 = 0.88;

/// Descriptions with at most this many words get a specificity boost
const SPECIFIC_DISH_WORD_LIMIT: usize = 3;

/// Multiplier applied to plausibility for short, specific descriptions
const SPECIFIC_DISH_BOOST: f64 = 1.1;

/// Multiplier applied when the description hedges with "special"
const HEDGED_DISH_PENALTY: f64 = 0.8;

/// Plausibility of a sauce or dressing named by its style word
const NAMED_SAUCE_PLAUSIBILITY: f64 = 0.85;

/// One typical component of a dish
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DishComponent {
    /// Catalog entry this component refers to
    pub catalog_id: CatalogId,
    /// Canonical ingredient name
    pub name: String,
    /// Plausibility the dish contains this component (0.0-1.0)
    pub plausibility: f64,
    /// Typical quantity in `unit`, when the knowledge source has one
    #[serde(default)]
    pub typical_quantity: Option<f64>,
    /// Unit for the typical quantity
    #[serde(default)]
    pub unit: Option<String>,
}

/// One dish with its trigger phrases and components
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DishEntry {
    /// Dish display name
    pub dish: String,
    /// Alternate phrases that trigger this entry; defaults to the dish name
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Typical components
    pub components: Vec<DishComponent>,
}

/// Dish-to-ingredients knowledge source
#[derive(Debug, Clone)]
pub struct DishKnowledge {
    entries: Vec<DishEntry>,
    protein_markers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    #[serde(default = "default_protein_markers")]
    protein_markers: Vec<String>,
    #[serde(default)]
    dish: Vec<DishEntry>,
}

fn default_protein_markers() -> Vec<String> {
    ["chicken", "beef", "pork", "salmon", "shrimp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Whether `phrase` appears word-aligned in already-normalized text
fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", normalized);
    padded.contains(&format!(" {} ", phrase))
}

impl DishKnowledge {
    /// Build a knowledge source from entries
    pub fn new(entries: Vec<DishEntry>, protein_markers: Vec<String>) -> Self {
        Self {
            entries,
            protein_markers,
        }
    }

    /// Parse knowledge from a TOML string with `[[dish]]` tables
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` on parse failure or entries
    /// without components.
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let file: KnowledgeFile = toml::from_str(raw)
            .map_err(|e| PipelineError::Configuration(format!("invalid dish knowledge: {}", e)))?;
        for entry in &file.dish {
            if entry.components.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "dish '{}' has no components",
                    entry.dish
                )));
            }
        }
        Ok(Self::new(file.dish, file.protein_markers))
    }

    /// Load knowledge from a TOML file
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` when the file cannot be read
    /// or parsed.
    pub fn from_toml_path(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Number of dish entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the knowledge source has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Infer likely ingredients from a dish description
    ///
    /// Components of every matching dish entry are proposed, then protein
    /// words found in the description. Duplicate catalog ids keep the
    /// higher plausibility. Plausibility is adjusted for how specific the
    /// description is: short descriptions name a concrete dish and get a
    /// boost, hedged ones ("chef's special ...") are discounted.
    pub fn infer(&self, description: &str) -> Vec<InferredIngredient> {
        let normalized = normalize(description);
        if normalized.is_empty() {
            return Vec::new();
        }
        let words: Vec<&str> = normalized.split(' ').collect();

        let mut inferred: Vec<InferredIngredient> = Vec::new();

        for entry in &self.entries {
            if !self.entry_matches(entry, &normalized) {
                continue;
            }
            for component in &entry.components {
                push_deduped(
                    &mut inferred,
                    InferredIngredient {
                        name: component.name.clone(),
                        catalog_id: Some(component.catalog_id.clone()),
                        plausibility: component.plausibility,
                        quantity: component.typical_quantity,
                        unit: component.unit.clone(),
                    },
                );
            }
        }

        for marker in &self.protein_markers {
            if !words.iter().any(|w| w == marker) {
                continue;
            }
            push_deduped(
                &mut inferred,
                InferredIngredient {
                    name: marker.clone(),
                    catalog_id: Some(CatalogId::new(marker.clone())),
                    plausibility: PROTEIN_MARKER_PLAUSIBILITY,
                    quantity: None,
                    unit: None,
                },
            );
        }

        let specific = words.len() <= SPECIFIC_DISH_WORD_LIMIT;
        let hedged = words.iter().any(|w| *w == "special");
        for item in &mut inferred {
            let mut plausibility = item.plausibility;
            if specific {
                plausibility = (plausibility * SPECIFIC_DISH_BOOST).min(1.0);
            }
            if hedged {
                plausibility *= HEDGED_DISH_PENALTY;
            }
            item.plausibility = plausibility.clamp(0.0, 1.0);
        }

        inferred
    }

    fn entry_matches(&self, entry: &DishEntry, normalized: &str) -> bool {
        if entry.triggers.is_empty() {
            return contains_phrase(normalized, &normalize(&entry.dish));
        }
        entry
            .triggers
            .iter()
            .any(|trigger| contains_phrase(normalized, &normalize(trigger)))
    }

    /// Built-in knowledge for common dishes
    pub fn builtin() -> Self {
        Self::new(builtin_entries(), default_protein_markers())
    }
}

/// Append unless the catalog id is already present; keep higher plausibility
fn push_deduped(inferred: &mut Vec<InferredIngredient>, candidate: InferredIngredient) {
    if let Some(existing) = inferred
        .iter_mut()
        .find(|item| item.catalog_id == candidate.catalog_id)
    {
        if candidate.plausibility > existing.plausibility {
            *existing = candidate;
        }
        return;
    }
    inferred.push(candidate);
}

fn component(
    catalog_id: &str,
    name: &str,
    plausibility: f64,
    typical: Option<(f64, &str)>,
) -> DishComponent {
    DishComponent {
        catalog_id: CatalogId::new(catalog_id),
        name: name.to_string(),
        plausibility,
        typical_quantity: typical.map(|(q, _)| q),
        unit: typical.map(|(_, u)| u.to_string()),
    }
}

fn sauce_entry(
    trigger: &str,
    catalog_id: &str,
    name: &str,
    typical: Option<(f64, &str)>,
) -> DishEntry {
    DishEntry {
        dish: name.to_string(),
        triggers: vec![trigger.to_string()],
        components: vec![component(catalog_id, name, NAMED_SAUCE_PLAUSIBILITY, typical)],
    }
}

fn builtin_entries() -> Vec<DishEntry> {
    vec![
        DishEntry {
            dish: "caesar salad".to_string(),
            triggers: vec!["caesar salad".to_string()],
            components: vec![
                component("romaine-lettuce", "romaine lettuce", 0.95, Some((2.0, "cup"))),
                component("parmesan-cheese", "parmesan cheese", 0.90, Some((2.0, "tablespoon"))),
                component("croutons", "croutons", 0.85, Some((0.5, "cup"))),
                component("caesar-dressing", "caesar dressing", 0.95, Some((2.0, "tablespoon"))),
            ],
        },
        DishEntry {
            dish: "pizza".to_string(),
            triggers: vec!["pizza".to_string()],
            components: vec![
                component("pizza-dough", "pizza dough", 0.90, Some((1.0, "piece"))),
                component("tomato-sauce", "tomato sauce", 0.85, Some((0.5, "cup"))),
                component("mozzarella-cheese", "mozzarella cheese", 0.80, Some((1.0, "cup"))),
            ],
        },
        DishEntry {
            dish: "carbonara".to_string(),
            triggers: vec!["carbonara".to_string()],
            components: vec![
                component("pasta", "pasta", 0.95, None),
                component("egg", "egg", 0.90, Some((3.0, "piece"))),
                component("parmesan-cheese", "parmesan cheese", 0.88, None),
                component("black-pepper", "black pepper", 0.80, None),
            ],
        },
        DishEntry {
            dish: "omelette".to_string(),
            triggers: vec!["omelette".to_string(), "omelet".to_string()],
            components: vec![
                component("egg", "egg", 0.95, Some((3.0, "piece"))),
                component("butter", "butter", 0.80, Some((1.0, "tablespoon"))),
                component("milk", "milk", 0.70, None),
            ],
        },
        // Named sauces and dressings implied directly by the description
        sauce_entry("alfredo", "alfredo-sauce", "alfredo sauce", Some((0.5, "cup"))),
        sauce_entry("marinara", "tomato-sauce", "tomato sauce", Some((0.5, "cup"))),
        sauce_entry("pesto", "pesto", "pesto", Some((0.25, "cup"))),
        sauce_entry("bbq", "bbq-sauce", "bbq sauce", Some((2.0, "tablespoon"))),
        sauce_entry("hot", "hot-sauce", "hot sauce", Some((1.0, "teaspoon"))),
        sauce_entry("soy", "soy-sauce", "soy sauce", Some((1.0, "tablespoon"))),
        sauce_entry("caesar", "caesar-dressing", "caesar dressing", Some((2.0, "tablespoon"))),
        sauce_entry("ranch", "ranch-dressing", "ranch dressing", Some((2.0, "tablespoon"))),
        sauce_entry(
            "thousand island",
            "thousand-island-dressing",
            "thousand island dressing",
            Some((2.0, "tablespoon")),
        ),
    ]
}
