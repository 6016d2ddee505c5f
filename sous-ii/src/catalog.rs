//! Canonical ingredient catalog
//!
//! The catalog is the reference vocabulary the whole pipeline leans on: the
//! recognizer scans for its surface forms, the canonicalizer resolves span
//! text against it, and the validator checks inferred catalog ids against
//! it. Lookup tries exact canonical names first, then the synonym table
//! (including inverted "lettuce, romaine" forms), then fuzzy similarity,
//! and finally reports the text as unresolved rather than rejecting it.

use crate::error::PipelineError;
use crate::types::{CanonicalMatch, CatalogId, MatchMethod};
use serde::{Deserialize, Serialize};
use sous_common::text::{comma_inverted, normalize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Default similarity threshold for fuzzy matching
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Confidence assigned to synonym table matches
const SYNONYM_CONFIDENCE: f64 = 0.95;

/// Broad food category of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Protein,
    Produce,
    Herb,
    Condiment,
    Dairy,
    Grain,
    Pantry,
}

/// One canonical ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable identifier
    pub id: CatalogId,
    /// Canonical display name, lowercase
    pub name: String,
    /// Food category
    pub category: FoodCategory,
    /// Alternate surface forms, lowercase
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Confidence a lexicon hit on this entry deserves (0.0-1.0)
    pub recognition_confidence: f64,
    /// Unit a typical recipe measures this in
    #[serde(default)]
    pub default_unit: Option<String>,
    /// Typical quantity in `default_unit`
    #[serde(default)]
    pub typical_quantity: Option<f64>,
    /// Nutritional reference value
    #[serde(default)]
    pub calories_per_100g: Option<f64>,
}

/// A lexicon surface form with the confidence a hit on it deserves
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceForm {
    /// Lowercase term as it may appear in text
    pub term: String,
    /// Recognition confidence of the owning entry
    pub confidence: f64,
}

/// In-memory ingredient catalog with lookup indexes
#[derive(Debug, Clone)]
pub struct IngredientCatalog {
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, usize>,
    by_synonym: HashMap<String, usize>,
    fuzzy_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    ingredient: Vec<CatalogEntry>,
}

impl IngredientCatalog {
    /// Build a catalog from entries, indexing names and synonyms
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` on duplicate ids or empty
    /// names.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, PipelineError> {
        let mut by_name = HashMap::new();
        let mut by_synonym = HashMap::new();
        let mut seen_ids = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "catalog entry '{}' has an empty name",
                    entry.id
                )));
            }
            if seen_ids.insert(entry.id.clone(), index).is_some() {
                return Err(PipelineError::Configuration(format!(
                    "duplicate catalog id '{}'",
                    entry.id
                )));
            }

            let name_key = normalize(&entry.name);
            if by_name.insert(name_key, index).is_some() {
                warn!(name = %entry.name, "duplicate canonical name shadows an earlier entry");
            }
            for synonym in &entry.synonyms {
                let key = normalize(synonym);
                if key.is_empty() {
                    continue;
                }
                if by_synonym.contains_key(&key) {
                    warn!(synonym = %synonym, "duplicate synonym ignored");
                    continue;
                }
                by_synonym.insert(key, index);
            }
        }

        Ok(Self {
            entries,
            by_name,
            by_synonym,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        })
    }

    /// Override the fuzzy similarity threshold
    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Parse a catalog from a TOML string with `[[ingredient]]` tables
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` on parse failure or invalid
    /// entries.
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let file: CatalogFile = toml::from_str(raw)
            .map_err(|e| PipelineError::Configuration(format!("invalid catalog: {}", e)))?;
        if file.ingredient.is_empty() {
            return Err(PipelineError::Configuration(
                "catalog contains no [[ingredient]] entries".to_string(),
            ));
        }
        Self::from_entries(file.ingredient)
    }

    /// Load a catalog from a TOML file
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

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by id
    pub fn get(&self, id: &CatalogId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Whether an id exists in the catalog
    pub fn contains(&self, id: &CatalogId) -> bool {
        self.get(id).is_some()
    }

    /// All surface forms (names and synonyms), longest term first
    ///
    /// Longest-first ordering lets a scanner prefer "romaine lettuce" over
    /// "lettuce" at the same position. Duplicate terms keep the higher
    /// confidence.
    pub fn surface_forms(&self) -> Vec<SurfaceForm> {
        let mut by_term: HashMap<String, f64> = HashMap::new();
        for entry in &self.entries {
            let confidence = entry.recognition_confidence;
            let name = entry.name.to_lowercase();
            let slot = by_term.entry(name).or_insert(confidence);
            if confidence > *slot {
                *slot = confidence;
            }
            for synonym in &entry.synonyms {
                let term = synonym.to_lowercase();
                if term.trim().is_empty() {
                    continue;
                }
                let slot = by_term.entry(term).or_insert(confidence);
                if confidence > *slot {
                    *slot = confidence;
                }
            }
        }

        let mut forms: Vec<SurfaceForm> = by_term
            .into_iter()
            .map(|(term, confidence)| SurfaceForm { term, confidence })
            .collect();
        forms.sort_by(|a, b| {
            b.term
                .len()
                .cmp(&a.term.len())
                .then_with(|| a.term.cmp(&b.term))
        });
        forms
    }

    /// Resolve span text to a canonical entry
    ///
    /// Resolution order: exact canonical name, synonym table (including the
    /// inverted "tail, head" form), fuzzy similarity above the threshold,
    /// then unresolved. Unresolved is an answer, not an error: the text is
    /// carried through with zero match confidence.
    pub fn lookup(&self, text: &str) -> CanonicalMatch {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return self.unresolved(text);
        }

        if let Some(&index) = self.by_name.get(&normalized) {
            return self.resolved(index, 1.0, MatchMethod::Exact);
        }

        if let Some(&index) = self.by_synonym.get(&normalized) {
            return self.resolved(index, SYNONYM_CONFIDENCE, MatchMethod::Synonym);
        }

        // "lettuce, romaine" resolves through the same tables as
        // "romaine lettuce"
        if let Some(inverted) = comma_inverted(text) {
            if let Some(&index) = self.by_name.get(&inverted) {
                return self.resolved(index, SYNONYM_CONFIDENCE, MatchMethod::Synonym);
            }
            if let Some(&index) = self.by_synonym.get(&inverted) {
                return self.resolved(index, SYNONYM_CONFIDENCE, MatchMethod::Synonym);
            }
        }

        if let Some((index, score)) = self.best_fuzzy(&normalized) {
            return self.resolved(index, score, MatchMethod::Fuzzy);
        }

        self.unresolved(text)
    }

    /// Best fuzzy candidate at or above the threshold
    ///
    /// Only canonical names participate; synonyms resolve exactly or not at
    /// all. Ties on similarity break toward the smaller edit distance, then
    /// the lexically smaller name, keeping results stable across runs.
    fn best_fuzzy(&self, normalized: &str) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64, usize, String)> = None;

        for (index, entry) in self.entries.iter().enumerate() {
            let candidate = normalize(&entry.name);
            if candidate.is_empty() {
                continue;
            }
            let score = strsim::jaro_winkler(normalized, &candidate);
            if score < self.fuzzy_threshold {
                continue;
            }
            let distance = strsim::levenshtein(normalized, &candidate);
            let better = match &best {
                None => true,
                Some((_, best_score, best_distance, best_name)) => {
                    score > *best_score
                        || (score == *best_score && distance < *best_distance)
                        || (score == *best_score
                            && distance == *best_distance
                            && candidate < *best_name)
                }
            };
            if better {
                best = Some((index, score, distance, candidate));
            }
        }

        best.map(|(index, score, _, _)| (index, score))
    }

    fn resolved(&self, index: usize, confidence: f64, method: MatchMethod) -> CanonicalMatch {
        let entry = &self.entries[index];
        CanonicalMatch {
            catalog_id: Some(entry.id.clone()),
            canonical_name: entry.name.clone(),
            match_confidence: confidence,
            match_method: method,
        }
    }

    fn unresolved(&self, text: &str) -> CanonicalMatch {
        CanonicalMatch {
            catalog_id: None,
            canonical_name: text.trim().to_string(),
            match_confidence: 0.0,
            match_method: MatchMethod::Unresolved,
        }
    }

    /// Built-in catalog of common ingredients
    pub fn builtin() -> Self {
        Self::from_entries(builtin_entries()).expect("built-in entries have unique ids")
    }
}

fn entry(
    id: &str,
    name: &str,
    category: FoodCategory,
    synonyms: &[&str],
    recognition_confidence: f64,
    calories_per_100g: f64,
) -> CatalogEntry {
    CatalogEntry {
        id: CatalogId::new(id),
        name: name.to_string(),
        category,
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        recognition_confidence,
        default_unit: None,
        typical_quantity: None,
        calories_per_100g: Some(calories_per_100g),
    }
}

fn with_typical(mut e: CatalogEntry, quantity: f64, unit: &str) -> CatalogEntry {
    e.typical_quantity = Some(quantity);
    e.default_unit = Some(unit.to_string());
    e
}

fn builtin_entries() -> Vec<CatalogEntry> {
    use FoodCategory::*;
    vec![
        // Proteins
        entry("chicken", "chicken", Protein, &["chicken meat"], 0.95, 239.0),
        with_typical(
            entry(
                "chicken-breast",
                "chicken breast",
                Protein,
                &["chicken breasts"],
                0.90,
                165.0,
            ),
            1.0,
            "piece",
        ),
        entry("beef", "beef", Protein, &["ground beef"], 0.95, 250.0),
        entry("pork", "pork", Protein, &["pork loin"], 0.95, 242.0),
        entry("salmon", "salmon", Protein, &["salmon fillet"], 0.95, 208.0),
        entry("shrimp", "shrimp", Protein, &["prawns"], 0.95, 99.0),
        entry("egg", "egg", Protein, &["eggs"], 0.90, 155.0),
        // Produce
        with_typical(
            entry(
                "romaine-lettuce",
                "romaine lettuce",
                Produce,
                &["romaine", "cos lettuce"],
                0.92,
                17.0,
            ),
            2.0,
            "cup",
        ),
        entry("lettuce", "lettuce", Produce, &["iceberg lettuce"], 0.90, 15.0),
        entry("tomato", "tomato", Produce, &["tomatoes"], 0.90, 18.0),
        entry("onion", "onion", Produce, &["onions"], 0.90, 40.0),
        entry("garlic", "garlic", Produce, &["garlic clove", "garlic cloves"], 0.90, 149.0),
        entry("bell-pepper", "bell pepper", Produce, &["bell peppers"], 0.90, 31.0),
        // Herbs
        entry("basil", "basil", Herb, &["fresh basil"], 0.88, 23.0),
        entry("oregano", "oregano", Herb, &["dried oregano"], 0.88, 265.0),
        entry("thyme", "thyme", Herb, &["fresh thyme"], 0.88, 101.0),
        entry("parsley", "parsley", Herb, &["fresh parsley"], 0.88, 36.0),
        entry("cilantro", "cilantro", Herb, &["coriander"], 0.88, 23.0),
        // Condiments and sauces
        entry("salt", "salt", Condiment, &["sea salt", "kosher salt"], 0.88, 0.0),
        entry("black-pepper", "black pepper", Condiment, &["pepper"], 0.88, 251.0),
        entry("soy-sauce", "soy sauce", Condiment, &["soy"], 0.87, 53.0),
        entry("vinegar", "vinegar", Condiment, &["white vinegar"], 0.85, 18.0),
        with_typical(
            entry(
                "caesar-dressing",
                "caesar dressing",
                Condiment,
                &["caesar salad dressing"],
                0.95,
                542.0,
            ),
            2.0,
            "tablespoon",
        ),
        with_typical(
            entry("tomato-sauce", "tomato sauce", Condiment, &["marinara"], 0.85, 29.0),
            0.5,
            "cup",
        ),
        with_typical(
            entry("alfredo-sauce", "alfredo sauce", Condiment, &["alfredo"], 0.85, 158.0),
            0.5,
            "cup",
        ),
        with_typical(
            entry("pesto", "pesto", Condiment, &["pesto sauce", "basil pesto"], 0.85, 463.0),
            0.25,
            "cup",
        ),
        with_typical(
            entry("bbq-sauce", "bbq sauce", Condiment, &["barbecue sauce"], 0.85, 172.0),
            2.0,
            "tablespoon",
        ),
        with_typical(
            entry("hot-sauce", "hot sauce", Condiment, &[], 0.85, 29.0),
            1.0,
            "teaspoon",
        ),
        with_typical(
            entry("ranch-dressing", "ranch dressing", Condiment, &["ranch"], 0.85, 430.0),
            2.0,
            "tablespoon",
        ),
        with_typical(
            entry(
                "thousand-island-dressing",
                "thousand island dressing",
                Condiment,
                &["thousand island"],
                0.85,
                379.0,
            ),
            2.0,
            "tablespoon",
        ),
        // Dairy
        with_typical(
            entry(
                "parmesan-cheese",
                "parmesan cheese",
                Dairy,
                &["parmesan", "parmigiano-reggiano"],
                0.90,
                431.0,
            ),
            2.0,
            "tablespoon",
        ),
        entry(
            "mozzarella-cheese",
            "mozzarella cheese",
            Dairy,
            &["mozzarella"],
            0.80,
            280.0,
        ),
        entry("butter", "butter", Dairy, &["unsalted butter"], 0.85, 717.0),
        entry("milk", "milk", Dairy, &["whole milk"], 0.88, 42.0),
        // Grains and baked goods
        entry("flour", "flour", Grain, &["all-purpose flour"], 0.88, 364.0),
        entry("rice", "rice", Grain, &["white rice"], 0.88, 130.0),
        entry("pasta", "pasta", Grain, &["spaghetti"], 0.88, 131.0),
        entry("pizza-dough", "pizza dough", Grain, &["dough"], 0.90, 266.0),
        with_typical(
            entry("croutons", "croutons", Grain, &[], 0.85, 465.0),
            0.5,
            "cup",
        ),
        // Pantry
        entry("sugar", "sugar", Pantry, &["granulated sugar"], 0.88, 387.0),
        entry("olive-oil", "olive oil", Pantry, &["extra virgin olive oil"], 0.90, 884.0),
    ]
}
