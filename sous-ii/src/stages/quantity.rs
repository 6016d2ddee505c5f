//! Quantity and unit parsing
//!
//! Runs in two steps so scanning can overlap entity recognition: `scan`
//! finds quantity expressions in the raw text on its own, and `associate`
//! later attaches each expression to the nearest recognized span it
//! precedes or sits inside. Expressions with no span within the
//! association window are dropped and counted.
//!
//! Recognized forms: integers, decimals, simple and mixed fractions
//! ("3/4", "1 1/2"), ranges ("2-3", "2 to 3") normalized to their
//! midpoint, and an optional trailing unit word. Negative values are
//! parsed and carried through; plausibility is the validator's job.

use crate::types::QuantityAnnotation;
use once_cell::sync::Lazy;
use regex::Regex;
use sous_common::text::{tokenize, tokens_between};
use std::collections::{BTreeMap, HashMap};

/// Maximum tokens between a quantity and the span it attaches to
pub const ASSOCIATION_WINDOW_TOKENS: usize = 4;

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?P<a> -?\d+/\d+ | -?\d+(?:\.\d+)?(?:\s+\d+/\d+)? )
        (?: \s*(?:-|to)\s* (?P<b> \d+/\d+ | \d+(?:\.\d+)?(?:\s+\d+/\d+)? ) )?
        (?: \s* (?P<unit> [A-Za-z]+ ) )?
        ",
    )
    .expect("quantity pattern compiles")
});

/// Measurement class of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    /// Volume, base milliliters
    Volume,
    /// Mass, base grams
    Mass,
    /// Discrete count
    Count,
}

struct UnitDef {
    class: UnitClass,
    canonical: &'static str,
    to_base: f64,
}

static UNITS: Lazy<HashMap<&'static str, UnitDef>> = Lazy::new(|| {
    let defs: &[(&[&str], UnitClass, &str, f64)] = &[
        (&["cup", "cups"], UnitClass::Volume, "cup", 236.6),
        (
            &["tablespoon", "tablespoons", "tbsp"],
            UnitClass::Volume,
            "tablespoon",
            14.8,
        ),
        (
            &["teaspoon", "teaspoons", "tsp"],
            UnitClass::Volume,
            "teaspoon",
            4.9,
        ),
        (
            &["ml", "milliliter", "milliliters", "millilitre", "millilitres"],
            UnitClass::Volume,
            "ml",
            1.0,
        ),
        (
            &["l", "liter", "liters", "litre", "litres"],
            UnitClass::Volume,
            "l",
            1000.0,
        ),
        (&["quart", "quarts", "qt"], UnitClass::Volume, "quart", 946.0),
        (&["pint", "pints"], UnitClass::Volume, "pint", 473.0),
        (&["gallon", "gallons"], UnitClass::Volume, "gallon", 3785.0),
        (&["g", "gram", "grams"], UnitClass::Mass, "g", 1.0),
        (&["kg", "kilogram", "kilograms"], UnitClass::Mass, "kg", 1000.0),
        (&["oz", "ounce", "ounces"], UnitClass::Mass, "oz", 28.35),
        (&["lb", "lbs", "pound", "pounds"], UnitClass::Mass, "lb", 453.6),
        (&["piece", "pieces"], UnitClass::Count, "piece", 1.0),
        (&["clove", "cloves"], UnitClass::Count, "clove", 1.0),
        (&["slice", "slices"], UnitClass::Count, "slice", 1.0),
        (&["can", "cans"], UnitClass::Count, "can", 1.0),
        (&["pinch", "pinches"], UnitClass::Count, "pinch", 1.0),
        (&["dash", "dashes"], UnitClass::Count, "dash", 1.0),
        (&["head", "heads"], UnitClass::Count, "head", 1.0),
        (&["stick", "sticks"], UnitClass::Count, "stick", 1.0),
        (&["bunch", "bunches"], UnitClass::Count, "bunch", 1.0),
    ];

    let mut map = HashMap::new();
    for (aliases, class, canonical, to_base) in defs {
        for alias in *aliases {
            map.insert(
                *alias,
                UnitDef {
                    class: *class,
                    canonical,
                    to_base: *to_base,
                },
            );
        }
    }
    map
});

/// Canonical token for a unit word, if it is one
pub fn canonical_unit(token: &str) -> Option<&'static str> {
    UNITS
        .get(token.to_ascii_lowercase().as_str())
        .map(|def| def.canonical)
}

/// Measurement class and base-unit amount for a value in a canonical unit
///
/// Base units are milliliters for volume and grams for mass; counts pass
/// through unchanged.
pub fn to_base_amount(value: f64, unit: &str) -> Option<(UnitClass, f64)> {
    UNITS
        .get(unit.to_ascii_lowercase().as_str())
        .map(|def| (def.class, value * def.to_base))
}

/// One quantity expression found in the text
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMatch {
    /// Byte offset of the expression start
    pub start: usize,
    /// Byte offset one past the expression end
    pub end: usize,
    /// Parsed value (midpoint for ranges)
    pub value: f64,
    /// Canonical unit, when a unit word followed the number
    pub unit: Option<String>,
    /// Whether the expression was a range
    pub is_range: bool,
}

/// Find all quantity expressions in the text
pub fn scan(text: &str) -> Vec<QuantityMatch> {
    let mut found = Vec::new();

    for caps in QUANTITY_RE.captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let a = match caps.name("a") {
            Some(m) => m,
            None => continue,
        };
        // Reject matches glued to a preceding word, like the "2" in "v2"
        let glued = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric());
        if glued {
            continue;
        }

        let first = match parse_number(a.as_str()) {
            Some(v) => v,
            None => continue,
        };
        let second = caps.name("b").and_then(|m| parse_number(m.as_str()));
        let (value, is_range) = match second {
            Some(v) => ((first + v) / 2.0, true),
            None => (first, false),
        };

        let number_end = caps.name("b").map_or(a.end(), |m| m.end());
        let (unit, end) = match caps.name("unit") {
            Some(m) => match canonical_unit(m.as_str()) {
                Some(canonical) => (Some(canonical.to_string()), whole.end()),
                // The trailing word was not a unit ("2 eggs"), keep the number only
                None => (None, number_end),
            },
            None => (None, number_end),
        };

        found.push(QuantityMatch {
            start: whole.start(),
            end,
            value,
            unit,
            is_range,
        });
    }

    found
}

/// Attach quantity expressions to recognized spans
///
/// Each expression attaches to the nearest span it precedes within the
/// association window, or to a span that encloses it. Nearness is counted
/// in intervening tokens; ties go to the earlier span. A span takes at
/// most one annotation. Returns the annotations keyed by span offsets and
/// the count of expressions that found no span.
pub fn associate(
    text: &str,
    spans: &[(usize, usize)],
    matches: &[QuantityMatch],
) -> (BTreeMap<(usize, usize), QuantityAnnotation>, usize) {
    let tokens = tokenize(text);
    let mut annotations: BTreeMap<(usize, usize), QuantityAnnotation> = BTreeMap::new();
    let mut dropped = 0usize;

    for m in matches {
        let mut best: Option<((usize, usize), usize)> = None;

        for &(start, end) in spans {
            if annotations.contains_key(&(start, end)) {
                continue;
            }
            let distance = if start <= m.start && m.end <= end {
                // Quantity sits inside the span
                Some(0)
            } else if m.end <= start {
                let gap = tokens_between(&tokens, m.end, start);
                (gap <= ASSOCIATION_WINDOW_TOKENS).then_some(gap)
            } else {
                None
            };
            let Some(distance) = distance else { continue };

            let better = match best {
                None => true,
                Some((best_span, best_distance)) => {
                    distance < best_distance
                        || (distance == best_distance && start < best_span.0)
                }
            };
            if better {
                best = Some(((start, end), distance));
            }
        }

        match best {
            Some(((start, end), _)) => {
                annotations.insert(
                    (start, end),
                    QuantityAnnotation {
                        value: Some(m.value),
                        unit: m.unit.clone(),
                        is_range: m.is_range,
                        span_start: start,
                        span_end: end,
                    },
                );
            }
            None => dropped += 1,
        }
    }

    (annotations, dropped)
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    let magnitude = if let Some((whole, frac)) = unsigned.split_once(char::is_whitespace) {
        let whole: f64 = whole.trim().parse().ok()?;
        whole + parse_fraction(frac.trim())?
    } else if unsigned.contains('/') {
        parse_fraction(unsigned)?
    } else {
        unsigned.parse().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

fn parse_fraction(raw: &str) -> Option<f64> {
    let (numerator, denominator) = raw.split_once('/')?;
    let numerator: f64 = numerator.trim().parse().ok()?;
    let denominator: f64 = denominator.trim().parse().ok()?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
