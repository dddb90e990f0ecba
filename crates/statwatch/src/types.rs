//! Core data types for metric snapshots and their differences.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One `(category, term, raw value)` observation taken from a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub category: String,
    pub term: String,
    pub raw_value: String,
}

impl Triple {
    /// Build a triple from anything string-like.
    pub fn new(
        category: impl Into<String>,
        term: impl Into<String>,
        raw_value: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            term: term.into(),
            raw_value: raw_value.into(),
        }
    }
}

/// Identifies a single tracked value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub category: String,
    pub term: String,
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.term)
    }
}

/// A raw value that could not be read in the configured representation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot read {category}'s {term} as {kind}: {raw:?}")]
pub struct ValueParseError {
    pub category: String,
    pub term: String,
    pub raw: String,
    pub kind: &'static str,
}

/// A value representation the engine can retain and compare.
///
/// Implementations decide what "changed" means and how a change is described.
pub trait MetricValue: Clone + PartialEq + fmt::Debug + fmt::Display {
    /// Name of the representation, used in logs and parse errors.
    const KIND: &'static str;

    /// Whether diff entries should carry the previous value.
    const KEEPS_PREVIOUS: bool;

    /// Read a raw extracted string. `None` when the text is not in this representation.
    fn parse(raw: &str) -> Option<Self>;

    /// Describe the change from `previous` to `self`, or `None` if nothing changed.
    fn describe_change(&self, previous: &Self) -> Option<String>;
}

/// String-valued metric, compared only for equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opaque(pub String);

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl MetricValue for Opaque {
    const KIND: &'static str = "text";
    const KEEPS_PREVIOUS: bool = false;

    fn parse(raw: &str) -> Option<Self> {
        Some(Self(raw.trim().to_string()))
    }

    fn describe_change(&self, previous: &Self) -> Option<String> {
        (self != previous).then(|| "changed".to_string())
    }
}

/// Integer-valued metric with a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Numeric(pub i64);

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Numeric {
    /// `self - previous`, widened so extreme values cannot overflow.
    pub fn delta(&self, previous: &Self) -> i128 {
        self.0 as i128 - previous.0 as i128
    }
}

impl MetricValue for Numeric {
    const KIND: &'static str = "integer";
    const KEEPS_PREVIOUS: bool = true;

    fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| *c != ',' && *c != '_')
            .collect();
        cleaned.parse::<i64>().ok().map(Self)
    }

    fn describe_change(&self, previous: &Self) -> Option<String> {
        let delta = self.delta(previous);
        match delta {
            0 => None,
            d if d > 0 => Some(format!("increased by {d}")),
            d => Some(format!("decreased by {}", -d)),
        }
    }
}

/// One term whose value changed during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry<V> {
    pub category: String,
    pub term: String,
    /// Present only for representations that keep it (numeric).
    pub previous: Option<V>,
    pub current: V,
    pub description: String,
}

/// Last known state: category -> term -> value, ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot<V> {
    categories: BTreeMap<String, BTreeMap<String, V>>,
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
        }
    }
}

impl<V> Snapshot<V> {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of tracked keys across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn contains_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn get(&self, category: &str, term: &str) -> Option<&V> {
        self.categories.get(category)?.get(term)
    }

    /// Record a value, returning the one it replaced.
    pub fn insert(&mut self, category: &str, term: &str, value: V) -> Option<V> {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(term.to_string(), value)
    }

    /// Categories with their terms, in key order.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, V>)> {
        self.categories.iter().map(|(c, terms)| (c.as_str(), terms))
    }

    /// Every `(category, term, value)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &V)> {
        self.categories.iter().flat_map(|(c, terms)| {
            terms
                .iter()
                .map(move |(t, v)| (c.as_str(), t.as_str(), v))
        })
    }
}
