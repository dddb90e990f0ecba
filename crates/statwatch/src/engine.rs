//! Change detection between the retained snapshot and a freshly extracted batch.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::normalize::CategoryNormalizer;
use crate::render::{render_report, render_totals, ReportStyle};
use crate::types::{DiffEntry, MetricKey, MetricValue, Snapshot, Triple, ValueParseError};

/// Everything the comparison pass learned about one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison<V> {
    /// Terms whose value changed, in batch order.
    pub entries: Vec<DiffEntry<V>>,
    /// Categories created by this batch. Nothing under them is reported.
    pub new_categories: BTreeSet<String>,
    /// Keys seen for the first time, recorded without a diff.
    pub new_keys: Vec<MetricKey>,
    /// Values that could not be read and were skipped.
    #[serde(skip)]
    pub parse_errors: Vec<ValueParseError>,
    /// Number of values that matched the snapshot.
    pub unchanged: usize,
}

impl<V> Default for Comparison<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            new_categories: BTreeSet::new(),
            new_keys: Vec::new(),
            parse_errors: Vec::new(),
            unchanged: 0,
        }
    }
}

impl<V> Comparison<V> {
    /// Only real changes to previously known keys count as an update.
    pub fn has_update(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult<V> {
    pub has_update: bool,
    /// Empty when `has_update` is false.
    pub rendered_text: String,
    pub comparison: Comparison<V>,
}

/// Owns the retained snapshot and turns batches into reports.
#[derive(Debug, Clone)]
pub struct ChangeEngine<V> {
    snapshot: Snapshot<V>,
    normalizer: CategoryNormalizer,
    style: ReportStyle,
}

impl<V: MetricValue> ChangeEngine<V> {
    /// Create an engine with an empty snapshot.
    pub fn new(normalizer: CategoryNormalizer, style: ReportStyle) -> Self {
        Self {
            snapshot: Snapshot::new(),
            normalizer,
            style,
        }
    }

    pub fn snapshot(&self) -> &Snapshot<V> {
        &self.snapshot
    }

    pub fn style(&self) -> &ReportStyle {
        &self.style
    }

    pub fn normalizer(&self) -> &CategoryNormalizer {
        &self.normalizer
    }

    /// Compare a batch against the snapshot and update it in place.
    pub fn compare<I>(&mut self, triples: I) -> Comparison<V>
    where
        I: IntoIterator<Item = Triple>,
    {
        let mut cmp = Comparison::default();

        for triple in triples {
            let category = self.normalizer.category(&triple.category);
            let term = self.normalizer.term(&triple.term);
            if category.is_empty() || term.is_empty() {
                debug!("skipping unlabeled value {:?}", triple.raw_value);
                continue;
            }

            let Some(value) = V::parse(&triple.raw_value) else {
                let err = ValueParseError {
                    category,
                    term,
                    raw: triple.raw_value,
                    kind: V::KIND,
                };
                warn!("{err}");
                cmp.parse_errors.push(err);
                continue;
            };

            if !self.snapshot.contains_category(&category)
                || cmp.new_categories.contains(&category)
            {
                if !cmp.new_categories.contains(&category) {
                    debug!("first sight of category {category:?}");
                    cmp.new_categories.insert(category.clone());
                }
                self.snapshot.insert(&category, &term, value);
                cmp.new_keys.push(MetricKey { category, term });
                continue;
            }

            let known = self
                .snapshot
                .get(&category, &term)
                .map(|prev| (value.describe_change(prev), prev));
            match known {
                None => {
                    debug!("first sight of {category}/{term}");
                    self.snapshot.insert(&category, &term, value);
                    cmp.new_keys.push(MetricKey { category, term });
                }
                Some((None, _)) => cmp.unchanged += 1,
                Some((Some(description), prev)) => {
                    let previous = V::KEEPS_PREVIOUS.then(|| prev.clone());
                    self.snapshot.insert(&category, &term, value.clone());
                    cmp.entries.push(DiffEntry {
                        category,
                        term,
                        previous,
                        current: value,
                        description,
                    });
                }
            }
        }

        cmp
    }

    /// Compare, update, and render a report if anything changed.
    pub fn process_snapshot<I>(&mut self, triples: I) -> ReportResult<V>
    where
        I: IntoIterator<Item = Triple>,
    {
        let comparison = self.compare(triples);
        info!(
            "compared batch: changed={} new_keys={} new_categories={} unchanged={} unreadable={}",
            comparison.entries.len(),
            comparison.new_keys.len(),
            comparison.new_categories.len(),
            comparison.unchanged,
            comparison.parse_errors.len()
        );

        let has_update = comparison.has_update();
        let rendered_text = if has_update {
            render_report(&comparison.entries, &self.snapshot, &self.style)
        } else {
            String::new()
        };

        ReportResult {
            has_update,
            rendered_text,
            comparison,
        }
    }

    /// Current totals without a changes section.
    pub fn render_totals(&self) -> String {
        render_totals(&self.snapshot, self.style.emphasis)
    }
}
