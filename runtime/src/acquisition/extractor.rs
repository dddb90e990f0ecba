//! Turn the statistics page into `(category, term, value)` triples.
//!
//! The page groups figures into tagged blocks: a `<strong>` category label
//! followed by `<dl>` entries whose `<dt>` is the term and `<dd>` the value.
//! Parsing uses the `scraper` crate for CSS selector-based lookup.

use scraper::{ElementRef, Html, Selector};
use statwatch::Triple;
use tracing::debug;

/// Why a document yielded no usable triples.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid {which} selector {selector:?}: {reason}")]
    Selector {
        which: &'static str,
        selector: String,
        reason: String,
    },

    #[error("document has no {0:?} element; page layout may have changed")]
    Unrecognized(String),
}

/// Source of triples for the change engine.
pub trait Extractor: Send + Sync {
    /// Extract every confidently labeled value, in document order.
    fn extract(&self, html: &str) -> Result<Vec<Triple>, ExtractError>;
}

/// CSS selectors describing the page layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub container: String,
    pub group: String,
    pub category: String,
    pub entry: String,
    pub term: String,
    pub value: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            container: "#stat".to_string(),
            group: ".tag".to_string(),
            category: "strong".to_string(),
            entry: "dl".to_string(),
            term: "dt".to_string(),
            value: "dd".to_string(),
        }
    }
}

struct Compiled {
    container: Selector,
    group: Selector,
    category: Selector,
    entry: Selector,
    term: Selector,
    value: Selector,
}

/// Extractor for tagged statistics blocks.
pub struct StatPageExtractor {
    selectors: SelectorSet,
    compiled: Compiled,
}

impl StatPageExtractor {
    /// Compile the selectors once; invalid selectors are a configuration error.
    pub fn new(selectors: SelectorSet) -> Result<Self, ExtractError> {
        let compiled = Compiled {
            container: compile("container", &selectors.container)?,
            group: compile("group", &selectors.group)?,
            category: compile("category", &selectors.category)?,
            entry: compile("entry", &selectors.entry)?,
            term: compile("term", &selectors.term)?,
            value: compile("value", &selectors.value)?,
        };
        Ok(Self {
            selectors,
            compiled,
        })
    }

    pub fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }
}

impl Extractor for StatPageExtractor {
    fn extract(&self, html: &str) -> Result<Vec<Triple>, ExtractError> {
        let doc = Html::parse_document(html);
        let c = &self.compiled;

        let mut found_container = false;
        let mut found_group = false;
        let mut triples = Vec::new();

        for container in doc.select(&c.container) {
            found_container = true;
            for group in container.select(&c.group) {
                found_group = true;
                let category = first_text(&group, &c.category);
                if category.is_empty() {
                    debug!("skipping group without a category label");
                    continue;
                }
                for entry in group.select(&c.entry) {
                    let term = first_text(&entry, &c.term);
                    if term.is_empty() {
                        debug!("skipping unlabeled entry under {category:?}");
                        continue;
                    }
                    let value = first_text(&entry, &c.value);
                    triples.push(Triple::new(category.clone(), term, value));
                }
            }
        }

        if !found_container {
            return Err(ExtractError::Unrecognized(self.selectors.container.clone()));
        }
        if !found_group {
            return Err(ExtractError::Unrecognized(format!(
                "{} {}",
                self.selectors.container, self.selectors.group
            )));
        }

        debug!("extracted {} triple(s)", triples.len());
        Ok(triples)
    }
}

fn compile(which: &'static str, selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        which,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Whitespace-collapsed text of the first match, or empty.
fn first_text(el: &ElementRef<'_>, selector: &Selector) -> String {
    el.select(selector)
        .next()
        .map(|found| {
            found
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}
