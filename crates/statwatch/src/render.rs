//! Report rendering — changes followed by the full current totals.

use crate::types::{DiffEntry, MetricValue, Snapshot};
use serde::{Deserialize, Serialize};

/// Default report title.
pub const DEFAULT_TITLE: &str = "Data update";

/// How emphasized spans are marked up for the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    /// Telegram-style legacy Markdown: `*bold*`.
    #[default]
    Markdown,
    /// `<b>bold</b>`.
    Html,
    /// No markup at all.
    Plain,
}

impl Emphasis {
    /// Escape text so it is shown literally by the destination.
    pub fn escape(self, text: &str) -> String {
        match self {
            Self::Markdown => {
                let mut out = String::with_capacity(text.len());
                for c in text.chars() {
                    if matches!(c, '_' | '*' | '`' | '[') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out
            }
            Self::Html => text
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;"),
            Self::Plain => text.to_string(),
        }
    }

    /// Escape and emphasize.
    ///
    /// Legacy Markdown has no escapes inside an entity, so a literal `*` closes
    /// the bold span, is written escaped, and the span is reopened.
    pub fn strong(self, text: &str) -> String {
        match self {
            Self::Markdown => {
                let mut out = String::with_capacity(text.len() + 2);
                for (i, piece) in text.split('*').enumerate() {
                    if i > 0 {
                        out.push_str("\\*");
                    }
                    if !piece.is_empty() {
                        out.push('*');
                        out.push_str(piece);
                        out.push('*');
                    }
                }
                out
            }
            Self::Html => format!("<b>{}</b>", self.escape(text)),
            Self::Plain => text.to_string(),
        }
    }
}

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStyle {
    pub title: String,
    pub emphasis: Emphasis,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            emphasis: Emphasis::default(),
        }
    }
}

/// Render a report from the changes of one cycle and the live snapshot.
///
/// Changes are listed by category then term; the totals section always covers
/// the whole snapshot.
pub fn render_report<V: MetricValue>(
    entries: &[DiffEntry<V>],
    snapshot: &Snapshot<V>,
    style: &ReportStyle,
) -> String {
    let em = style.emphasis;
    let mut ordered: Vec<&DiffEntry<V>> = entries.iter().collect();
    ordered.sort_by(|a, b| (&a.category, &a.term).cmp(&(&b.category, &b.term)));

    let mut out = em.strong(&style.title);
    out.push('\n');
    for entry in ordered {
        out.push_str(&format!(
            "{}'s {} {} ({})\n",
            em.escape(&entry.category),
            em.escape(&entry.term),
            entry.description,
            em.escape(&entry.current.to_string()),
        ));
    }
    out.push_str(&render_totals(snapshot, em));
    out
}

/// Render only the totals section.
pub fn render_totals<V: MetricValue>(snapshot: &Snapshot<V>, em: Emphasis) -> String {
    let mut out = String::new();
    for (category, terms) in snapshot.categories() {
        out.push('\n');
        out.push_str(&em.strong(category));
        for (term, value) in terms {
            out.push_str(&format!(
                "\n  — {}: {}",
                em.escape(term),
                em.strong(&value.to_string())
            ));
        }
        out.push('\n');
    }
    out
}
