//! Category label normalization.

/// Strips decorative affixes from category labels so one logical category
/// always maps to one snapshot key.
#[derive(Debug, Clone, Default)]
pub struct CategoryNormalizer {
    affixes: Vec<String>,
}

impl CategoryNormalizer {
    /// A normalizer that only trims whitespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// A normalizer that also removes each affix when it leads or trails the label.
    pub fn with_affixes<I, S>(affixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let affixes = affixes
            .into_iter()
            .map(Into::into)
            .map(|a: String| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        Self { affixes }
    }

    pub fn affixes(&self) -> &[String] {
        &self.affixes
    }

    /// Normalize a category label.
    ///
    /// A label made only of affixes is returned trimmed but otherwise intact.
    pub fn category(&self, label: &str) -> String {
        let mut current = label.trim();
        loop {
            let before = current;
            for affix in &self.affixes {
                if let Some(rest) = current.strip_suffix(affix.as_str()) {
                    current = rest.trim_end();
                }
                if let Some(rest) = current.strip_prefix(affix.as_str()) {
                    current = rest.trim_start();
                }
            }
            if current == before {
                break;
            }
        }
        if current.is_empty() {
            label.trim().to_string()
        } else {
            current.to_string()
        }
    }

    /// Normalize a term label.
    pub fn term(&self, label: &str) -> String {
        label.trim().to_string()
    }
}
