//! `statwatch check` — fetch the page once and show what would be tracked.

use anyhow::{Context, Result};

use crate::acquisition::{Extractor, HttpClient, StatPageExtractor};
use crate::config::{SourceArgs, SourceConfig};

/// Run the check command.
pub async fn run(args: &SourceArgs, json: bool) -> Result<()> {
    let cfg = SourceConfig::resolve(args).context("invalid configuration")?;
    let http = HttpClient::new(cfg.fetch_timeout).context("failed to build HTTP client")?;
    let extractor = StatPageExtractor::new(cfg.selectors).context("invalid page selectors")?;

    let body = http.get(cfg.url.as_str()).await?;
    let triples = extractor.extract(&body)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&triples)?);
        return Ok(());
    }

    if triples.is_empty() {
        println!("  No values found on {}.", cfg.url);
        return Ok(());
    }

    println!("  {} value(s) on {}:\n", triples.len(), cfg.url);
    let mut current: Option<&str> = None;
    for t in &triples {
        if current != Some(t.category.as_str()) {
            println!("  {}", t.category);
            current = Some(t.category.as_str());
        }
        println!("    {}: {}", t.term, t.raw_value);
    }

    Ok(())
}
