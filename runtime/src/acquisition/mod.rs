//! Page acquisition: HTTP fetch and HTML extraction.

pub mod extractor;
pub mod http_client;

pub use extractor::{ExtractError, Extractor, SelectorSet, StatPageExtractor};
pub use http_client::{FetchError, HttpClient};
