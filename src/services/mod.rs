//! Service layer of the watcher.
//!
//! - `normalizer`: comparison-text normalization
//! - `extractor`: content-region selection (`HtmlDocument`, `extract`)
//! - `detector`: hash-gated change detection (`ChangeDetector`)
//! - `fetcher`: page retrieval (`PageSource`, `HttpFetcher`)

pub mod detector;
pub mod extractor;
pub mod fetcher;
pub mod normalizer;

pub use detector::{ChangeDetector, Detection};
pub use extractor::{Extraction, HtmlDocument, MatchableDocument, SelectionStrategy, extract};
pub use fetcher::{HttpFetcher, PageSource};
