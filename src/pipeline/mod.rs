//! Pipeline entry points.
//!
//! - `run_once`: one fetch, detect and publish pass over all sites
//! - `run_watch`: `run_once` on the configured interval

pub mod diff;
pub mod feed;
pub mod publish;
pub mod watch;

pub use feed::{FeedBuilder, FeedDocument};
pub use publish::{PublishReport, publish_feeds};
pub use watch::{WatchOutcome, run_once, run_watch};
