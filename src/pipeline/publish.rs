// src/pipeline/publish.rs

//! Feed publication.

use futures::future;

use crate::error::Result;
use crate::pipeline::feed::FeedDocument;
use crate::storage::LocalStorage;

/// Counts of a publication pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub written: usize,
    pub failed: usize,
}

/// Write rendered feeds into `storage` concurrently.
///
/// A feed that failed to render or to write is logged and counted; the
/// others are unaffected.
pub async fn publish_feeds(storage: &LocalStorage, feeds: Vec<Result<FeedDocument>>) -> PublishReport {
    let writes = feeds.into_iter().map(|feed| async move {
        let feed = feed?;
        storage
            .write_bytes(&feed.file_name, feed.xml.as_bytes())
            .await?;
        Ok::<_, crate::error::AppError>(feed.file_name)
    });

    let mut report = PublishReport::default();
    for result in future::join_all(writes).await {
        match result {
            Ok(file_name) => {
                log::debug!("Wrote feed {}", storage.path(&file_name).display());
                report.written += 1;
            }
            Err(e) => {
                log::error!("Feed not written: {}", e);
                report.failed += 1;
            }
        }
    }
    report
}
