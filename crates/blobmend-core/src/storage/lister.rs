//! Full container enumeration.

use super::traits::{ListItem, ObjectStore};
use crate::error::{BlobmendError, Result};
use crate::models::Asset;
use crate::retry::{retry_async, RetryConfig};
use tracing::{debug, info};

/// Pages through a container and collects every object.
pub struct AssetLister<'a> {
    store: &'a dyn ObjectStore,
    page_size: usize,
    retry: &'a RetryConfig,
}

impl<'a> AssetLister<'a> {
    pub fn new(store: &'a dyn ObjectStore, page_size: usize, retry: &'a RetryConfig) -> Self {
        Self {
            store,
            page_size,
            retry,
        }
    }

    /// List every object in the container, most recently modified first.
    ///
    /// Virtual-directory prefixes are dropped. Each page is retried on
    /// transient errors; once a page cannot be fetched the whole listing fails
    /// with [`BlobmendError::StorageUnavailable`].
    pub async fn list_all(&self) -> Result<Vec<Asset>> {
        let container = self.store.container();
        let mut assets = Vec::new();
        let mut marker: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let current = marker.as_deref();
            let store = self.store;
            let page_size = self.page_size;

            let (result, stats) = retry_async(
                self.retry,
                || store.list_page(current, page_size),
                |e: &BlobmendError| e.is_retryable(),
            )
            .await;

            let page = result.map_err(|e| BlobmendError::StorageUnavailable {
                container: container.to_string(),
                attempts: stats.attempts,
                message: e.to_string(),
            })?;
            pages += 1;
            if stats.attempts > 1 {
                info!(
                    container,
                    page = pages,
                    attempts = stats.attempts,
                    waited = ?stats.total_delay,
                    last_error = stats.last_error.as_deref(),
                    "Listing page recovered after retry"
                );
            }

            for item in page.items {
                match item {
                    ListItem::Object(asset) => assets.push(asset),
                    ListItem::Prefix(prefix) => debug!("Skipping prefix {}", prefix),
                }
            }

            match page.continuation {
                // A marker that does not advance would page forever.
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    return Err(BlobmendError::StorageUnavailable {
                        container: container.to_string(),
                        attempts: stats.attempts,
                        message: format!("listing continuation '{}' did not advance", next),
                    });
                }
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        assets.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.name.cmp(&b.name))
        });

        info!(
            "Listed {} object(s) in container '{}' over {} page(s)",
            assets.len(),
            container,
            pages
        );
        Ok(assets)
    }
}
