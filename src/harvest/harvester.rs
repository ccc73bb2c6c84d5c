use crate::config::{HarvestConfig, TimeWindow};
use crate::service::{LogService, RequestError};
use crate::staging::{StagingError, StagingStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("request error while harvesting: {0}")]
    Request(#[from] RequestError),

    #[error("staging error while harvesting: {0}")]
    Staging(#[from] StagingError),

    #[error("tag '{tag}' exceeded the page limit of {limit} without reaching end of stream")]
    PageLimitExceeded { tag: String, limit: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub pages: u32,
    pub events: usize,
}

/// Walks one tag's event stream page by page and stages every page.
pub struct Harvester {
    service: Arc<dyn LogService>,
    store: Arc<dyn StagingStore>,
    page_size: u32,
    max_pages: Option<u32>,
}

impl Harvester {
    pub fn new(
        service: Arc<dyn LogService>,
        store: Arc<dyn StagingStore>,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            service,
            store,
            page_size: config.page_size,
            max_pages: config.max_pages,
        }
    }

    /// Stage the tag's pages as sequences `1..=N` until the service returns an
    /// empty cursor. Any request or staging failure aborts immediately.
    ///
    /// Harvesting a tag again overwrites the same sequence numbers.
    pub async fn harvest(&self, tag: &str, window: &TimeWindow) -> Result<HarvestStats, HarvestError> {
        let mut stats = HarvestStats::default();
        let mut cursor: Option<String> = None;
        let mut sequence: u32 = 1;

        loop {
            if let Some(limit) = self.max_pages {
                if sequence > limit {
                    return Err(HarvestError::PageLimitExceeded {
                        tag: tag.to_string(),
                        limit,
                    });
                }
            }

            let page = self
                .service
                .iterate_events(tag, window, self.page_size, cursor.as_deref())
                .await?;
            self.store.put(tag, sequence, &page).await?;

            stats.pages = sequence;
            stats.events += page.events.len();
            debug!(
                tag = %tag,
                sequence,
                events = page.events.len(),
                has_next = page.next_cursor().is_some(),
                "Staged page"
            );

            match page.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
            sequence += 1;
        }

        Ok(stats)
    }
}
