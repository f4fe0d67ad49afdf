use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::model::{FeedKind, RawRecord};
use crate::wb::{ApiError, StatsApi};

/// Drives repeated `dateFrom` requests against one statistics endpoint until
/// the upstream runs out of pages.
#[derive(Debug, Clone)]
pub struct PagedFetcher {
    page_size: usize,
    delay: Duration,
}

/// Everything one pagination run produced. `records` keeps whatever arrived
/// before `error` stopped the run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    /// Requests issued, including a failing one.
    pub requests: usize,
    /// Requests that returned a page.
    pub pages: usize,
    pub error: Option<ApiError>,
}

impl FetchOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn last_change(&self) -> Option<String> {
        self.records.last().and_then(RawRecord::change_date)
    }
}

impl PagedFetcher {
    pub fn new(page_size: usize, delay: Duration) -> Self {
        Self { page_size, delay }
    }

    #[instrument(skip_all, fields(feed = %feed))]
    pub async fn fetch_all(&self, api: &dyn StatsApi, feed: FeedKind, date_from: String) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let mut date_from = date_from;

        loop {
            outcome.requests += 1;
            debug!(%date_from, page = outcome.requests, "requesting page");
            let page = match api.fetch_page(feed, &date_from).await {
                Ok(page) => page,
                Err(err) => {
                    err.log("page request");
                    outcome.error = Some(err);
                    break;
                }
            };
            outcome.pages += 1;

            let len = page.len();
            info!(%date_from, page = outcome.pages, records = len, "fetched page");
            if len == 0 {
                break;
            }

            let next = page.last().and_then(RawRecord::change_date);
            outcome.records.extend(page);

            if len < self.page_size {
                break;
            }
            match next {
                Some(next) if next != date_from => date_from = next,
                Some(_) => {
                    warn!(%date_from, "full page without cursor progress; stopping pagination");
                    break;
                }
                None => {
                    warn!("last record of a full page has no change date; stopping pagination");
                    break;
                }
            }

            if !self.delay.is_zero() {
                debug!(delay_ms = self.delay.as_millis() as u64, "pausing before next page");
                tokio::time::sleep(self.delay).await;
            }
        }

        outcome
    }
}
