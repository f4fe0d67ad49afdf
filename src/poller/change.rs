use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::App;
use crate::cursor::{Cursor, WatermarkPolicy};
use crate::fetcher::PagedFetcher;
use crate::model::{DomainEvent, FeedKind};
use crate::wb::StatsApi;

/// Poller for the identity-bearing feeds (orders, sales).
///
/// Each identifier is emitted at most once per process. The first poll only
/// records the backlog as seen and reports nothing.
pub struct ChangeFeedPoller {
    feed: FeedKind,
    api: Arc<dyn StatsApi>,
    fetcher: PagedFetcher,
    cursor: Cursor,
    policy: WatermarkPolicy,
}

impl ChangeFeedPoller {
    pub fn new(
        feed: FeedKind,
        api: Arc<dyn StatsApi>,
        fetcher: PagedFetcher,
        cursor: Cursor,
        policy: WatermarkPolicy,
    ) -> Self {
        Self {
            feed,
            api,
            fetcher,
            cursor,
            policy,
        }
    }

    pub fn from_config(feed: FeedKind, api: Arc<dyn StatsApi>, app: &App) -> Self {
        Self::new(
            feed,
            api,
            PagedFetcher::new(app.page_size, app.pagination_delay()),
            Cursor::looking_back(app.look_back()),
            app.watermark_policy,
        )
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// New events since the previous poll, in upstream order.
    ///
    /// Transport errors never surface here: pages fetched before the failure
    /// are still classified and returned.
    #[instrument(skip_all, fields(feed = %self.feed))]
    pub async fn poll(&mut self) -> Vec<DomainEvent> {
        let first_run = self.cursor.is_first_run();
        let outcome = self
            .fetcher
            .fetch_all(self.api.as_ref(), self.feed, self.cursor.date_from())
            .await;
        let last_change = outcome.last_change();
        let failed = outcome.failed();
        let fetched = outcome.records.len();
        let id_field = self.feed.id_field();

        let mut events = Vec::new();
        let mut anonymous = 0usize;
        for record in outcome.records {
            let Some(id) = record.text(id_field) else {
                anonymous += 1;
                continue;
            };
            if self.cursor.mark_seen(&id) && !first_run {
                events.push(self.feed.event(record));
            }
        }
        if anonymous > 0 {
            warn!(count = anonymous, field = id_field, "skipped records without identifier");
        }

        self.cursor.settle(self.policy, last_change.as_deref(), failed);

        if first_run && self.policy.backlog_covered(outcome.pages, failed) {
            self.cursor.finish_first_run();
            info!(
                backlog = self.cursor.seen_len(),
                "first poll: existing records marked as seen"
            );
        }

        info!(
            fetched,
            new = events.len(),
            failed,
            watermark = %self.cursor.date_from(),
            "poll finished"
        );
        events
    }
}
