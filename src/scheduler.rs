use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::format;
use crate::model::FeedKind;
use crate::notify::{ChatTransport, NotificationDispatcher};
use crate::poller::{ChangeFeedPoller, ThresholdFeedPoller};
use crate::wb::{FeedbackApi, StatsApi};

/// The three scheduled feeds, in the order a tick visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Orders,
    Feedback,
    Sales,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Feed::Orders, Feed::Feedback, Feed::Sales];

    fn index(self) -> usize {
        match self {
            Feed::Orders => 0,
            Feed::Feedback => 1,
            Feed::Sales => 2,
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feed::Orders => "orders",
            Feed::Feedback => "feedback",
            Feed::Sales => "sales",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub orders: Duration,
    pub feedback: Duration,
    pub sales: Duration,
}

impl Cadence {
    fn of(&self, feed: Feed) -> Duration {
        match feed {
            Feed::Orders => self.orders,
            Feed::Feedback => self.feedback,
            Feed::Sales => self.sales,
        }
    }
}

/// Result of running one feed within a tick. `notified` is `None` when the
/// feed panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOutcome {
    pub feed: Feed,
    pub notified: Option<usize>,
}

/// Single worker loop driving all pollers on their own cadences.
pub struct Scheduler {
    orders: ChangeFeedPoller,
    sales: ChangeFeedPoller,
    feedback: ThresholdFeedPoller,
    dispatcher: NotificationDispatcher,
    cadence: Cadence,
}

impl Scheduler {
    pub fn new(
        orders: ChangeFeedPoller,
        sales: ChangeFeedPoller,
        feedback: ThresholdFeedPoller,
        dispatcher: NotificationDispatcher,
        cadence: Cadence,
    ) -> Self {
        Self {
            orders,
            sales,
            feedback,
            dispatcher,
            cadence,
        }
    }

    pub fn from_config(
        cfg: &Config,
        stats: Arc<dyn StatsApi>,
        feedback: Arc<dyn FeedbackApi>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let app = &cfg.app;
        Self::new(
            ChangeFeedPoller::from_config(FeedKind::Orders, stats.clone(), app),
            ChangeFeedPoller::from_config(FeedKind::Sales, stats, app),
            ThresholdFeedPoller::new(feedback, app.feedback_interval()),
            NotificationDispatcher::from_config(transport, &cfg.telegram.chat_ids, app),
            Cadence {
                orders: app.orders_interval(),
                feedback: app.feedback_interval(),
                sales: app.sales_interval(),
            },
        )
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Runs every feed once, in tick order.
    pub async fn run_once(&mut self) -> Vec<FeedOutcome> {
        self.tick(&Feed::ALL).await
    }

    /// Runs the given feeds in tick order. A panicking feed is logged and
    /// does not stop the remaining ones.
    pub async fn tick(&mut self, feeds: &[Feed]) -> Vec<FeedOutcome> {
        let mut outcomes = Vec::with_capacity(feeds.len());
        for feed in Feed::ALL.into_iter().filter(|f| feeds.contains(f)) {
            let notified = match AssertUnwindSafe(self.run_feed(feed)).catch_unwind().await {
                Ok(n) => Some(n),
                Err(_) => {
                    error!(%feed, "poller panicked; continuing with remaining feeds");
                    None
                }
            };
            outcomes.push(FeedOutcome { feed, notified });
        }
        outcomes
    }

    #[instrument(skip(self))]
    async fn run_feed(&mut self, feed: Feed) -> usize {
        match feed {
            Feed::Orders | Feed::Sales => {
                let poller = if feed == Feed::Orders {
                    &mut self.orders
                } else {
                    &mut self.sales
                };
                let events = poller.poll().await;
                if events.is_empty() {
                    info!("nothing new");
                    return 0;
                }
                info!(count = events.len(), "new events");
                let messages: Vec<String> = events.iter().map(format::event_message).collect();
                self.dispatcher.notify_all(&messages).await;
                messages.len()
            }
            Feed::Feedback => {
                let message = self
                    .feedback
                    .poll()
                    .await
                    .and_then(|status| format::feedback_message(&status));
                match message {
                    Some(message) => {
                        self.dispatcher.notify(&message).await;
                        1
                    }
                    None => 0,
                }
            }
        }
    }

    fn next_wake(next: &[Instant; 3]) -> Instant {
        next.iter().copied().min().unwrap_or_else(Instant::now)
    }

    /// Runs until `shutdown` resolves. Shutdown is observed between ticks;
    /// a tick in progress is allowed to finish.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut next = [Instant::now(); 3];
        info!(
            orders_secs = self.cadence.orders.as_secs(),
            feedback_secs = self.cadence.feedback.as_secs(),
            sales_secs = self.cadence.sales.as_secs(),
            "scheduler running"
        );

        loop {
            let wake = Self::next_wake(&next);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested; scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep_until(wake) => {}
            }

            let now = Instant::now();
            let due: Vec<Feed> = Feed::ALL
                .into_iter()
                .filter(|f| next[f.index()] <= now)
                .collect();
            self.tick(&due).await;

            let finished = Instant::now();
            for feed in due {
                next[feed.index()] = finished + self.cadence.of(feed);
            }
        }
    }
}
