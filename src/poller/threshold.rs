use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::model::FeedbackStatus;
use crate::wb::{ApiError, FeedbackApi};

/// Poller for the feedback/questions flags.
///
/// The upstream exposes no item identifiers, so a flag that stays set is
/// reported again on every successful check.
pub struct ThresholdFeedPoller {
    api: Arc<dyn FeedbackApi>,
    min_interval: Duration,
    last_check: Option<Instant>,
}

impl ThresholdFeedPoller {
    pub fn new(api: Arc<dyn FeedbackApi>, min_interval: Duration) -> Self {
        Self {
            api,
            min_interval,
            last_check: None,
        }
    }

    pub fn last_check(&self) -> Option<Instant> {
        self.last_check
    }

    /// `None` when gated by the minimum interval or when the request failed.
    #[instrument(skip_all)]
    pub async fn poll(&mut self) -> Option<FeedbackStatus> {
        if let Some(last) = self.last_check {
            let since = last.elapsed();
            if since < self.min_interval {
                debug!(since_ms = since.as_millis() as u64, "feedback check gated");
                return None;
            }
        }

        match self.api.feedback_status().await {
            Ok(status) => {
                self.last_check = Some(Instant::now());
                info!(
                    has_new_feedbacks = status.has_new_feedbacks,
                    has_new_questions = status.has_new_questions,
                    feedbacks = status.feedbacks_count,
                    questions = status.questions_count,
                    "feedback status"
                );
                Some(status)
            }
            Err(err) => {
                if let ApiError::Upstream { additional, .. } = &err {
                    if !additional.is_empty() {
                        info!(errors = %additional.join(", "), "additional feedback API errors");
                    }
                }
                err.log("feedback check");
                None
            }
        }
    }
}
