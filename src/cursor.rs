use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{format_date_from, try_parse_upstream_date};

/// How the watermark moves at the end of a poll.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Jump to wall-clock now after every poll, even a partially failed one.
    /// Pages not reached before a failure are never requested again.
    #[default]
    WallClock,
    /// Advance only to the change timestamp of the last record actually
    /// fetched. Falls back to now when a poll completes without records.
    LastRecord,
}

impl WatermarkPolicy {
    /// Whether a first poll that fetched `pages` pages has moved the cursor
    /// past the whole backlog.
    pub fn backlog_covered(self, pages: usize, failed: bool) -> bool {
        match self {
            // unread pages are skipped by the jump to now
            WatermarkPolicy::WallClock => pages > 0,
            // the next poll resumes inside the backlog after a failure
            WatermarkPolicy::LastRecord => pages > 0 && !failed,
        }
    }
}

/// Per-feed "already reported" state: a watermark for the next query plus the
/// identifiers seen during this process' lifetime.
///
/// `seen` only grows; identifiers are never evicted.
#[derive(Debug, Clone)]
pub struct Cursor {
    watermark: DateTime<Utc>,
    seen: HashSet<String>,
    first_run: bool,
}

impl Cursor {
    pub fn new(watermark: DateTime<Utc>) -> Self {
        Self {
            watermark,
            seen: HashSet::new(),
            first_run: true,
        }
    }

    /// Cursor whose first poll looks `look_back` into the past.
    pub fn looking_back(look_back: chrono::Duration) -> Self {
        Self::new(Utc::now() - look_back)
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Watermark rendered as the upstream `dateFrom` parameter.
    pub fn date_from(&self) -> String {
        format_date_from(self.watermark)
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn finish_first_run(&mut self) {
        self.first_run = false;
    }

    /// Records `id` as seen. Returns `true` if it was not known before.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Moves the watermark forward; earlier timestamps are ignored.
    pub fn advance_to(&mut self, ts: DateTime<Utc>) {
        if ts > self.watermark {
            self.watermark = ts;
        }
    }

    /// Applies `policy` at the end of a poll.
    ///
    /// `last_change` is the change timestamp of the last record fetched, and
    /// `failed` tells whether pagination stopped on an error.
    pub fn settle(&mut self, policy: WatermarkPolicy, last_change: Option<&str>, failed: bool) {
        match policy {
            WatermarkPolicy::WallClock => self.advance_to(Utc::now()),
            WatermarkPolicy::LastRecord => {
                match last_change.and_then(try_parse_upstream_date) {
                    Some(ts) => self.advance_to(ts.and_utc()),
                    None if !failed => self.advance_to(Utc::now()),
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn mark_seen_reports_novelty_once() {
        let mut cursor = Cursor::new(start());
        assert!(cursor.mark_seen("a"));
        assert!(!cursor.mark_seen("a"));
        assert!(cursor.contains("a"));
        assert_eq!(cursor.seen_len(), 1);
    }

    #[test]
    fn watermark_never_moves_back() {
        let mut cursor = Cursor::new(start());
        cursor.advance_to(start() - chrono::Duration::hours(1));
        assert_eq!(cursor.watermark(), start());
    }

    #[test]
    fn wall_clock_jumps_to_now_even_after_failure() {
        let mut cursor = Cursor::new(start());
        let before = Utc::now();
        cursor.settle(WatermarkPolicy::WallClock, Some("2024-05-01T12:30:00"), true);
        assert!(cursor.watermark() >= before);
    }

    #[test]
    fn last_record_uses_record_timestamp() {
        let mut cursor = Cursor::new(start());
        cursor.settle(WatermarkPolicy::LastRecord, Some("2024-05-01T12:30:00"), true);
        assert_eq!(
            cursor.watermark(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
        );
        assert_eq!(cursor.date_from(), "2024-05-01T12:30:00.000Z");
    }

    #[test]
    fn last_record_holds_position_when_nothing_was_fetched_before_failure() {
        let mut cursor = Cursor::new(start());
        cursor.settle(WatermarkPolicy::LastRecord, None, true);
        assert_eq!(cursor.watermark(), start());

        cursor.settle(WatermarkPolicy::LastRecord, None, false);
        assert!(cursor.watermark() > start());
    }

    #[test]
    fn backlog_coverage_depends_on_policy() {
        assert!(WatermarkPolicy::WallClock.backlog_covered(1, true));
        assert!(!WatermarkPolicy::WallClock.backlog_covered(0, true));
        assert!(WatermarkPolicy::LastRecord.backlog_covered(2, false));
        assert!(!WatermarkPolicy::LastRecord.backlog_covered(1, true));
        assert!(!WatermarkPolicy::LastRecord.backlog_covered(0, false));
    }

    #[test]
    fn first_run_flag_toggles_once() {
        let mut cursor = Cursor::looking_back(chrono::Duration::days(1));
        assert!(cursor.is_first_run());
        assert!(cursor.watermark() < Utc::now());
        cursor.finish_first_run();
        assert!(!cursor.is_first_run());
    }
}
