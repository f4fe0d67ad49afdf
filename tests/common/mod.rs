#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use wb_notifier::model::{FeedKind, FeedbackStatus, RawRecord};
use wb_notifier::notify::{ChatTransport, Destination};
use wb_notifier::wb::{ApiError, FeedbackApi, StatsApi};

pub type PageResponse = Result<Vec<RawRecord>, ApiError>;

pub fn record(feed: FeedKind, id: &str, change: &str) -> RawRecord {
    RawRecord::from([
        (feed.id_field(), json!(id)),
        ("lastChangeDate", json!(change)),
        ("supplierArticle", json!(format!("ART-{id}"))),
    ])
}

/// `n` records with ids `{prefix}{start..start+n}` and increasing change dates.
pub fn records(feed: FeedKind, prefix: &str, start: usize, n: usize) -> Vec<RawRecord> {
    (start..start + n)
        .map(|i| {
            record(
                feed,
                &format!("{prefix}{i}"),
                &format!("2024-06-01T10:{:02}:{:02}", i / 60, i % 60),
            )
        })
        .collect()
}

pub fn upstream_down() -> ApiError {
    ApiError::Status {
        status: StatusCode::BAD_GATEWAY,
        body: "upstream down".into(),
    }
}

/// Statistics API fake replaying scripted pages per feed. Once a feed's
/// script runs out it answers with empty pages.
#[derive(Clone, Default)]
pub struct ScriptedStats {
    pages: Arc<Mutex<HashMap<FeedKind, VecDeque<PageResponse>>>>,
    calls: Arc<Mutex<Vec<(FeedKind, String)>>>,
    panic_on: Arc<Mutex<HashSet<FeedKind>>>,
}

impl ScriptedStats {
    pub fn push(&self, feed: FeedKind, page: PageResponse) -> &Self {
        self.pages
            .lock()
            .unwrap()
            .entry(feed)
            .or_default()
            .push_back(page);
        self
    }

    pub fn panic_on(&self, feed: FeedKind) {
        self.panic_on.lock().unwrap().insert(feed);
    }

    pub fn calls(&self, feed: FeedKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| *f == feed)
            .map(|(_, date_from)| date_from.clone())
            .collect()
    }
}

#[async_trait]
impl StatsApi for ScriptedStats {
    async fn fetch_page(&self, feed: FeedKind, date_from: &str) -> Result<Vec<RawRecord>, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((feed, date_from.to_string()));
        if self.panic_on.lock().unwrap().contains(&feed) {
            panic!("scripted panic for {feed}");
        }
        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&feed)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Feedback API fake returning the same answer every time.
#[derive(Clone)]
pub struct FixedFeedback {
    answer: Arc<Mutex<Option<FeedbackStatus>>>,
    calls: Arc<Mutex<usize>>,
}

impl FixedFeedback {
    pub fn new(answer: Option<FeedbackStatus>) -> Self {
        Self {
            answer: Arc::new(Mutex::new(answer)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set(&self, answer: Option<FeedbackStatus>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedbackApi for FixedFeedback {
    async fn feedback_status(&self) -> Result<FeedbackStatus, ApiError> {
        *self.calls.lock().unwrap() += 1;
        match *self.answer.lock().unwrap() {
            Some(status) => Ok(status),
            None => Err(ApiError::Upstream {
                text: "scripted failure".into(),
                additional: vec!["try later".into()],
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: Destination,
    pub text: String,
    pub at: Instant,
    pub ok: bool,
}

/// Chat transport recording every attempt; destinations in `failing` error out.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    failing: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingTransport {
    pub fn failing(ids: &[&str]) -> Self {
        let t = Self::default();
        t.failing
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        t
    }

    pub fn attempts(&self) -> Vec<Delivery> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered_texts(&self) -> Vec<String> {
        self.attempts()
            .into_iter()
            .filter(|d| d.ok)
            .map(|d| d.text)
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn deliver(&self, destination: &Destination, text: &str) -> Result<()> {
        let ok = !self.failing.lock().unwrap().contains(&destination.0);
        self.attempts.lock().unwrap().push(Delivery {
            destination: destination.clone(),
            text: text.to_string(),
            at: Instant::now(),
            ok,
        });
        if ok {
            Ok(())
        } else {
            Err(anyhow!("chat {destination} unreachable"))
        }
    }
}
