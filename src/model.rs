use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Format expected by the statistics API for `dateFrom`.
pub const DATE_FROM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Upstream field carrying the change timestamp used to advance pagination.
pub const CHANGE_DATE_FIELD: &str = "lastChangeDate";

const UPSTREAM_DATE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// One record as returned by the statistics API. Only the identifier and the
/// change timestamp are interpreted; everything else is passed through to the
/// message formatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// String view of a field. Numbers are rendered as-is, null and missing
    /// fields yield `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn change_date(&self) -> Option<String> {
        self.text(CHANGE_DATE_FIELD)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for RawRecord {
    fn from(fields: [(&str, Value); N]) -> Self {
        RawRecord(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Upstream feeds with item-level identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Orders,
    Sales,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Orders => "orders",
            FeedKind::Sales => "sales",
        }
    }

    /// Field that uniquely identifies a record of this feed.
    pub fn id_field(&self) -> &'static str {
        match self {
            FeedKind::Orders => "srid",
            FeedKind::Sales => "saleID",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            FeedKind::Orders => "api/v1/supplier/orders",
            FeedKind::Sales => "api/v1/supplier/sales",
        }
    }

    pub fn event(&self, record: RawRecord) -> DomainEvent {
        match self {
            FeedKind::Orders => DomainEvent::Order(record),
            FeedKind::Sales => DomainEvent::Sale(record),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Order(RawRecord),
    Sale(RawRecord),
}

impl DomainEvent {
    pub fn kind(&self) -> FeedKind {
        match self {
            DomainEvent::Order(_) => FeedKind::Orders,
            DomainEvent::Sale(_) => FeedKind::Sales,
        }
    }

    pub fn record(&self) -> &RawRecord {
        match self {
            DomainEvent::Order(r) | DomainEvent::Sale(r) => r,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.record().text(self.kind().id_field())
    }
}

/// Point-in-time snapshot of the feedback/questions flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStatus {
    pub has_new_feedbacks: bool,
    pub has_new_questions: bool,
    pub feedbacks_count: i64,
    pub questions_count: i64,
}

impl FeedbackStatus {
    pub fn has_news(&self) -> bool {
        self.has_new_feedbacks || self.has_new_questions
    }
}

/// Render a watermark the way `dateFrom` expects it.
pub fn format_date_from(ts: DateTime<Utc>) -> String {
    ts.format(DATE_FROM_FORMAT).to_string()
}

/// Parse an upstream timestamp, accepting the handful of shapes the API emits.
pub fn try_parse_upstream_date(raw: &str) -> Option<NaiveDateTime> {
    UPSTREAM_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Like [`try_parse_upstream_date`] but never fails: unknown formats fall back
/// to the current time with a warning.
pub fn parse_upstream_date(raw: &str) -> NaiveDateTime {
    match try_parse_upstream_date(raw) {
        Some(dt) => dt,
        None => {
            warn!(date = raw, "unsupported date format; using current time");
            Utc::now().naive_utc()
        }
    }
}
