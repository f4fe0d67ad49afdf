use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{format_date_from, FeedKind, FeedbackStatus, RawRecord};
use crate::wb::model::FeedbackEnvelope;

pub mod model;

const FEEDBACK_PATH: &str = "api/v1/new-feedbacks-questions";
const USER_AGENT: &str = "wb-notifier/0.1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upstream reported an error: {text}")]
    Upstream { text: String, additional: Vec<String> },
    #[error("invalid URL: {0}")]
    Url(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_timeout())
    }

    /// Emit the standard warning for a failed upstream call.
    pub fn log(&self, what: &str) {
        if self.is_timeout() {
            warn!(error = %self, "{what}: request timed out");
        } else if self.is_unauthorized() {
            warn!(error = %self, "{what}: unauthorized, the API token may be expired or wrong");
        } else {
            warn!(error = %self, "{what} failed");
        }
    }
}

/// Paginated statistics endpoints (orders, sales).
#[async_trait]
pub trait StatsApi: Send + Sync {
    async fn fetch_page(&self, feed: FeedKind, date_from: &str) -> Result<Vec<RawRecord>, ApiError>;
}

/// Feedback/questions flag endpoint.
#[async_trait]
pub trait FeedbackApi: Send + Sync {
    async fn feedback_status(&self) -> Result<FeedbackStatus, ApiError>;
}

#[derive(Clone)]
pub struct WbClient {
    http: Client,
    stats_base: Url,
    feedback_base: Url,
    stats_token: String,
    feedback_token: String,
}

impl fmt::Debug for WbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WbClient")
            .field("stats_base", &self.stats_base)
            .field("feedback_base", &self.feedback_base)
            .finish_non_exhaustive()
    }
}

/// Outcome of a single health request against one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStatus {
    pub ok: bool,
    pub code: Option<u16>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiProbe {
    pub statistics: EndpointStatus,
    pub feedback: EndpointStatus,
}

impl WbClient {
    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        Self::new(
            &cfg.wildberries.stats_base_url,
            &cfg.wildberries.feedback_base_url,
            cfg.wildberries.stats_token.clone(),
            cfg.wildberries.feedback_token.clone(),
            cfg.app.request_timeout(),
        )
    }

    pub fn new(
        stats_base: &str,
        feedback_base: &str,
        stats_token: String,
        feedback_token: String,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            stats_base: parse_base(stats_base)?,
            feedback_base: parse_base(feedback_base)?,
            stats_token,
            feedback_token,
        })
    }

    pub fn build_page_request(&self, feed: FeedKind, date_from: &str) -> Result<reqwest::Request, ApiError> {
        let url = self
            .stats_base
            .join(feed.path())
            .map_err(|e| ApiError::Url(e.to_string()))?;
        Ok(self
            .http
            .get(url)
            .header("Authorization", &self.stats_token)
            .query(&[("dateFrom", date_from), ("flag", "0")])
            .build()?)
    }

    pub fn build_feedback_request(&self) -> Result<reqwest::Request, ApiError> {
        let url = self
            .feedback_base
            .join(FEEDBACK_PATH)
            .map_err(|e| ApiError::Url(e.to_string()))?;
        Ok(self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.feedback_token))
            .build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<String, ApiError> {
        debug!(url = %request.url(), "wb request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(res.text().await?)
    }

    /// One lightweight request per endpoint, timed. Never fails; errors are
    /// folded into the returned statuses.
    pub async fn probe(&self) -> ApiProbe {
        let started = Instant::now();
        let date_from = format_date_from(Utc::now() - chrono::Duration::hours(1));
        let stats = self.fetch_page(FeedKind::Orders, &date_from).await;
        let statistics = endpoint_status(stats.map(|_| ()), started.elapsed());

        let started = Instant::now();
        let fb = self.feedback_status().await;
        let feedback = endpoint_status(fb.map(|_| ()), started.elapsed());

        ApiProbe { statistics, feedback }
    }
}

fn parse_base(raw: &str) -> Result<Url, ApiError> {
    // `Url::join` drops the last path segment unless the base ends with '/'.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ApiError::Url(e.to_string()))
}

fn endpoint_status(result: Result<(), ApiError>, elapsed: Duration) -> EndpointStatus {
    match result {
        Ok(()) => EndpointStatus {
            ok: true,
            code: Some(200),
            elapsed,
            error: None,
        },
        Err(ApiError::Status { status, .. }) => EndpointStatus {
            ok: false,
            code: Some(status.as_u16()),
            elapsed,
            error: None,
        },
        Err(err @ ApiError::Upstream { .. }) | Err(err @ ApiError::Decode(_)) => EndpointStatus {
            ok: false,
            code: Some(200),
            elapsed,
            error: Some(err.to_string()),
        },
        Err(err) => EndpointStatus {
            ok: false,
            code: None,
            elapsed,
            error: Some(err.to_string()),
        },
    }
}

#[async_trait]
impl StatsApi for WbClient {
    async fn fetch_page(&self, feed: FeedKind, date_from: &str) -> Result<Vec<RawRecord>, ApiError> {
        let request = self.build_page_request(feed, date_from)?;
        let body = self.execute(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FeedbackApi for WbClient {
    async fn feedback_status(&self) -> Result<FeedbackStatus, ApiError> {
        let request = self.build_feedback_request()?;
        let body = self.execute(request).await?;
        let envelope: FeedbackEnvelope = serde_json::from_str(&body)?;
        if envelope.error {
            return Err(ApiError::Upstream {
                text: envelope.error_text.unwrap_or_default(),
                additional: envelope.additional_errors.unwrap_or_default(),
            });
        }
        Ok(envelope.data.unwrap_or_default().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WbClient {
        WbClient::new(
            &server.uri(),
            &server.uri(),
            "stats-token".into(),
            "fb-token".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn page_request_carries_query_and_raw_token() {
        let client = WbClient::new(
            "https://stats.example/",
            "https://fb.example",
            "stats-token".into(),
            "fb-token".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let req = client
            .build_page_request(FeedKind::Sales, "2024-01-01T00:00:00.000Z")
            .unwrap();
        assert_eq!(req.method(), reqwest::Method::GET);
        assert_eq!(req.url().path(), "/api/v1/supplier/sales");
        let query: Vec<(String, String)> = req.url().query_pairs().into_owned().collect();
        assert!(query.contains(&("dateFrom".into(), "2024-01-01T00:00:00.000Z".into())));
        assert!(query.contains(&("flag".into(), "0".into())));
        assert_eq!(
            req.headers().get("Authorization").and_then(|h| h.to_str().ok()),
            Some("stats-token")
        );

        let req = client.build_feedback_request().unwrap();
        assert_eq!(req.url().as_str(), "https://fb.example/api/v1/new-feedbacks-questions");
        assert_eq!(
            req.headers().get("Authorization").and_then(|h| h.to_str().ok()),
            Some("Bearer fb-token")
        );
    }

    #[tokio::test]
    async fn fetch_page_decodes_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/supplier/orders"))
            .and(query_param("dateFrom", "2024-01-01T00:00:00.000Z"))
            .and(header("Authorization", "stats-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "srid": "a", "lastChangeDate": "2024-01-01T01:00:00" },
                { "srid": "b", "lastChangeDate": "2024-01-01T02:00:00" }
            ])))
            .mount(&server)
            .await;

        let records = client_for(&server)
            .fetch_page(FeedKind::Orders, "2024-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text("srid").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/supplier/sales"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(FeedKind::Sales, "2024-01-01T00:00:00.000Z")
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        match err {
            ApiError::Status { body, .. } => assert_eq!(body, "bad token"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn feedback_flags_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/new-feedbacks-questions"))
            .and(header("Authorization", "Bearer fb-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "hasNewQuestions": true, "hasNewFeedbacks": false, "questionsCount": 3 },
                "error": false,
                "errorText": "",
                "additionalErrors": null
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).feedback_status().await.unwrap();
        assert!(status.has_new_questions);
        assert!(!status.has_new_feedbacks);
        assert_eq!(status.questions_count, 3);
        assert_eq!(status.feedbacks_count, 0);
    }

    #[tokio::test]
    async fn feedback_error_flag_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/new-feedbacks-questions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "error": true,
                "errorText": "access denied",
                "additionalErrors": ["scope missing"]
            })))
            .mount(&server)
            .await;

        match client_for(&server).feedback_status().await.unwrap_err() {
            ApiError::Upstream { text, additional } => {
                assert_eq!(text, "access denied");
                assert_eq!(additional, vec!["scope missing".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_reports_each_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/supplier/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/new-feedbacks-questions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = client_for(&server).probe().await;
        assert!(probe.statistics.ok);
        assert_eq!(probe.statistics.code, Some(200));
        assert!(!probe.feedback.ok);
        assert_eq!(probe.feedback.code, Some(503));
    }
}
