use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::App;

pub mod telegram;

pub use telegram::TelegramTransport;

const ELLIPSIS: char = '…';

/// Opaque chat target (numeric chat id or `@channel`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub String);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Destination(s.to_string())
    }
}

/// Outbound chat delivery, one call per destination per message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, destination: &Destination, text: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<Destination>,
    pub failed: Vec<(Destination, String)>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends every message to every destination, pacing consecutive sends and
/// keeping one destination's failure away from the others.
pub struct NotificationDispatcher {
    transport: Arc<dyn ChatTransport>,
    destinations: Vec<Destination>,
    send_pacing: Duration,
    event_pacing: Duration,
    max_len: usize,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        destinations: Vec<Destination>,
        send_pacing: Duration,
        event_pacing: Duration,
        max_len: usize,
    ) -> Self {
        Self {
            transport,
            destinations,
            send_pacing,
            event_pacing,
            max_len,
        }
    }

    pub fn from_config(transport: Arc<dyn ChatTransport>, chat_ids: &[String], app: &App) -> Self {
        let destinations = chat_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(Destination::from)
            .collect();
        Self::new(
            transport,
            destinations,
            app.send_pacing(),
            app.event_pacing(),
            app.max_message_len,
        )
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    #[instrument(skip_all, fields(destinations = self.destinations.len()))]
    pub async fn notify(&self, message: &str) -> DeliveryReport {
        let text = truncate_message(message, self.max_len);
        if text != message {
            warn!(len = message.chars().count(), max = self.max_len, "message truncated");
        }

        let mut report = DeliveryReport::default();
        for (i, destination) in self.destinations.iter().enumerate() {
            if i > 0 && !self.send_pacing.is_zero() {
                tokio::time::sleep(self.send_pacing).await;
            }
            match self.transport.deliver(destination, &text).await {
                Ok(()) => {
                    info!(%destination, "notification delivered");
                    report.delivered.push(destination.clone());
                }
                Err(err) => {
                    warn!(%destination, error = %err, "notification delivery failed");
                    report.failed.push((destination.clone(), err.to_string()));
                }
            }
        }
        report
    }

    /// Delivers a burst of messages, leaving `event_pacing` between them.
    pub async fn notify_all(&self, messages: &[String]) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(messages.len());
        for (i, message) in messages.iter().enumerate() {
            if i > 0 && !self.event_pacing.is_zero() {
                tokio::time::sleep(self.event_pacing).await;
            }
            reports.push(self.notify(message).await);
        }
        reports
    }
}

/// Cuts the HTML `text` to at most `max_chars` characters, ending with an
/// ellipsis when anything was dropped.
///
/// The cut never lands inside a tag or an entity, and tags left open by the
/// cut are closed after the ellipsis.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut budget = max_chars.saturating_sub(1);
    loop {
        let head = markup_safe_prefix(text, budget);
        let mut out = head.to_string();
        out.push(ELLIPSIS);
        for tag in open_tags(head).iter().rev() {
            out.push_str(&format!("</{tag}>"));
        }
        let len = out.chars().count();
        if len <= max_chars || head.is_empty() {
            return out;
        }
        budget = budget.saturating_sub(len - max_chars);
    }
}

/// Longest prefix of at most `max_chars` characters not ending inside a tag
/// or an entity.
fn markup_safe_prefix(text: &str, max_chars: usize) -> &str {
    let end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(i, _)| i);
    let mut head = &text[..end];
    if let Some(lt) = head.rfind('<') {
        if !head[lt..].contains('>') {
            head = &head[..lt];
        }
    }
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') {
            head = &head[..amp];
        }
    }
    head
}

/// Tags opened in `html` and still open at its end, outermost first.
fn open_tags(html: &str) -> Vec<&str> {
    let mut stack: Vec<&str> = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let body = &rest[start + 1..start + len];
        rest = &rest[start + len + 1..];
        if let Some(name) = body.strip_prefix('/') {
            if let Some(pos) = stack.iter().rposition(|open| *open == name.trim()) {
                stack.truncate(pos);
            }
        } else if !body.ends_with('/') {
            stack.push(body.split_whitespace().next().unwrap_or(body));
        }
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_message("hello", 5), "hello");
    }

    #[test]
    fn long_messages_are_cut_on_char_boundary() {
        let cut = truncate_message("привет мир", 5);
        assert_eq!(cut.chars().count(), 5);
        assert_eq!(cut, "прив…");
    }

    #[test]
    fn cut_backs_off_from_partial_entity() {
        assert_eq!(truncate_message("a &amp; b", 5), "a …");
    }

    #[test]
    fn cut_closes_open_tags_within_the_cap() {
        let cut = truncate_message("<b>Новый заказ!</b>\n\nАртикул: X", 12);
        assert_eq!(cut, "<b>Новы…</b>");
        assert!(cut.chars().count() <= 12);
    }

    #[test]
    fn cut_never_splits_a_closing_tag() {
        let cut = truncate_message("<i>ab</i>cdef", 8);
        assert_eq!(cut, "<i>…</i>");
    }

    #[test]
    fn from_config_skips_blank_ids() {
        struct Noop;
        #[async_trait]
        impl ChatTransport for Noop {
            async fn deliver(&self, _: &Destination, _: &str) -> Result<()> {
                Ok(())
            }
        }
        let dispatcher = NotificationDispatcher::from_config(
            Arc::new(Noop),
            &["1".into(), " ".into(), "@chan".into()],
            &App::default(),
        );
        assert_eq!(
            dispatcher.destinations(),
            &[Destination::from("1"), Destination::from("@chan")]
        );
    }
}
