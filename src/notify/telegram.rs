use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::adaptors::throttle::{Limits, Throttle};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};

use super::{ChatTransport, Destination};

/// Telegram delivery through a rate-limited bot.
pub struct TelegramTransport {
    bot: Throttle<Bot>,
}

impl TelegramTransport {
    /// Must be called inside a tokio runtime (the throttle worker is spawned).
    pub fn new(token: &str) -> Self {
        let bot = Bot::new(token).throttle(Limits::default());
        Self { bot }
    }
}

/// Numeric ids go to `ChatId`, anything else is taken as a channel username.
pub fn recipient(destination: &Destination) -> Recipient {
    let raw = destination.0.trim();
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = if raw.starts_with('@') {
                raw.to_string()
            } else {
                format!("@{raw}")
            };
            Recipient::ChannelUsername(name)
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn deliver(&self, destination: &Destination, text: &str) -> Result<()> {
        self.bot
            .send_message(recipient(destination), text)
            .parse_mode(ParseMode::Html)
            .await
            .with_context(|| format!("telegram send_message to {destination}"))?;
        Ok(())
    }
}
