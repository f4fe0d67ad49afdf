use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use wb_notifier::config;
use wb_notifier::format;
use wb_notifier::model::DomainEvent;
use wb_notifier::notify::{NotificationDispatcher, TelegramTransport};
use wb_notifier::scheduler::Scheduler;
use wb_notifier::wb::WbClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Operator checks for the Wildberries notifier")]
struct Args {
    /// Path to YAML config file; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe both Wildberries APIs and print a status report
    Status {
        /// Also send the report to the configured chats
        #[arg(long)]
        notify: bool,
    },
    /// Send a sample notification to the configured chats
    Sample {
        #[arg(value_enum)]
        kind: SampleKind,
    },
    /// Run one check of orders, feedback and sales, then exit.
    /// The first check of a feed only records existing items.
    CheckOnce,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SampleKind {
    Order,
    Sale,
    Feedback,
}

fn sample_message(kind: SampleKind) -> Option<String> {
    let message = match kind {
        SampleKind::Order => format::event_message(&DomainEvent::Order(format::sample_order())),
        SampleKind::Sale => format::event_message(&DomainEvent::Sale(format::sample_sale())),
        SampleKind::Feedback => format::feedback_message(&format::sample_feedback())?,
    };
    Some(format::mark_as_test(&message))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;
    let client = Arc::new(WbClient::from_config(&cfg)?);

    match args.command {
        Command::Status { notify } => {
            info!(
                stats_token = %token_hint(&cfg.wildberries.stats_token),
                feedback_token = %token_hint(&cfg.wildberries.feedback_token),
                "probing APIs"
            );
            let probe = client.probe().await;
            let report = format::status_message(&probe, &cfg.app, format::moscow_now());
            println!("{report}");
            if notify {
                let transport = Arc::new(TelegramTransport::new(&cfg.telegram.bot_token));
                let dispatcher =
                    NotificationDispatcher::from_config(transport, &cfg.telegram.chat_ids, &cfg.app);
                dispatcher.notify(&report).await;
            }
        }
        Command::Sample { kind } => {
            let Some(message) = sample_message(kind) else {
                bail!("sample {kind:?} produced no message");
            };
            let transport = Arc::new(TelegramTransport::new(&cfg.telegram.bot_token));
            let dispatcher =
                NotificationDispatcher::from_config(transport, &cfg.telegram.chat_ids, &cfg.app);
            let report = dispatcher.notify(&message).await;
            info!(
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "sample sent"
            );
            if report.delivered.is_empty() {
                bail!("sample notification was not delivered to any chat");
            }
        }
        Command::CheckOnce => {
            let transport = Arc::new(TelegramTransport::new(&cfg.telegram.bot_token));
            let mut scheduler = Scheduler::from_config(&cfg, client.clone(), client, transport);
            for outcome in scheduler.run_once().await {
                info!(feed = %outcome.feed, notified = ?outcome.notified, "check finished");
            }
        }
    }

    Ok(())
}

fn token_hint(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}…")
}
