use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use wb_notifier::config;
use wb_notifier::format;
use wb_notifier::notify::TelegramTransport;
use wb_notifier::scheduler::Scheduler;
use wb_notifier::wb::WbClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Forward new Wildberries orders, buyouts and reviews to Telegram")]
struct Args {
    /// Path to YAML config file; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not send the "monitoring started" message
    #[arg(long)]
    quiet_start: bool,
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

    let client = Arc::new(WbClient::from_config(&cfg).context("failed to build Wildberries client")?);
    let transport = Arc::new(TelegramTransport::new(&cfg.telegram.bot_token));
    let scheduler = Scheduler::from_config(&cfg, client.clone(), client, transport);

    info!(
        destinations = scheduler.dispatcher().destinations().len(),
        "starting wildberries monitoring"
    );

    if !args.quiet_start {
        let banner = format::startup_message(&cfg.app, format::moscow_now());
        let report = scheduler.dispatcher().notify(&banner).await;
        if !report.all_delivered() {
            warn!(failed = report.failed.len(), "startup message not delivered everywhere");
        }
    }

    scheduler
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(?err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("monitoring stopped");
    Ok(())
}
