//! `statwatch run` — watch the source and push changes until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use statwatch::{CategoryNormalizer, ChangeEngine, MetricValue, Numeric, Opaque, ReportStyle};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::acquisition::{HttpClient, StatPageExtractor};
use crate::config::{Delivery, RunArgs, ValueMode, WatchConfig};
use crate::notify::{ChannelId, ConsoleNotifier, Notifier, OpsSink, TelegramNotifier};
use crate::scheduler;
use crate::watcher::Watcher;

/// Deadline for a single Bot API call.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the watch loop.
pub async fn run(args: &RunArgs) -> Result<()> {
    let cfg = WatchConfig::resolve(args).context("invalid configuration")?;
    match cfg.mode {
        ValueMode::Opaque => watch::<Opaque>(cfg).await,
        ValueMode::Numeric => watch::<Numeric>(cfg).await,
    }
}

async fn watch<V: MetricValue>(cfg: WatchConfig) -> Result<()> {
    info!(
        "starting StatWatch v{} ({} values, every {}s)",
        env!("CARGO_PKG_VERSION"),
        V::KIND,
        cfg.period.as_secs()
    );

    let http = HttpClient::new(cfg.source.fetch_timeout).context("failed to build HTTP client")?;
    let extractor =
        StatPageExtractor::new(cfg.source.selectors.clone()).context("invalid page selectors")?;
    let engine = ChangeEngine::<V>::new(
        CategoryNormalizer::with_affixes(cfg.strip_affixes.iter().cloned()),
        ReportStyle {
            title: cfg.title.clone(),
            emphasis: cfg.emphasis,
        },
    );

    let (notifier, destination, ops): (Arc<dyn Notifier>, ChannelId, OpsSink) = match &cfg.delivery
    {
        Delivery::DryRun => (
            Arc::new(ConsoleNotifier) as Arc<dyn Notifier>,
            ChannelId::new("stdout"),
            OpsSink::log_only(),
        ),
        Delivery::Telegram {
            token,
            chat_id,
            error_chat_id,
            api_base,
        } => {
            let bot = TelegramNotifier::connect(token, api_base, NOTIFY_TIMEOUT)
                .await
                .context("failed to init bot")?;
            let bot: Arc<dyn Notifier> = Arc::new(bot);
            let ops = match error_chat_id {
                Some(id) => OpsSink::new(Arc::clone(&bot), id.clone()),
                None => OpsSink::log_only(),
            };
            (bot, chat_id.clone(), ops)
        }
    };

    let mut watcher = Watcher::new(
        engine,
        http,
        cfg.source.url.as_str(),
        Box::new(extractor),
        notifier,
        destination,
    )
    .with_ops(ops);

    // Set up SIGINT handling
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                shutdown_signal.notify_one();
            }
            Err(e) => warn!("cannot listen for shutdown signal: {e}"),
        }
    });

    let cycles = scheduler::run(&mut watcher, cfg.period, shutdown).await;
    info!("StatWatch stopped after {cycles} cycle(s)");
    Ok(())
}
