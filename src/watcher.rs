use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::document::{DocumentSource, MutationObserver};
use crate::extractor::Extractor;
use crate::relay::{ChannelSink, DashboardSink, Relay, WebhookSink};
use crate::scheduler::{ScanCommand, ScanScheduler, ScanStats};
use crate::utils::error::{AppError, Result};

const MUTATION_QUEUE: usize = 64;
const COMMAND_QUEUE: usize = 16;

/// A running observer, scheduler and relay for one document.
pub struct Watcher {
    relay: Arc<Relay>,
    dashboard: DashboardSink,
    events: ChannelSink,
    commands: mpsc::Sender<ScanCommand>,
    observer: JoinHandle<()>,
    scheduler: JoinHandle<ScanStats>,
    relay_task: JoinHandle<()>,
}

impl Watcher {
    pub async fn start(source: Arc<dyn DocumentSource>, config: &AppConfig) -> Result<Self> {
        let extractor = Extractor::new(&config.extractor)?;

        let relay = Arc::new(Relay::new(config.relay.history_capacity));
        let dashboard = DashboardSink::new();
        let events = ChannelSink::new(config.relay.channel_capacity);
        relay.register_sink(Box::new(dashboard.clone())).await;
        relay.register_sink(Box::new(events.clone())).await;
        if let Some(webhook) = WebhookSink::from_config(&config.relay)? {
            relay.register_sink(Box::new(webhook)).await;
        }

        let (relay_tx, relay_rx) = mpsc::channel(config.relay.channel_capacity);
        let (mutation_tx, mutation_rx) = mpsc::channel(MUTATION_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        let relay_task = Arc::clone(&relay).spawn(relay_rx);
        let observer = MutationObserver::new(
            Arc::clone(&source),
            Duration::from_millis(config.watcher.poll_interval_ms),
        )
        .spawn(mutation_tx);

        tracing::info!(
            "Watching {} (poll {}ms, debounce {}ms)",
            source.location(),
            config.watcher.poll_interval_ms,
            config.watcher.debounce_ms
        );
        let scheduler = ScanScheduler::new(
            source,
            extractor,
            relay_tx,
            Duration::from_millis(config.watcher.debounce_ms),
        )
        .spawn(mutation_rx, command_rx);

        Ok(Self {
            relay,
            dashboard,
            events,
            commands: command_tx,
            observer,
            scheduler,
            relay_task,
        })
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    pub fn dashboard(&self) -> DashboardSink {
        self.dashboard.clone()
    }

    pub fn events(&self) -> ChannelSink {
        self.events.clone()
    }

    pub fn commands(&self) -> mpsc::Sender<ScanCommand> {
        self.commands.clone()
    }

    pub async fn rescan(&self) -> Result<()> {
        self.commands
            .send(ScanCommand::Rescan)
            .await
            .map_err(|_| AppError::Internal("scan scheduler has stopped".to_string()))
    }

    /// Stop scanning, let the relay drain what is already queued, and return
    /// the scheduler's counters.
    pub async fn shutdown(self) -> Result<ScanStats> {
        // An error here means the scheduler already stopped on its own.
        let _ = self.commands.send(ScanCommand::Shutdown).await;

        let stats = self
            .scheduler
            .await
            .map_err(|e| AppError::Internal(format!("scan scheduler task failed: {}", e)))?;
        self.observer.abort();
        self.relay_task
            .await
            .map_err(|e| AppError::Internal(format!("relay task failed: {}", e)))?;

        Ok(stats)
    }
}
