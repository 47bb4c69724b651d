use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::document::{DocumentSource, Mutation, PageSnapshot};
use crate::extractor::{ExtractionResult, Extractor};
use crate::relay::{InboundMessage, RelayMessage, ScanEvent, UpdateEvent};
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    ScanScheduled,
    Scanning,
}

/// Debounce bookkeeping. There is exactly one pending deadline and every
/// mutation replaces it.
#[derive(Debug, Clone)]
pub struct RescanTrigger {
    state: ScanState,
    deadline: Option<Instant>,
    debounce: Duration,
}

impl RescanTrigger {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: ScanState::Idle,
            deadline: None,
            debounce,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_mutation(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
        self.state = ScanState::ScanScheduled;
    }

    /// The debounce window closed: consume the deadline and start scanning.
    pub fn fire(&mut self) {
        self.deadline = None;
        self.state = ScanState::Scanning;
    }

    /// Explicit rescan. A pending deadline is left alone and still fires.
    pub fn force(&mut self) {
        self.state = ScanState::Scanning;
    }

    pub fn finish(&mut self) {
        self.state = if self.deadline.is_some() {
            ScanState::ScanScheduled
        } else {
            ScanState::Idle
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    Rescan,
    Shutdown,
}

impl From<InboundMessage> for ScanCommand {
    fn from(message: InboundMessage) -> Self {
        match message {
            InboundMessage::Rescan => ScanCommand::Rescan,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub scans: u64,
    pub found: u64,
    pub fallbacks: u64,
    pub failed_reads: u64,
    pub forced: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Read the source once and extract from it. The parsed tree never outlives
/// this call.
pub async fn scan_source(
    source: &dyn DocumentSource,
    extractor: &Extractor,
) -> Result<(String, ExtractionResult)> {
    let page = source.snapshot().await?;
    let result = extractor.extract(&page.html);
    Ok((page.url, result))
}

/// Runs extraction whenever the watched document settles after a burst of
/// mutations, or immediately on request.
pub struct ScanScheduler {
    source: Arc<dyn DocumentSource>,
    extractor: Extractor,
    relay: mpsc::Sender<RelayMessage>,
    trigger: RescanTrigger,
    /// Latest page the observer saw since the last scan.
    observed: Option<PageSnapshot>,
    stats: ScanStats,
}

impl ScanScheduler {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        extractor: Extractor,
        relay: mpsc::Sender<RelayMessage>,
        debounce: Duration,
    ) -> Self {
        Self {
            source,
            extractor,
            relay,
            trigger: RescanTrigger::new(debounce),
            observed: None,
            stats: ScanStats::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.trigger.state()
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn spawn(
        self,
        mutations: mpsc::Receiver<Mutation>,
        commands: mpsc::Receiver<ScanCommand>,
    ) -> JoinHandle<ScanStats> {
        tokio::spawn(self.run(mutations, commands))
    }

    /// Scan once on start, then loop until shutdown or until every input is gone.
    pub async fn run(
        mut self,
        mut mutations: mpsc::Receiver<Mutation>,
        mut commands: mpsc::Receiver<ScanCommand>,
    ) -> ScanStats {
        tracing::info!("Scan scheduler started for {}", self.source.location());

        self.trigger.force();
        self.run_scan().await;
        self.trigger.finish();

        let mut mutations_open = true;
        let mut commands_open = true;

        loop {
            let deadline = self.trigger.deadline();

            tokio::select! {
                mutation = mutations.recv(), if mutations_open => match mutation {
                    Some(mutation) => {
                        tracing::trace!("Mutation {:x} observed, rescan pending", mutation.digest);
                        self.observed = Some(mutation.page);
                        self.trigger.on_mutation(Instant::now());
                    }
                    None => mutations_open = false,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(ScanCommand::Rescan) => {
                        tracing::debug!("Forced rescan requested");
                        self.stats.forced += 1;
                        self.trigger.force();
                        // A fresh read supersedes what the observer saw; a
                        // pending deadline then re-reads the source.
                        self.observed = None;
                        self.run_scan().await;
                        self.trigger.finish();
                    }
                    Some(ScanCommand::Shutdown) => break,
                    None => commands_open = false,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.trigger.fire();
                    match self.observed.take() {
                        Some(page) => {
                            self.scan_observed(page);
                        }
                        None => {
                            self.run_scan().await;
                        }
                    }
                    self.trigger.finish();
                }
                else => break,
            }
        }

        tracing::info!(
            "Scan scheduler stopped after {} scans ({} with a value)",
            self.stats.scans,
            self.stats.found
        );
        self.stats
    }

    /// One complete scan of a fresh read. A document that cannot be read is
    /// logged and reported as an empty result; the loop keeps going.
    pub async fn run_scan(&mut self) -> ExtractionResult {
        let scanned = scan_source(self.source.as_ref(), &self.extractor).await;
        self.complete_scan(scanned)
    }

    /// Scan the page exactly as the observer read it.
    pub fn scan_observed(&mut self, page: PageSnapshot) -> ExtractionResult {
        let result = self.extractor.extract(&page.html);
        self.complete_scan(Ok((page.url, result)))
    }

    fn complete_scan(&mut self, scanned: Result<(String, ExtractionResult)>) -> ExtractionResult {
        let (url, result) = match scanned {
            Ok(scanned) => scanned,
            Err(e) => {
                tracing::warn!("Scan of {} failed: {}", self.source.location(), e);
                self.stats.failed_reads += 1;
                (self.source.location(), ExtractionResult::nothing(0))
            }
        };

        self.stats.scans += 1;
        self.stats.last_scan = Some(Utc::now());
        if result.is_found() {
            self.stats.found += 1;
        }
        if result.is_fallback() {
            self.stats.fallbacks += 1;
        }

        tracing::info!(
            "Scan: imponibile={:?} label={:?} score={:?} nodes={} url={}",
            result.value,
            result.label_text(),
            result.score,
            result.examined,
            url
        );

        self.emit(RelayMessage::Debug(ScanEvent::from_result(&result, url)));
        if let Some(update) = UpdateEvent::from_result(&result) {
            self.emit(RelayMessage::Update(update));
        }

        result
    }

    fn emit(&self, message: RelayMessage) {
        if let Err(e) = self.relay.try_send(message) {
            tracing::debug!("Relay unavailable, dropped message: {}", e);
        }
    }
}
