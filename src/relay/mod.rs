pub mod events;
pub mod sinks;

use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

pub use events::{BroadcastEvent, InboundMessage, RelayMessage, ScanEvent, UpdateEvent};
pub use sinks::{ChannelSink, DashboardSink, RelaySink, WebhookSink};

pub type RelaySinkBox = Box<dyn RelaySink>;

/// The most recently extracted value. Starts empty; only the relay writes it.
pub struct LastKnown {
    tx: watch::Sender<Option<f64>>,
}

impl Default for LastKnown {
    fn default() -> Self {
        Self::new()
    }
}

impl LastKnown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn get(&self) -> Option<f64> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.tx.subscribe()
    }

    fn set(&self, value: f64) {
        self.tx.send_replace(Some(value));
    }
}

/// Receives scan and update events and forwards them to every registered sink.
pub struct Relay {
    last_known: LastKnown,
    scans: RwLock<VecDeque<ScanEvent>>,
    history_capacity: usize,
    sinks: RwLock<Vec<RelaySinkBox>>,
}

impl Relay {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            last_known: LastKnown::new(),
            scans: RwLock::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register_sink(&self, sink: RelaySinkBox) {
        tracing::debug!("Registered relay sink: {}", sink.name());
        self.sinks.write().await.push(sink);
    }

    pub async fn sink_names(&self) -> Vec<String> {
        let sinks = self.sinks.read().await;
        sinks.iter().map(|sink| sink.name().to_string()).collect()
    }

    pub fn last_known(&self) -> Option<f64> {
        self.last_known.get()
    }

    pub fn subscribe_last_known(&self) -> watch::Receiver<Option<f64>> {
        self.last_known.subscribe()
    }

    /// Scan log, newest first.
    pub async fn recent_scans(&self) -> Vec<ScanEvent> {
        let scans = self.scans.read().await;
        scans.iter().rev().cloned().collect()
    }

    /// Handle one inbound message. Never fails: sink errors are logged and the
    /// message is dropped for that sink.
    pub async fn handle(&self, message: RelayMessage) {
        match message {
            RelayMessage::Debug(event) => {
                self.record_scan(event.clone()).await;
                self.fan_out(&RelayMessage::Debug(event)).await;
            }
            RelayMessage::Update(update) => {
                self.last_known.set(update.imponibile);
                let broadcast = BroadcastEvent {
                    imponibile: update.imponibile,
                };
                self.fan_out(&RelayMessage::Broadcast(broadcast)).await;
            }
            RelayMessage::Broadcast(broadcast) => {
                self.fan_out(&RelayMessage::Broadcast(broadcast)).await;
            }
        }
    }

    pub fn spawn(self: Arc<Self>, messages: mpsc::Receiver<RelayMessage>) -> JoinHandle<()> {
        tokio::spawn(self.run(messages))
    }

    pub async fn run(self: Arc<Self>, mut messages: mpsc::Receiver<RelayMessage>) {
        while let Some(message) = messages.recv().await {
            self.handle(message).await;
        }
        tracing::debug!("Relay stopped");
    }

    async fn record_scan(&self, event: ScanEvent) {
        let mut scans = self.scans.write().await;
        while scans.len() >= self.history_capacity {
            scans.pop_front();
        }
        scans.push_back(event);
    }

    async fn fan_out(&self, message: &RelayMessage) {
        let sinks = self.sinks.read().await;
        let deliveries = sinks.iter().map(|sink| async move {
            (sink.name(), sink.deliver(message).await)
        });

        for (name, result) in join_all(deliveries).await {
            if let Err(e) = result {
                tracing::debug!("Dropped {} for sink {}: {}", message.kind(), name, e);
            }
        }
    }
}
