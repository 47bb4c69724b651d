use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::RelaySink;
use crate::relay::events::RelayMessage;
use crate::utils::error::Result;

const WAITING: &str = "In attesa di una scansione";

/// Debug display: keeps a one-line status of the latest relayed message.
#[derive(Clone)]
pub struct DashboardSink {
    status: Arc<RwLock<String>>,
}

impl Default for DashboardSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardSink {
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(WAITING.to_string())),
        }
    }

    pub async fn status(&self) -> String {
        self.status.read().await.clone()
    }

    pub fn status_line(message: &RelayMessage) -> Option<String> {
        match message {
            RelayMessage::Broadcast(event) => Some(format!("Imponibile: {}", event.imponibile)),
            RelayMessage::Debug(event) => {
                let value = event
                    .value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "—".to_string());
                Some(format!("Scan: {} | nodi: {}", value, event.examined))
            }
            RelayMessage::Update(_) => None,
        }
    }
}

#[async_trait]
impl RelaySink for DashboardSink {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        if let Some(line) = Self::status_line(message) {
            tracing::debug!(target: "provv_watcher::dashboard", "{}", line);
            *self.status.write().await = line;
        }
        Ok(())
    }
}
