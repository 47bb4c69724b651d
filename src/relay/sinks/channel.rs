use async_trait::async_trait;
use tokio::sync::broadcast;

use super::RelaySink;
use crate::relay::events::RelayMessage;
use crate::utils::error::Result;

/// In-process fan-out; every subscriber gets its own copy of each message.
#[derive(Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<RelayMessage>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl RelaySink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        // No subscribers is not a failure; nobody is listening yet.
        let _ = self.tx.send(message.clone());
        Ok(())
    }
}
