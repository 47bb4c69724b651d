mod channel;
mod dashboard;
mod webhook;

use async_trait::async_trait;

use super::events::RelayMessage;
use crate::utils::error::Result;

pub use channel::ChannelSink;
pub use dashboard::DashboardSink;
pub use webhook::WebhookSink;

/// A destination for relayed messages (debug display, companion surface, ...).
#[async_trait]
pub trait RelaySink: Send + Sync {
    fn name(&self) -> &str;

    /// At most one attempt per message from the relay's side; a sink may retry
    /// internally before giving up.
    async fn deliver(&self, message: &RelayMessage) -> Result<()>;
}
