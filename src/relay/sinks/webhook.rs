use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use url::Url;

use super::RelaySink;
use crate::config::RelayConfig;
use crate::relay::events::RelayMessage;
use crate::utils::error::{AppError, Result};

/// Posts every message as JSON to a companion surface running elsewhere.
pub struct WebhookSink {
    client: Client,
    url: Url,
    retry_delay: Duration,
}

impl WebhookSink {
    pub fn new(url: Url, config: &RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Option<Self>> {
        match &config.webhook_url {
            Some(raw) => Ok(Some(Self::new(Url::parse(raw)?, config)?)),
            None => Ok(None),
        }
    }

    async fn post(&self, message: &RelayMessage) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RelaySink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        // One retry, then give up; the next scan delivers again.
        let strategy = FixedInterval::new(self.retry_delay).take(1);

        Retry::spawn(strategy, || self.post(message))
            .await
            .map_err(|e| AppError::Delivery {
                sink: self.name().to_string(),
                message: e.to_string(),
            })
    }
}
