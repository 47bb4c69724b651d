use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::WatcherConfig;
use crate::utils::error::{AppError, Result};

/// The page as it looked at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Content fingerprint used to notice that the page re-rendered.
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.html.hash(&mut hasher);
        hasher.finish()
    }
}

/// A document that can be read repeatedly while it changes underneath.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Address reported alongside every scan.
    fn location(&self) -> String;

    async fn snapshot(&self) -> Result<PageSnapshot>;
}

/// Polls a page over HTTP.
pub struct HttpSource {
    url: Url,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: Url, config: &WatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    fn location(&self) -> String {
        self.url.to_string()
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        let response = self.client.get(self.url.clone()).send().await?;
        let response = response.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;
        Ok(PageSnapshot::new(final_url, html))
    }
}

/// Reads a saved page from disk; the file may be rewritten at any time.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    fn location(&self) -> String {
        std::fs::canonicalize(&self.path)
            .ok()
            .and_then(|absolute| Url::from_file_path(absolute).ok())
            .map(|url| url.to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Pages saved from legacy back-office screens are often windows-1252;
    /// bytes that are not UTF-8 are replaced rather than failing the read.
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Document(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let html = String::from_utf8_lossy(&bytes).into_owned();
        Ok(PageSnapshot::new(self.location(), html))
    }
}

/// In-memory document, rewritten by whoever embeds the watcher.
#[derive(Clone)]
pub struct StaticSource {
    location: String,
    html: Arc<RwLock<String>>,
}

impl StaticSource {
    pub fn new(location: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            html: Arc::new(RwLock::new(html.into())),
        }
    }

    pub async fn set_html(&self, html: impl Into<String>) {
        *self.html.write().await = html.into();
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    fn location(&self) -> String {
        self.location.clone()
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        let html = self.html.read().await.clone();
        Ok(PageSnapshot::new(self.location.clone(), html))
    }
}

/// Pick a source for a CLI/config argument: http(s) URLs are fetched,
/// anything else is a file path.
pub fn source_for(location: &str, config: &WatcherConfig) -> Result<Arc<dyn DocumentSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location)?;
        Ok(Arc::new(HttpSource::new(url, config)?))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(Arc::new(FileSource::new(path)))
    }
}

/// Notification that the watched document changed, carrying the page as the
/// observer read it so the scan does not fetch it a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub digest: u64,
    pub observed_at: DateTime<Utc>,
    pub page: PageSnapshot,
}

/// Turns a pollable source into a stream of change notifications.
pub struct MutationObserver {
    source: Arc<dyn DocumentSource>,
    interval: Duration,
}

impl MutationObserver {
    pub fn new(source: Arc<dyn DocumentSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn spawn(self, mutations: mpsc::Sender<Mutation>) -> JoinHandle<()> {
        tokio::spawn(self.run(mutations))
    }

    /// Poll until the receiving side goes away. The first successful read only
    /// sets the baseline.
    pub async fn run(self, mutations: mpsc::Sender<Mutation>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_digest: Option<u64> = None;

        loop {
            ticker.tick().await;
            if mutations.is_closed() {
                break;
            }

            let page = match self.source.snapshot().await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!("Observer could not read {}: {}", self.source.location(), e);
                    continue;
                }
            };

            let digest = page.digest();
            let changed = last_digest.is_some_and(|previous| previous != digest);
            last_digest = Some(digest);

            if changed {
                let mutation = Mutation {
                    digest,
                    observed_at: Utc::now(),
                    page,
                };
                if mutations.send(mutation).await.is_err() {
                    break;
                }
            }
        }

        tracing::debug!("Mutation observer for {} stopped", self.source.location());
    }
}
