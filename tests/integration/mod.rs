// Integration tests for Provv Watcher
// These tests drive the HTTP surface and a running watcher end to end

pub mod api_tests;
pub mod calculator_tests;
pub mod watcher_tests;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};
use tower::{Service, ServiceExt};

use provv_watcher::{
    calculator::Calculator,
    config::{AppConfig, ServerConfig, WatcherConfig},
    ocr::{CommandRecognizer, TextRecognizer},
    relay::{ChannelSink, DashboardSink, Relay},
    scheduler::ScanCommand,
    web::{create_router, AppState},
};

pub const POLICY_PAGE: &str = r#"<html><body>
    <h1>Polizza 4412</h1>
    <table>
        <tr><td>Premio lordo annuo</td><td>5.000,00</td></tr>
        <tr><td>Totale imponibile</td><td>12</td><td>1.500,00</td></tr>
    </table>
</body></html>"#;

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7879,
        },
        watcher: WatcherConfig {
            poll_interval_ms: 20,
            debounce_ms: 50,
            ..WatcherConfig::default()
        },
        ..AppConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub commands: mpsc::Receiver<ScanCommand>,
    pub prefs_dir: TempDir,
}

/// Create test app state with a relay, an OCR stand-in and prefs in a temp dir
pub async fn create_test_app() -> anyhow::Result<TestApp> {
    let config = get_test_config();

    let relay = Arc::new(Relay::new(config.relay.history_capacity));
    let dashboard = DashboardSink::new();
    let events = ChannelSink::new(config.relay.channel_capacity);
    relay.register_sink(Box::new(dashboard.clone())).await;
    relay.register_sink(Box::new(events.clone())).await;

    let (commands_tx, commands) = mpsc::channel(4);
    let prefs_dir = tempfile::tempdir()?;
    let calculator = Calculator::with_prefs_file(prefs_dir.path().join("prefs.toml"));
    // `cat` echoes the "image" back, standing in for a real OCR engine
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(CommandRecognizer::new("cat", Vec::new()));

    let state = AppState {
        relay,
        dashboard,
        events,
        commands: commands_tx,
        calculator: Arc::new(Mutex::new(calculator)),
        recognizer: Some(recognizer),
        config,
    };

    Ok(TestApp {
        router: create_router(state.clone()),
        state,
        commands,
        prefs_dir,
    })
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    app: &mut Router,
    method: Method,
    uri: &str,
    body: Option<String>,
) -> anyhow::Result<axum::response::Response> {
    let mut request = Request::builder().method(method).uri(uri);

    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = request.body(Body::from(body.unwrap_or_default()))?;

    let response = ServiceExt::<Request<Body>>::ready(app).await?.call(request).await?;
    Ok(response)
}

pub async fn read_json(response: axum::response::Response) -> anyhow::Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    false
}
