use std::sync::Arc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::{get_test_config, wait_for_condition, POLICY_PAGE};
use provv_watcher::{FileSource, StaticSource, Watcher};

const UPDATED_PAGE: &str = r#"<html><body>
    <p><span>Premio lordo annuo: 5.000,00</span></p>
    <p><span>Totale imponibile: 3.200,00</span></p>
</body></html>"#;

async fn wait_for_value(watcher: &Watcher, expected: f64) -> bool {
    let relay = watcher.relay();
    wait_for_condition(|| {
        let relay = Arc::clone(&relay);
        async move { relay.last_known() == Some(expected) }
    }, 5)
    .await
}

#[tokio::test]
async fn test_watcher_follows_page_changes() -> anyhow::Result<()> {
    let config = get_test_config();
    let source = StaticSource::new("memory://polizza", POLICY_PAGE);
    let watcher = Watcher::start(Arc::new(source.clone()), &config).await?;

    assert!(wait_for_value(&watcher, 1500.0).await, "initial scan never relayed");

    source.set_html(UPDATED_PAGE).await;
    assert!(wait_for_value(&watcher, 3200.0).await, "page change never rescanned");

    let dashboard = watcher.dashboard();
    assert!(
        wait_for_condition(|| {
            let dashboard = dashboard.clone();
            async move { dashboard.status().await == "Imponibile: 3200" }
        }, 5)
        .await
    );

    let scans = watcher.relay().recent_scans().await;
    assert_eq!(scans.first().and_then(|scan| scan.value), Some(3200.0));
    assert_eq!(scans.last().and_then(|scan| scan.value), Some(1500.0));

    let stats = watcher.shutdown().await?;
    assert!(stats.scans >= 2);
    assert!(stats.found >= 2);
    assert_eq!(stats.failed_reads, 0);
    Ok(())
}

#[tokio::test]
async fn test_watcher_rescan_on_request() -> anyhow::Result<()> {
    let config = get_test_config();
    let source = StaticSource::new("memory://polizza", POLICY_PAGE);
    let watcher = Watcher::start(Arc::new(source), &config).await?;
    assert!(wait_for_value(&watcher, 1500.0).await);

    let relay = watcher.relay();
    let before = relay.recent_scans().await.len();
    watcher.rescan().await?;

    assert!(
        wait_for_condition(|| {
            let relay = Arc::clone(&relay);
            async move { relay.recent_scans().await.len() > before }
        }, 5)
        .await
    );

    let stats = watcher.shutdown().await?;
    assert_eq!(stats.forced, 1);
    Ok(())
}

#[tokio::test]
async fn test_watcher_reads_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let page = dir.path().join("polizza.html");
    tokio::fs::write(&page, POLICY_PAGE).await?;

    let config = get_test_config();
    let watcher = Watcher::start(Arc::new(FileSource::new(&page)), &config).await?;
    assert!(wait_for_value(&watcher, 1500.0).await);

    tokio::fs::write(&page, UPDATED_PAGE).await?;
    assert!(wait_for_value(&watcher, 3200.0).await);

    watcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_survived() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let page = dir.path().join("not-yet.html");

    let config = get_test_config();
    let watcher = Watcher::start(Arc::new(FileSource::new(&page)), &config).await?;

    tokio::fs::write(&page, POLICY_PAGE).await?;
    watcher.rescan().await?;
    assert!(wait_for_value(&watcher, 1500.0).await);

    let stats = watcher.shutdown().await?;
    assert!(stats.failed_reads >= 1);
    Ok(())
}

#[tokio::test]
async fn test_webhook_receives_broadcasts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/relay"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = get_test_config();
    config.relay.webhook_url = Some(format!("{}/relay", server.uri()));

    let source = StaticSource::new("memory://polizza", POLICY_PAGE);
    let watcher = Watcher::start(Arc::new(source), &config).await?;
    assert!(wait_for_value(&watcher, 1500.0).await);

    let server = &server;
    let delivered = wait_for_condition(move || async move {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice::<serde_json::Value>(&request.body).ok())
            .any(|body| body["type"] == "IMPO_BROADCAST" && body["imponibile"] == 1500.0)
    }, 5)
    .await;
    assert!(delivered, "webhook never saw the broadcast");

    watcher.shutdown().await?;
    Ok(())
}
