use axum::http::{Method, StatusCode};
use futures::StreamExt;
use std::time::Duration;

use super::{create_test_app, make_request, read_json, POLICY_PAGE};
use provv_watcher::{
    relay::{RelayMessage, ScanEvent, UpdateEvent},
    scheduler::ScanCommand,
    Extractor,
};

async fn publish_policy_scan(app: &super::TestApp) -> anyhow::Result<()> {
    let result = Extractor::with_defaults()?.extract(POLICY_PAGE);
    let relay = &app.state.relay;

    relay
        .handle(RelayMessage::Debug(ScanEvent::from_result(&result, "memory://polizza")))
        .await;
    if let Some(update) = UpdateEvent::from_result(&result) {
        relay.handle(RelayMessage::Update(update)).await;
    }
    Ok(())
}

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response = make_request(&mut app.router, Method::GET, "/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_imponibile_before_and_after_a_scan() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response = make_request(&mut app.router, Method::GET, "/api/imponibile", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["imponibile"].is_null());

    publish_policy_scan(&app).await?;

    let response = make_request(&mut app.router, Method::GET, "/api/imponibile", None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["imponibile"], 1500.0);
    assert_eq!(body["data"]["formatted"], "1.500");
    Ok(())
}

#[tokio::test]
async fn test_scans_are_listed_with_count() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;
    publish_policy_scan(&app).await?;

    let response = make_request(&mut app.router, Method::GET, "/api/scans", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["meta"]["count"], 1);
    let scan = &body["data"][0];
    assert_eq!(scan["imponibile"], 1500.0);
    assert_eq!(scan["url"], "memory://polizza");
    assert_eq!(scan["score"], 180);
    Ok(())
}

#[tokio::test]
async fn test_dashboard_reflects_relayed_value() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;
    publish_policy_scan(&app).await?;

    let response = make_request(&mut app.router, Method::GET, "/api/dashboard", None).await?;
    let body = read_json(response).await?;

    assert_eq!(body["data"]["status"], "Imponibile: 1500");
    assert_eq!(body["data"]["sinks"], serde_json::json!(["dashboard", "channel"]));
    Ok(())
}

#[tokio::test]
async fn test_rescan_is_queued() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response = make_request(&mut app.router, Method::POST, "/api/rescan", None).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(app.commands.try_recv()?, ScanCommand::Rescan);
    Ok(())
}

#[tokio::test]
async fn test_inbound_rescan_message() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = serde_json::json!({ "type": "RESCAN_IMPO" }).to_string();
    let response = make_request(&mut app.router, Method::POST, "/api/messages", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(app.commands.try_recv()?, ScanCommand::Rescan);

    let body = serde_json::json!({ "type": "IMPO_SOMETHING_ELSE" }).to_string();
    let response = make_request(&mut app.router, Method::POST, "/api/messages", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.commands.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_rescan_unavailable_when_scheduler_is_gone() -> anyhow::Result<()> {
    let super::TestApp {
        mut router,
        commands,
        ..
    } = create_test_app().await?;
    drop(commands);

    let response = make_request(&mut router, Method::POST, "/api/rescan", None).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = read_json(response).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn test_event_stream_starts_with_current_value() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;
    publish_policy_scan(&app).await?;

    let response = make_request(&mut app.router, Method::GET, "/api/events", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str()?,
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await?
        .expect("stream ended before the first event")?;
    let text = String::from_utf8(chunk.to_vec())?;

    assert!(text.contains("event: IMPO_BROADCAST"));
    assert!(text.contains(r#""imponibile":1500.0"#));
    Ok(())
}
