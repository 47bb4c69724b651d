use axum::http::{Method, StatusCode};
use serde_json::json;

use super::{create_test_app, make_request, read_json};
use provv_watcher::{
    calculator::Prefs,
    relay::{RelayMessage, UpdateEvent},
};

#[tokio::test]
async fn test_keys_drive_the_calculator() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = json!({ "keys": ["2", "*", "1", "0", "="] }).to_string();
    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/keys", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["display"], "20");
    assert_eq!(body["data"]["history"][0]["expression"], "2 * 10");
    assert_eq!(body["data"]["history"][0]["result"], 20.0);

    let response = make_request(&mut app.router, Method::GET, "/api/calculator", None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["display"], "20");
    Ok(())
}

#[tokio::test]
async fn test_unknown_key_is_rejected() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = json!({ "keys": ["1", "F9"] }).to_string();
    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/keys", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_import_uses_last_extracted_value() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/import", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.state
        .relay
        .handle(RelayMessage::Update(UpdateEvent {
            imponibile: 1500.0,
            label: Some("Totale imponibile".to_string()),
        }))
        .await;

    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/import", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["display"], "1500");
    Ok(())
}

#[tokio::test]
async fn test_import_explicit_value() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = json!({ "value": 250.5 }).to_string();
    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/import", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["display"], "250,5");
    Ok(())
}

#[tokio::test]
async fn test_ocr_text_lists_numbers() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response = make_request(
        &mut app.router,
        Method::POST,
        "/api/calculator/ocr/text",
        Some("Premio imponibile: 1.234,50".to_string()),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["numbers"], json!([1234.5]));
    assert_eq!(app.state.calculator.lock().await.imported(), &[1234.5]);
    Ok(())
}

#[tokio::test]
async fn test_ocr_image_goes_through_the_recognizer() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response = make_request(
        &mut app.router,
        Method::POST,
        "/api/calculator/ocr/image",
        Some("Totale 2.000".to_string()),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["numbers"], json!([2000.0]));

    let response =
        make_request(&mut app.router, Method::POST, "/api/calculator/ocr/image", None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_percent_presets_are_clamped_and_saved() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = json!({ "value": 5000.0 }).to_string();
    let response =
        make_request(&mut app.router, Method::PUT, "/api/prefs/percents/2", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["percents"][2], 1000.0);

    let saved = Prefs::load(&app.prefs_dir.path().join("prefs.toml"));
    assert_eq!(saved.percent(2), Some(1000.0));

    let body = json!({ "value": 10.0 }).to_string();
    let response =
        make_request(&mut app.router, Method::PUT, "/api/prefs/percents/6", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_theme_toggle_round_trips() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let response =
        make_request(&mut app.router, Method::POST, "/api/prefs/theme/toggle", None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"], "dark");

    let response = make_request(&mut app.router, Method::GET, "/api/prefs", None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["theme"], "dark");
    assert_eq!(body["data"]["percents"].as_array().map(Vec::len), Some(6));
    Ok(())
}

#[tokio::test]
async fn test_clear_history() -> anyhow::Result<()> {
    let mut app = create_test_app().await?;

    let body = json!({ "keys": ["7", "+", "3", "="] }).to_string();
    make_request(&mut app.router, Method::POST, "/api/calculator/keys", Some(body)).await?;
    assert_eq!(app.state.calculator.lock().await.history().count(), 1);

    let response =
        make_request(&mut app.router, Method::DELETE, "/api/calculator/history", None).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.state.calculator.lock().await.history().count(), 0);
    Ok(())
}
