use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use super::{ApiResponse, AppError, AppState, HealthResponse};
use crate::calculator::{format_it, Calculator, Prefs, Theme};
use crate::ocr::{numbers_from_image, numbers_from_text};
use crate::relay::{BroadcastEvent, InboundMessage, RelayMessage, ScanEvent};
use crate::scheduler::ScanCommand;

#[derive(Debug, Serialize, Deserialize)]
pub struct ImponibileResponse {
    pub imponibile: Option<f64>,
    pub formatted: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub status: String,
    pub sinks: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportRequest {
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PercentRequest {
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NumbersResponse {
    pub numbers: Vec<f64>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

pub async fn get_imponibile(State(state): State<AppState>) -> Json<ApiResponse<ImponibileResponse>> {
    let imponibile = state.relay.last_known();
    Json(ApiResponse::success(ImponibileResponse {
        imponibile,
        formatted: imponibile.map(format_it),
    }))
}

pub async fn list_scans(State(state): State<AppState>) -> Json<ApiResponse<Vec<ScanEvent>>> {
    let scans = state.relay.recent_scans().await;
    let meta = serde_json::json!({ "count": scans.len() });
    Json(ApiResponse::success_with_meta(scans, meta))
}

pub async fn dashboard_status(State(state): State<AppState>) -> Json<ApiResponse<DashboardResponse>> {
    Json(ApiResponse::success(DashboardResponse {
        status: state.dashboard.status().await,
        sinks: state.relay.sink_names().await,
    }))
}

pub async fn request_rescan(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<&'static str>>), AppError> {
    enqueue(&state, ScanCommand::Rescan)
}

/// Generic inbound message endpoint for companion surfaces.
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Result<(StatusCode, Json<ApiResponse<&'static str>>), AppError> {
    enqueue(&state, message.into())
}

fn enqueue(
    state: &AppState,
    command: ScanCommand,
) -> Result<(StatusCode, Json<ApiResponse<&'static str>>), AppError> {
    state.commands.try_send(command).map_err(|e| {
        tracing::warn!("Could not enqueue {:?}: {}", command, e);
        AppError::unavailable("Scanner is not accepting commands")
    })?;
    tracing::info!("Rescan requested over HTTP");
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success("queued"))))
}

/// Server-sent events: the current value first (when there is one), then every
/// relayed message as it happens.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.events.subscribe();
    let current = state
        .relay
        .last_known()
        .map(|imponibile| RelayMessage::Broadcast(BroadcastEvent { imponibile }));

    let live = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => return Some((message, receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let events = stream::iter(current)
        .chain(live)
        .map(|message| Event::default().event(message.kind()).json_data(&message));

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn get_calculator(State(state): State<AppState>) -> Json<ApiResponse<Calculator>> {
    let calculator = state.calculator.lock().await;
    Json(ApiResponse::success(calculator.clone()))
}

pub async fn press_keys(
    State(state): State<AppState>,
    Json(request): Json<KeysRequest>,
) -> Result<Json<ApiResponse<Calculator>>, AppError> {
    let mut calculator = state.calculator.lock().await;
    calculator.press_all(request.keys.iter().map(String::as_str))?;
    Ok(Json(ApiResponse::success(calculator.clone())))
}

/// Load an amount into the display; without a body value, the last extracted one.
pub async fn import_value(
    State(state): State<AppState>,
    request: Option<Json<ImportRequest>>,
) -> Result<Json<ApiResponse<Calculator>>, AppError> {
    let requested = request.and_then(|Json(request)| request.value);
    let value = requested
        .or_else(|| state.relay.last_known())
        .ok_or_else(|| AppError::not_found("Imponibile"))?;

    if !value.is_finite() {
        return Err(AppError::bad_request("Value must be a finite number"));
    }

    let mut calculator = state.calculator.lock().await;
    calculator.import(value);
    Ok(Json(ApiResponse::success(calculator.clone())))
}

pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.calculator.lock().await.clear_history();
    StatusCode::NO_CONTENT
}

pub async fn ocr_text(
    State(state): State<AppState>,
    text: String,
) -> Json<ApiResponse<NumbersResponse>> {
    let numbers = numbers_from_text(&text);
    state.calculator.lock().await.set_imported(numbers.clone());
    Json(ApiResponse::success(NumbersResponse { numbers }))
}

pub async fn ocr_image(
    State(state): State<AppState>,
    image: Bytes,
) -> Result<Json<ApiResponse<NumbersResponse>>, AppError> {
    let recognizer = state
        .recognizer
        .clone()
        .ok_or_else(|| AppError::unavailable("No OCR engine configured"))?;
    if image.is_empty() {
        return Err(AppError::bad_request("Image body is empty"));
    }

    let numbers = numbers_from_image(recognizer.as_ref(), &image).await?;
    state.calculator.lock().await.set_imported(numbers.clone());
    Ok(Json(ApiResponse::success(NumbersResponse { numbers })))
}

pub async fn get_prefs(State(state): State<AppState>) -> Json<ApiResponse<Prefs>> {
    let calculator = state.calculator.lock().await;
    Json(ApiResponse::success(calculator.prefs().clone()))
}

pub async fn update_percent(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(request): Json<PercentRequest>,
) -> Result<Json<ApiResponse<Prefs>>, AppError> {
    let mut calculator = state.calculator.lock().await;
    calculator.set_percent(index, request.value)?;
    Ok(Json(ApiResponse::success(calculator.prefs().clone())))
}

pub async fn toggle_theme(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Theme>>, AppError> {
    let theme = state.calculator.lock().await.toggle_theme()?;
    Ok(Json(ApiResponse::success(theme)))
}
