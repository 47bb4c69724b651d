use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::calculator::Calculator;
use crate::config::AppConfig;
use crate::ocr::TextRecognizer;
use crate::relay::{ChannelSink, DashboardSink, Relay};
use crate::scheduler::ScanCommand;

pub mod handlers;
pub mod responses;

pub use handlers::{
    // Relay handlers
    get_imponibile, list_scans, dashboard_status, request_rescan, post_message, event_stream,
    // Calculator handlers
    get_calculator, press_keys, import_value, clear_history, ocr_text, ocr_image,
    get_prefs, update_percent, toggle_theme,
    health_check,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub dashboard: DashboardSink,
    pub events: ChannelSink,
    pub commands: mpsc::Sender<ScanCommand>,
    pub calculator: Arc<Mutex<Calculator>>,
    pub recognizer: Option<Arc<dyn TextRecognizer>>,
    pub config: AppConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Extraction results and relay
        .route("/imponibile", get(get_imponibile))
        .route("/scans", get(list_scans))
        .route("/dashboard", get(dashboard_status))
        .route("/rescan", post(request_rescan))
        .route("/messages", post(post_message))
        .route("/events", get(event_stream))

        // Calculator
        .route("/calculator", get(get_calculator))
        .route("/calculator/keys", post(press_keys))
        .route("/calculator/import", post(import_value))
        .route("/calculator/history", delete(clear_history))
        .route("/calculator/ocr/text", post(ocr_text))
        .route("/calculator/ocr/image", post(ocr_image))

        // Preferences
        .route("/prefs", get(get_prefs))
        .route("/prefs/percents/:index", put(update_percent))
        .route("/prefs/theme/toggle", post(toggle_theme))
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Web surface listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
