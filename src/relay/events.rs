use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::ExtractionResult;

/// Diagnostic record of one completed scan, sent whether or not a value was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(rename = "imponibile")]
    pub value: Option<f64>,
    pub url: String,
    #[serde(rename = "nodes")]
    pub examined: usize,
    pub label: Option<String>,
    pub score: Option<i32>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn from_result(result: &ExtractionResult, url: impl Into<String>) -> Self {
        Self {
            value: result.value,
            url: url.into(),
            examined: result.examined,
            label: result.label_text().map(str::to_string),
            score: result.score,
            scanned_at: Utc::now(),
        }
    }
}

/// "New input available" signal, only produced when a scan found a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub imponibile: f64,
    pub label: Option<String>,
}

impl UpdateEvent {
    pub fn from_result(result: &ExtractionResult) -> Option<Self> {
        result.value.map(|imponibile| Self {
            imponibile,
            label: result.label_text().map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub imponibile: f64,
}

/// Everything that crosses the relay, tagged the way the companion surfaces
/// expect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "IMPO_DEBUG")]
    Debug(ScanEvent),
    #[serde(rename = "IMPO_UPDATE")]
    Update(UpdateEvent),
    #[serde(rename = "IMPO_BROADCAST")]
    Broadcast(BroadcastEvent),
}

impl RelayMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Debug(_) => "IMPO_DEBUG",
            RelayMessage::Update(_) => "IMPO_UPDATE",
            RelayMessage::Broadcast(_) => "IMPO_BROADCAST",
        }
    }
}

/// Messages the companion surfaces may send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "RESCAN_IMPO")]
    Rescan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MatchLabel;
    use serde_json::json;

    fn found() -> ExtractionResult {
        ExtractionResult {
            value: Some(1500.0),
            label: Some(MatchLabel::Element("Totale imponibile".to_string())),
            score: Some(180),
            proximity: None,
            examined: 42,
        }
    }

    #[test]
    fn test_debug_message_wire_shape() {
        let event = ScanEvent::from_result(&found(), "https://portale.example.it/p/1");
        let value = serde_json::to_value(RelayMessage::Debug(event)).unwrap();

        assert_eq!(value["type"], "IMPO_DEBUG");
        assert_eq!(value["imponibile"], 1500.0);
        assert_eq!(value["nodes"], 42);
        assert_eq!(value["label"], "Totale imponibile");
        assert_eq!(value["score"], 180);
        assert_eq!(value["url"], "https://portale.example.it/p/1");
    }

    #[test]
    fn test_empty_scan_reports_nulls() {
        let event = ScanEvent::from_result(&ExtractionResult::nothing(3), "about:blank");
        let value = serde_json::to_value(RelayMessage::Debug(event)).unwrap();

        assert!(value["imponibile"].is_null());
        assert!(value["label"].is_null());
        assert!(value["score"].is_null());
        assert_eq!(value["nodes"], 3);
    }

    #[test]
    fn test_update_only_when_found() {
        assert!(UpdateEvent::from_result(&ExtractionResult::nothing(0)).is_none());

        let mut fallback = found();
        fallback.label = Some(MatchLabel::Fallback);
        let update = UpdateEvent::from_result(&fallback).unwrap();
        assert_eq!(update.label.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_broadcast_and_rescan_wire_shapes() {
        let broadcast = RelayMessage::Broadcast(BroadcastEvent { imponibile: 12.5 });
        assert_eq!(
            serde_json::to_value(&broadcast).unwrap(),
            json!({"type": "IMPO_BROADCAST", "imponibile": 12.5})
        );

        let inbound: InboundMessage = serde_json::from_value(json!({"type": "RESCAN_IMPO"})).unwrap();
        assert_eq!(inbound, InboundMessage::Rescan);
    }
}
