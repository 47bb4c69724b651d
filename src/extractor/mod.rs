pub mod labels;
pub mod locale;
pub mod proximity;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::utils::error::{AppError, Result};

pub use labels::{default_rules, LabelRule, LabelScorer};
pub use locale::{parse_amount, positive_amount, NUMBER_PATTERN};
pub use proximity::{find_number_near, visible_text, NearbyNumber, ProximityLevel};

/// Label reported when the value came from the whole-page scan.
pub const FALLBACK_LABEL: &str = "fallback";
/// Score reported for a whole-page fallback value.
pub const FALLBACK_SCORE: i32 = 1;
/// Values at or below this are treated as counts, ids and percentages.
pub const DEFAULT_NOISE_FLOOR: f64 = 10.0;

/// Where the winning value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MatchLabel {
    /// Flattened text of the labelled element that won.
    Element(String),
    /// No label qualified; the value is the whole-page guess.
    Fallback,
}

impl MatchLabel {
    pub fn as_str(&self) -> &str {
        match self {
            MatchLabel::Element(text) => text,
            MatchLabel::Fallback => FALLBACK_LABEL,
        }
    }
}

/// Outcome of one scan. A fresh one is built every time; nothing is merged
/// with earlier scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub value: Option<f64>,
    pub label: Option<MatchLabel>,
    pub score: Option<i32>,
    pub proximity: Option<ProximityLevel>,
    /// Number of candidate elements enumerated.
    pub examined: usize,
}

impl ExtractionResult {
    pub fn nothing(examined: usize) -> Self {
        Self {
            value: None,
            label: None,
            score: None,
            proximity: None,
            examined,
        }
    }

    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.label, Some(MatchLabel::Fallback))
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_ref().map(MatchLabel::as_str)
    }
}

struct Best {
    value: f64,
    level: ProximityLevel,
    label: String,
    score: i32,
}

/// Label-weighted extraction of the taxable amount from an HTML page.
#[derive(Debug, Clone)]
pub struct Extractor {
    scorer: LabelScorer,
    candidates: Selector,
    body: Selector,
    noise_floor: f64,
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        if config.candidate_tags.is_empty() {
            return Err(AppError::Validation(
                "at least one candidate tag is required".to_string(),
            ));
        }

        let selector = config.candidate_tags.join(", ");
        let candidates = Selector::parse(&selector).map_err(|_| AppError::Selector {
            selector: selector.clone(),
        })?;
        let body = Selector::parse("body").map_err(|_| AppError::Selector {
            selector: "body".to_string(),
        })?;

        Ok(Self {
            scorer: LabelScorer::new(&config.rules)?,
            candidates,
            body,
            noise_floor: config.noise_floor,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(&ExtractorConfig::default())
    }

    pub fn scorer(&self) -> &LabelScorer {
        &self.scorer
    }

    /// Parse `html` and run a full extraction pass.
    pub fn extract(&self, html: &str) -> ExtractionResult {
        let document = Html::parse_document(html);
        self.extract_document(&document)
    }

    pub fn extract_document(&self, document: &Html) -> ExtractionResult {
        let nodes: Vec<ElementRef<'_>> = document.select(&self.candidates).collect();
        let examined = nodes.len();
        let mut best: Option<Best> = None;

        for element in nodes {
            let text = visible_text(element);
            if text.is_empty() {
                continue;
            }

            let score = self.scorer.score(&text);
            if !LabelScorer::is_candidate(score) {
                continue;
            }
            // Equal scores keep the earlier element.
            if best.as_ref().is_some_and(|current| score <= current.score) {
                continue;
            }

            if let Some(found) = find_number_near(element) {
                tracing::trace!(score, value = found.value, level = ?found.level, "candidate label");
                best = Some(Best {
                    value: found.value,
                    level: found.level,
                    label: text,
                    score,
                });
            }
        }

        match best {
            Some(best) => ExtractionResult {
                value: Some(best.value),
                label: Some(MatchLabel::Element(best.label)),
                score: Some(best.score),
                proximity: Some(best.level),
                examined,
            },
            None => self.fallback(document, examined),
        }
    }

    /// Whole-page scan: the largest amount above the noise floor, or the
    /// largest amount at all when nothing clears it.
    fn fallback(&self, document: &Html, examined: usize) -> ExtractionResult {
        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());
        let amounts = locale::all_positive_amounts(&visible_text(root));

        let above_floor = max_amount(amounts.iter().copied().filter(|v| *v > self.noise_floor));
        match above_floor.or_else(|| max_amount(amounts.iter().copied())) {
            Some(value) => ExtractionResult {
                value: Some(value),
                label: Some(MatchLabel::Fallback),
                score: Some(FALLBACK_SCORE),
                proximity: None,
                examined,
            },
            None => ExtractionResult::nothing(examined),
        }
    }
}

fn max_amount(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, value| Some(acc.map_or(value, |max: f64| max.max(value))))
}
