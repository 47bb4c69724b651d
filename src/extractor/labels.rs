use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// A text pattern plus the weight it contributes when it matches.
///
/// Rules overlap on purpose: "Totale imponibile" matches both the
/// `totale\s*imponibile` and the plain `imponibile` rule and collects both weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub pattern: String,
    pub weight: i32,
}

impl LabelRule {
    pub fn new(pattern: impl Into<String>, weight: i32) -> Self {
        Self {
            pattern: pattern.into(),
            weight,
        }
    }
}

/// Rule table tuned for the back-office pages: positive weights for the taxable
/// amount, negative weights for the gross annual premium that sits next to it.
pub fn default_rules() -> Vec<LabelRule> {
    vec![
        LabelRule::new(r"totale\s*imponibile", 100),
        LabelRule::new(r"imponibile", 80),
        LabelRule::new(r"premio\s*imponibile", 70),
        // sometimes rendered right next to the taxable amount
        LabelRule::new(r"totale\s*imposta", 5),
        LabelRule::new(r"totale\s*prima", 1),
        LabelRule::new(r"premio\s*lordo\s*annuo", -100),
        LabelRule::new(r"lordo\s*annuo", -80),
        LabelRule::new(r"lordo", -40),
    ]
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    weight: i32,
}

/// Compiled rule table. Scores are the plain sum of the weights of every
/// matching rule.
#[derive(Debug, Clone)]
pub struct LabelScorer {
    rules: Vec<CompiledRule>,
}

impl LabelScorer {
    pub fn new(rules: &[LabelRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()?;
                Ok(CompiledRule {
                    regex,
                    weight: rule.weight,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&default_rules())
    }

    pub fn score(&self, text: &str) -> i32 {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(&lowered))
            .map(|rule| rule.weight)
            .sum()
    }

    /// Only strictly positive scores take part in the number search.
    pub fn is_candidate(score: i32) -> bool {
        score > 0
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
