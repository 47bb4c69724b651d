use regex::Regex;
use once_cell::sync::Lazy;

/// Numeric-looking token: optional euro sign, then either up to three digits
/// followed by `.` or whitespace separated thousand groups, or a plain digit
/// run, then an optional `.`/`,` fraction.
///
/// The grouped form needs at least one group, otherwise `1250` would be cut
/// into `125` and `0`.
pub const NUMBER_PATTERN: &str = r"(?:€\s*)?(?:\d{1,3}(?:[.\s]\d{3})+|\d+)(?:[.,]\d+)?";

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(NUMBER_PATTERN).expect("number pattern is valid"));

static STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s|€|eur").expect("strip pattern is valid"));

static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)€|eur").expect("currency pattern is valid"));

static GROUPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(?:\.\d{3})+$").expect("grouping pattern is valid"));

/// Parse a numeric token using Italian/English separator rules.
///
/// - both `.` and `,` present: `.` groups thousands, `,` is the decimal point
/// - only `,`: it is the decimal point
/// - otherwise the token is parsed as written, so `1234.5` stays `1234.5`
///
/// A token that carried a currency marker and has the exact `1.234.567` grouping
/// shape is read as an integer amount (`€ 2.000` is two thousand euros).
///
/// Returns `None` for anything that does not give a finite number.
pub fn parse_amount(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let has_currency = CURRENCY_RE.is_match(token);
    let stripped = STRIP_RE.replace_all(token, "");

    let normalized = if stripped.contains('.') && stripped.contains(',') {
        stripped.replace('.', "").replacen(',', ".", 1)
    } else if stripped.contains(',') {
        stripped.replacen(',', ".", 1)
    } else if has_currency && GROUPED_RE.is_match(&stripped) {
        stripped.replace('.', "")
    } else {
        stripped.into_owned()
    };

    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parsed value only when it is strictly positive; zero and negatives are
/// never amounts.
pub fn positive_amount(token: &str) -> Option<f64> {
    parse_amount(token).filter(|value| *value > 0.0)
}

/// All numeric tokens in document order.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    NUMBER_RE.find_iter(text).map(|m| m.as_str())
}

/// The last token in `text` that parses to a strictly positive amount.
pub fn last_positive_amount(text: &str) -> Option<f64> {
    let found: Vec<&str> = tokens(text).collect();
    found.into_iter().rev().find_map(positive_amount)
}

/// Every strictly positive amount in `text`, in document order.
pub fn all_positive_amounts(text: &str) -> Vec<f64> {
    tokens(text).filter_map(positive_amount).collect()
}
