use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::error::{AppError, Result};

pub const HISTORY_LIMIT: usize = 200;
pub const DEFAULT_PERCENTS: [f64; 6] = [5.0, 6.0, 10.0, 16.0, 20.0, 25.0];
pub const MAX_PERCENT: f64 = 1000.0;

/// Lenient number parsing for calculator input: spaces dropped, a dot followed
/// by exactly three digits is a thousands separator, the first comma is the
/// decimal point. Anything unparsable or non-finite reads as zero.
pub fn parse_number(input: &str) -> f64 {
    let chars: Vec<char> = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();

    let mut normalized = String::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        if *c == '.' && is_thousands_dot(&chars[i + 1..]) {
            continue;
        }
        normalized.push(*c);
    }

    match normalized.replacen(',', ".", 1).parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

fn is_thousands_dot(rest: &[char]) -> bool {
    rest.iter().take_while(|c| c.is_ascii_digit()).count() == 3
}

/// Italian number formatting: `.` groups thousands, `,` marks decimals, at
/// most six fraction digits. Non-finite values format as an empty string.
pub fn format_it(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }

    let fixed = format!("{:.6}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let is_zero = grouped == "0" && frac.is_empty();
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{},{}", sign, grouped, frac)
    }
}

/// Text put back into the display after a computation. Decimal comma, so the
/// lenient parser never mistakes the fraction for a thousands group.
fn display_string(value: f64) -> String {
    value.to_string().replace('.', ",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    /// Division by zero gives NaN rather than infinity.
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Operator::Add => a + b,
            Operator::Subtract => a - b,
            Operator::Multiply => a * b,
            Operator::Divide if b == 0.0 => f64::NAN,
            Operator::Divide => a / b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(u8),
    Decimal,
    Op(Operator),
    Equals,
    Backspace,
    Clear,
    /// F1..F6, zero-based.
    Preset(usize),
    ToggleTheme,
}

impl FromStr for Key {
    type Err = AppError;

    fn from_str(key: &str) -> Result<Self> {
        let parsed = match key {
            "," | "." => Key::Decimal,
            "+" => Key::Op(Operator::Add),
            "-" => Key::Op(Operator::Subtract),
            "*" => Key::Op(Operator::Multiply),
            "/" => Key::Op(Operator::Divide),
            "=" | "Enter" => Key::Equals,
            "Backspace" => Key::Backspace,
            "Escape" => Key::Clear,
            "t" | "T" => Key::ToggleTheme,
            _ => {
                if let Some(digit) = key.chars().next().filter(|_| key.len() == 1) {
                    if let Some(d) = digit.to_digit(10) {
                        return Ok(Key::Digit(d as u8));
                    }
                }
                match key.strip_prefix('F').and_then(|n| n.parse::<usize>().ok()) {
                    Some(n @ 1..=6) => Key::Preset(n - 1),
                    _ => return Err(AppError::Validation(format!("unsupported key: {}", key))),
                }
            }
        };
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub theme: Theme,
    pub percents: Vec<f64>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            percents: DEFAULT_PERCENTS.to_vec(),
        }
    }
}

impl Prefs {
    /// Missing or unreadable files give the defaults; partial files keep the
    /// defaults for whatever they leave out.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match toml::from_str::<Prefs>(&raw) {
            Ok(prefs) => prefs.normalized(),
            Err(e) => {
                tracing::warn!("Ignoring corrupt prefs file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }

    pub fn percent(&self, index: usize) -> Option<f64> {
        self.percents.get(index).copied()
    }

    /// Values are clamped to `[0, 1000]`.
    pub fn set_percent(&mut self, index: usize, value: f64) -> Result<f64> {
        if !value.is_finite() {
            return Err(AppError::Validation("percent must be a number".to_string()));
        }
        let slot = self
            .percents
            .get_mut(index)
            .ok_or_else(|| AppError::Validation(format!("no percent preset at index {}", index)))?;
        *slot = value.clamp(0.0, MAX_PERCENT);
        Ok(*slot)
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    fn normalized(mut self) -> Self {
        self.percents.truncate(DEFAULT_PERCENTS.len());
        for default in DEFAULT_PERCENTS.iter().skip(self.percents.len()) {
            self.percents.push(*default);
        }
        for value in &mut self.percents {
            *value = if value.is_finite() {
                value.clamp(0.0, MAX_PERCENT)
            } else {
                0.0
            };
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub expression: String,
    pub result: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOp {
    pub op: Operator,
    pub value: f64,
}

/// Four-function calculator with percent presets and a capped history.
#[derive(Debug, Clone, Serialize)]
pub struct Calculator {
    display: String,
    pending: Option<PendingOp>,
    history: VecDeque<HistoryEntry>,
    imported: Vec<f64>,
    prefs: Prefs,
    #[serde(skip)]
    prefs_path: Option<PathBuf>,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(Prefs::default())
    }
}

impl Calculator {
    pub fn new(prefs: Prefs) -> Self {
        Self {
            display: "0".to_string(),
            pending: None,
            history: VecDeque::new(),
            imported: Vec::new(),
            prefs,
            prefs_path: None,
        }
    }

    /// Load prefs from `path` and write every change back to it.
    pub fn with_prefs_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut calculator = Self::new(Prefs::load(&path));
        calculator.prefs_path = Some(path);
        calculator
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn value(&self) -> f64 {
        parse_number(&self.display)
    }

    pub fn pending(&self) -> Option<PendingOp> {
        self.pending
    }

    /// Newest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn imported(&self) -> &[f64] {
        &self.imported
    }

    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    pub fn press(&mut self, key: Key) -> Result<()> {
        match key {
            Key::Digit(d) => self.input_digit(d),
            Key::Decimal => self.add_decimal(),
            Key::Op(op) => self.set_op(op),
            Key::Equals => self.equals(),
            Key::Backspace => self.backspace(),
            Key::Clear => self.clear(),
            Key::Preset(index) => {
                if let Some(percent) = self.prefs.percent(index) {
                    self.apply_percent(percent);
                }
            }
            Key::ToggleTheme => {
                self.toggle_theme()?;
            }
        }
        Ok(())
    }

    pub fn press_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for key in keys {
            self.press(key.parse()?)?;
        }
        Ok(())
    }

    pub fn input_digit(&mut self, digit: u8) {
        let digit = char::from(b'0' + digit.min(9));
        if self.display == "0" {
            self.display = digit.to_string();
        } else {
            self.display.push(digit);
        }
    }

    pub fn add_decimal(&mut self) {
        if !self.display.contains(',') && !self.display.contains('.') {
            self.display.push(',');
        }
    }

    pub fn backspace(&mut self) {
        if self.display.chars().count() <= 1 {
            self.display = "0".to_string();
        } else {
            self.display.pop();
        }
    }

    /// AC: display and pending operation reset, history kept.
    pub fn clear(&mut self) {
        self.display = "0".to_string();
        self.pending = None;
    }

    /// Chained operations evaluate the pending one first.
    pub fn set_op(&mut self, op: Operator) {
        let current = self.value();
        let value = match self.pending {
            Some(pending) => pending.op.apply(pending.value, current),
            None => current,
        };
        self.pending = Some(PendingOp { op, value });
        self.display = "0".to_string();
    }

    pub fn equals(&mut self) {
        let current = self.value();
        match self.pending.take() {
            Some(pending) => {
                let result = pending.op.apply(pending.value, current);
                let expression = format!(
                    "{} {} {}",
                    format_it(pending.value),
                    pending.op.symbol(),
                    format_it(current)
                );
                self.push_history(expression, result);
                self.display = display_string(result);
            }
            None => self.push_history(format_it(current), current),
        }
    }

    pub fn apply_percent(&mut self, percent: f64) {
        let base = self.value();
        let result = base * percent / 100.0;
        self.push_history(format!("{} × {}%", format_it(base), percent), result);
        self.display = display_string(result);
    }

    pub fn set_percent(&mut self, index: usize, value: f64) -> Result<f64> {
        let stored = self.prefs.set_percent(index, value)?;
        self.persist()?;
        Ok(stored)
    }

    pub fn toggle_theme(&mut self) -> Result<Theme> {
        let theme = self.prefs.toggle_theme();
        self.persist()?;
        Ok(theme)
    }

    /// Put an externally obtained amount (scan result, OCR number) on the display.
    pub fn import(&mut self, value: f64) {
        self.display = display_string(value);
    }

    pub fn set_imported(&mut self, numbers: Vec<f64>) {
        self.imported = numbers;
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn push_history(&mut self, expression: String, result: f64) {
        self.history.push_front(HistoryEntry {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            expression,
            result,
        });
        self.history.truncate(HISTORY_LIMIT);
    }

    fn persist(&self) -> Result<()> {
        match &self.prefs_path {
            Some(path) => self.prefs.save(path),
            None => Ok(()),
        }
    }
}
