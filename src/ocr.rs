use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind;
use std::process::Stdio;
use once_cell::sync::Lazy;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::calculator::parse_number;
use crate::utils::error::{AppError, Result};

static OCR_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,3}(?:[.\s]\d{3})+(?:[,.]\d+)?|\d+(?:[,.]\d+)?")
        .expect("OCR number pattern is valid")
});

/// Every number-looking token in recognized text, in reading order.
///
/// `"Premio imponibile: 1.234,50"` gives `[1234.5]`.
pub fn numbers_from_text(text: &str) -> Vec<f64> {
    OCR_NUMBER_RE
        .find_iter(text)
        .map(|m| {
            let token: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
            if token.contains('.') && token.contains(',') {
                parse_number(&token.replace('.', "").replacen(',', ".", 1))
            } else if token.contains(',') {
                parse_number(&token.replacen(',', ".", 1))
            } else {
                parse_number(&token)
            }
        })
        .filter(|value| value.is_finite())
        .collect()
}

/// Image-to-text engine. None is bundled; `CommandRecognizer` drives an
/// installed one.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// Pipes the image into an external program and reads text from its stdout,
/// e.g. `tesseract stdin stdout -l ita+eng`.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// First element is the program, the rest its arguments.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl TextRecognizer for CommandRecognizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Internal("recognizer stdin unavailable".to_string()))?;
        let input = image.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                writer.abort();
                return Err(e.into());
            }
        };
        let written = writer
            .await
            .map_err(|e| AppError::Internal(format!("recognizer input task failed: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Internal(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        match written {
            Ok(()) => {}
            // The engine is done with the image; its output still counts.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!("{} stopped reading its input early", self.program);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Recognize an image and keep only the numbers found in it.
pub async fn numbers_from_image(recognizer: &dyn TextRecognizer, image: &[u8]) -> Result<Vec<f64>> {
    let text = recognizer.recognize(image).await?;
    let numbers = numbers_from_text(&text);
    tracing::debug!("{} recognized {} numbers", recognizer.name(), numbers.len());
    Ok(numbers)
}
