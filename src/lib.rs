pub mod calculator;
pub mod config;
pub mod document;
pub mod extractor;
pub mod ocr;
pub mod relay;
pub mod scheduler;
pub mod utils;
pub mod watcher;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use document::{DocumentSource, FileSource, HttpSource, PageSnapshot, StaticSource};
pub use extractor::{ExtractionResult, Extractor, MatchLabel};
pub use relay::{Relay, RelayMessage};
pub use scheduler::{ScanCommand, ScanScheduler, ScanState};
pub use utils::error::AppError;
pub use watcher::Watcher;

pub type Result<T> = std::result::Result<T, AppError>;
