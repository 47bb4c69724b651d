use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use provv_watcher::calculator::{format_it, Calculator};
use provv_watcher::config::{AppConfig, LoggingConfig};
use provv_watcher::document::source_for;
use provv_watcher::extractor::Extractor;
use provv_watcher::ocr::{numbers_from_text, CommandRecognizer, TextRecognizer};
use provv_watcher::scheduler::scan_source;
use provv_watcher::web::{self, AppState};
use provv_watcher::Watcher;

#[derive(Parser)]
#[command(name = "provv-watcher")]
#[command(author, version, about = "Finds the taxable premium (imponibile) on a policy page and relays it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract once from a file or URL and print the result as JSON
    Scan {
        #[arg(value_name = "SOURCE")]
        source: String,
    },
    /// Keep watching a file or URL, rescanning whenever it changes
    Watch {
        /// File path or http(s) URL; defaults to watcher.source
        #[arg(value_name = "SOURCE")]
        source: Option<String>,

        /// Also serve the HTTP surface for the calculator
        #[arg(long)]
        serve: bool,
    },
    /// Read OCR text from stdin and print the numbers found in it
    Numbers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Scan { source } => scan(&config, &source).await,
        Commands::Watch { source, serve } => watch(config, source, serve).await,
        Commands::Numbers => numbers(),
    }
}

/// Logs go to stderr, and to a daily file when a directory is configured.
fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("provv_watcher=debug,tower_http=info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

async fn scan(config: &AppConfig, location: &str) -> Result<()> {
    let source = source_for(location, &config.watcher)?;
    let extractor = Extractor::new(&config.extractor)?;

    let (url, result) = scan_source(source.as_ref(), &extractor).await?;
    info!("Scanned {} ({} elements)", url, result.examined);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn watch(config: AppConfig, source: Option<String>, serve: bool) -> Result<()> {
    let location = source
        .or_else(|| config.watcher.source.clone())
        .context("No source given and watcher.source is not configured")?;
    let source = source_for(&location, &config.watcher)?;

    info!("Starting Provv Watcher...");
    let watcher = Watcher::start(source, &config).await?;

    if serve {
        let calculator = Calculator::with_prefs_file(&config.calculator.prefs_path);
        let recognizer = CommandRecognizer::from_command_line(&config.calculator.ocr_command)
            .map(|recognizer| Arc::new(recognizer) as Arc<dyn TextRecognizer>);
        let state = AppState {
            relay: watcher.relay(),
            dashboard: watcher.dashboard(),
            events: watcher.events(),
            commands: watcher.commands(),
            calculator: Arc::new(Mutex::new(calculator)),
            recognizer,
            config: config.clone(),
        };

        let mut server = tokio::spawn(web::serve(state, shutdown_signal()));
        tokio::select! {
            result = &mut server => result??,
            _ = shutdown_signal() => {
                // Open event streams never end on their own.
                if tokio::time::timeout(Duration::from_secs(5), &mut server).await.is_err() {
                    server.abort();
                }
            }
        }
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down...");
    let stats = watcher.shutdown().await?;
    info!("{} scans, {} with a value, {} unreadable", stats.scans, stats.found, stats.failed_reads);
    Ok(())
}

fn numbers() -> Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    for number in numbers_from_text(&text) {
        println!("{}\t{}", number, format_it(number));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}
