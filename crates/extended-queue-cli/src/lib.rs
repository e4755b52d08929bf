//! # Extended Queue CLI
//!
//! Command-line interface for the extended-queue library.
//!
//! This module provides CLI commands for:
//! - Running a processing strategy against the in-memory backends
//! - Validating and showing processing settings

use clap::{Parser, Subcommand, ValueEnum};
use extended_queue::{
    providers::{InMemoryBlobStore, InMemoryQueue},
    BatchOptions, Codec, DecodedMessage, ExtendedQueue, ExtendedQueueFactory, GzipTransform,
    MessageId, ParallelOptions, ProcessingError, ProcessingSettings, ProviderType, SerialOptions,
    SettingsError, StatisticsSnapshot, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Extended Queue CLI - reliable processing over visibility-timeout queues
#[derive(Parser)]
#[command(name = "xq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reliable message processing over visibility-timeout queues")]
#[command(
    long_about = "Runs the extended-queue processing strategies against in-memory backends and validates processing settings"
)]
pub struct Cli {
    /// Settings file path
    #[arg(short, long, env = "XQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue messages on an in-memory queue and process them
    Run {
        /// Processing strategy
        #[arg(short, long, default_value = "serial")]
        strategy: Strategy,

        /// Number of messages to enqueue
        #[arg(short, long, default_value = "100")]
        messages: usize,

        /// Payload size of each message in bytes
        #[arg(short, long, default_value = "128")]
        payload_size: usize,

        /// Simulated handler work per message in milliseconds
        #[arg(short, long, default_value = "0")]
        work_ms: u64,

        /// Compress payloads with gzip
        #[arg(long)]
        gzip: bool,

        /// Override the configured in-flight limit of the parallel strategy
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the configured batch size of the batch strategy
        #[arg(long)]
        batch_size: Option<u32>,

        /// Give up after this many seconds if the queue has not drained
        #[arg(short, long, default_value = "60")]
        timeout: u64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate processing settings
    Config {
        /// Settings file to validate, overrides --config
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show resolved settings
        #[arg(short, long)]
        show: bool,

        /// Output format for settings
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Serial,
    Parallel,
    Batch,
}

/// Output formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Settings output formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] SettingsError),

    #[error("Invalid options: {0}")]
    Validation(#[from] ValidationError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Validation(_) => 1,
            Self::Processing(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
        }
    }
}

// ============================================================================
// Run Report
// ============================================================================

/// Payload enqueued by the `run` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoMessage {
    pub sequence: usize,
    pub body: String,
}

/// Outcome of a `run` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub enqueued: usize,
    pub overflowed: usize,
    pub remaining: usize,
    pub drained: bool,
    pub elapsed_ms: u64,
    pub statistics: StatisticsSnapshot,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "strategy:   {:?}", self.strategy)?;
        writeln!(f, "enqueued:   {}", self.enqueued)?;
        writeln!(f, "overflowed: {}", self.overflowed)?;
        writeln!(f, "remaining:  {}", self.remaining)?;
        writeln!(f, "drained:    {}", self.drained)?;
        writeln!(f, "elapsed:    {}ms", self.elapsed_ms)?;
        write!(f, "statistics: {}", self.statistics)
    }
}

/// Parameters of a `run` command
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub strategy: Strategy,
    pub messages: usize,
    pub payload_size: usize,
    pub work: Duration,
    pub gzip: bool,
    pub concurrency: Option<usize>,
    pub batch_size: Option<u32>,
    pub timeout: Duration,
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, initialize logging and execute the command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    execute(cli).await
}

/// Execute an already parsed command line
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Run {
            strategy,
            messages,
            payload_size,
            work_ms,
            gzip,
            concurrency,
            batch_size,
            timeout,
            format,
        } => {
            let settings = load_settings(cli.config.as_deref())?;
            let parameters = RunParameters {
                strategy,
                messages,
                payload_size,
                work: Duration::from_millis(work_ms),
                gzip,
                concurrency,
                batch_size,
                timeout: Duration::from_secs(timeout),
            };

            let report = run_demo(&settings, parameters).await?;
            println!("{}", render_report(&report, format)?);
            Ok(())
        }
        Commands::Config { file, show, format } => {
            let path = file.or(cli.config);
            execute_config_command(path.as_deref(), show, format)
        }
    }
}

fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    // Logs go to stderr so command output on stdout stays machine readable.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            cli.json_logs
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.json_logs)
                .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .try_init()
        .map_err(|e| CliError::CommandFailed {
            message: format!("failed to initialize logging: {}", e),
        })
}

fn load_settings(path: Option<&Path>) -> Result<ProcessingSettings, CliError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(CliError::InvalidArgument {
                arg: "config".to_string(),
                message: format!("settings file not found: {}", path.display()),
            });
        }
    }

    Ok(ProcessingSettings::load(path)?)
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_config_command(
    path: Option<&Path>,
    show: bool,
    format: ConfigFormat,
) -> Result<(), CliError> {
    let settings = load_settings(path)?;
    info!(file = ?path, "Processing settings are valid");

    if show {
        println!("{}", render_settings(&settings, format)?);
    } else {
        println!("Settings are valid");
    }

    Ok(())
}

/// Render settings in the requested format
pub fn render_settings(
    settings: &ProcessingSettings,
    format: ConfigFormat,
) -> Result<String, CliError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(settings).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(settings).map_err(|e| e.to_string()),
    };

    rendered.map_err(|message| CliError::CommandFailed { message })
}

/// Render a run report in the requested format
pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).map_err(|e| CliError::CommandFailed {
                message: e.to_string(),
            })
        }
    }
}

/// Enqueue messages on a fresh in-memory queue and process them until the
/// queue drains or the timeout passes.
pub async fn run_demo(
    settings: &ProcessingSettings,
    parameters: RunParameters,
) -> Result<RunReport, CliError> {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let client = Arc::new(InMemoryQueue::new("xq-demo"));

    let mut codec = Codec::new();
    if parameters.gzip {
        codec = codec.with_transform(GzipTransform::new());
    }

    let queue = ExtendedQueueFactory::new(blobs.clone(), ProviderType::InMemory.into())
        .with_codec(codec)
        .create(client.clone());

    let body = "x".repeat(parameters.payload_size);
    for sequence in 0..parameters.messages {
        queue
            .add_message_entity(&DemoMessage {
                sequence,
                body: body.clone(),
            })
            .await?;
    }
    let overflowed = blobs.blob_count();

    info!(
        strategy = ?parameters.strategy,
        messages = parameters.messages,
        overflowed = overflowed,
        "Messages enqueued, starting processing"
    );

    let cancel = CancellationToken::new();
    let started = Instant::now();
    let processing = tokio::spawn(process(
        queue.clone(),
        settings.clone(),
        parameters.clone(),
        cancel.clone(),
    )?);

    let deadline = started + parameters.timeout;
    let mut drained = client.message_count() == 0;
    while !drained && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
        drained = client.message_count() == 0;
    }

    if !drained {
        warn!(
            remaining = client.message_count(),
            timeout_secs = parameters.timeout.as_secs(),
            "Queue did not drain before the timeout"
        );
    }

    cancel.cancel();
    processing.await.map_err(|e| CliError::CommandFailed {
        message: format!("processing task failed: {}", e),
    })?;

    let report = RunReport {
        strategy: parameters.strategy,
        enqueued: parameters.messages,
        overflowed,
        remaining: client.message_count(),
        drained,
        elapsed_ms: started.elapsed().as_millis() as u64,
        statistics: queue.statistics_snapshot(),
    };

    info!(statistics = %report.statistics, "Processing finished");
    Ok(report)
}

/// Build the strategy future, validating options before anything runs
fn process(
    queue: ExtendedQueue,
    settings: ProcessingSettings,
    parameters: RunParameters,
    cancel: CancellationToken,
) -> Result<impl std::future::Future<Output = ()> + Send + 'static, CliError> {
    let base = settings.processing_options(cancel)?;
    let work = parameters.work;

    let handler = move |message: DecodedMessage<DemoMessage>| async move {
        if !work.is_zero() {
            tokio::time::sleep(work).await;
        }
        tracing::debug!(sequence = message.contents().sequence, "Handled demo message");
        anyhow::Ok(true)
    };

    let batch_handler = move |messages: Vec<DecodedMessage<DemoMessage>>| async move {
        if !work.is_zero() {
            tokio::time::sleep(work).await;
        }
        anyhow::Ok(
            messages
                .iter()
                .map(|message| message.id().clone())
                .collect::<Vec<MessageId>>(),
        )
    };

    let strategy: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
        match parameters.strategy {
            Strategy::Serial => {
                let options = SerialOptions::new(base, handler);
                Box::pin(async move { queue.handle_messages(options).await })
            }
            Strategy::Parallel => {
                let concurrency = parameters.concurrency.unwrap_or(settings.max_concurrency);
                let options = ParallelOptions::new(SerialOptions::new(base, handler), concurrency)?;
                Box::pin(async move { queue.handle_messages_in_parallel(options).await })
            }
            Strategy::Batch => {
                let batch_size = parameters.batch_size.unwrap_or(settings.batch_size);
                let options = BatchOptions::new(base, batch_size, batch_handler)?;
                Box::pin(async move { queue.handle_messages_in_batch(options).await })
            }
        };

    Ok(strategy)
}
