//! JSONL and console logging for qnet simulations
//!
//! Every node of a simulation runs in the same process, so this crate puts
//! the emitting node on each span and offers two output shapes: pretty
//! console lines for interactive runs and JSON lines for later analysis.
//!
//! # Quick Start
//!
//! ```ignore
//! use qnet_logging::{QnetSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! QnetSubscriberBuilder::new().init();
//!
//! // Human-readable output, debug level
//! QnetSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Node Context
//!
//! Spans opened while a [`NodeContextGuard`] is alive remember the node,
//! and so do their child spans:
//!
//! ```ignore
//! use qnet_logging::NodeContextGuard;
//!
//! let span = {
//!     let _guard = NodeContextGuard::new(node.id());
//!     tracing::info_span!("replenisher", node = %node.id())
//! };
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use error::{LoggingError, LoggingResult};
pub use layers::{
    NodeContextExtension, NodeContextJson, NodeContextLayer, jsonl_layer, span_node_context,
};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and initializing the qnet logging subscriber
///
/// By default, console output uses JSONL format. Use
/// [`LogConfig::development`] or [`LogConfig::interactive`] for
/// human-readable output.
pub struct QnetSubscriberBuilder {
    config: LogConfig,
}

impl QnetSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes the file writer when dropped and must be
    /// kept alive while logging to a file.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.config.default_level))
            .map_err(|e| LoggingError::Filter(e.to_string()))?;

        let jsonl = &self.config.jsonl;
        let mut layers: Vec<BoxedLayer> = vec![NodeContextLayer::new().boxed()];

        if self.config.console.enabled {
            let console = if self.config.console.pretty {
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true)
                    .boxed()
            } else {
                jsonl_layer(jsonl, std::io::stdout).boxed()
            };
            layers.push(console);
        }

        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(jsonl_layer(jsonl, writer).boxed());
            guard = Some(file_guard);
        }

        Registry::default()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Install the subscriber globally, reporting failures on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {e}");
                None
            }
        }
    }
}

impl Default for QnetSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-rotating files are truncated; rotating ones append
fn file_writer(file_config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&file_config.directory)?;

    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            let file = File::create(file_config.single_file_path())?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file_config.prefix)
        .filename_suffix("log")
        .build(&file_config.directory)
        .map_err(|e| LoggingError::Io(std::io::Error::other(e)))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to console
pub fn init_default() {
    QnetSubscriberBuilder::new().init();
}

/// Verbose, pretty console output
pub fn init_development() {
    QnetSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Warnings only; safe to call from many tests
pub fn init_testing() {
    let _ = QnetSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = QnetSubscriberBuilder::new();
        assert_eq!(builder.config.default_level, "info");
        assert!(!builder.config.console.pretty); // JSONL by default
    }

    #[test]
    fn test_builder_with_config() {
        let builder = QnetSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config.default_level, "debug");
        assert!(builder.config.console.pretty);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = QnetSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_file_output(FileConfig::default());
        assert_eq!(builder.config.default_level, "trace");
        assert!(!builder.config.console.enabled);
        assert!(builder.config.file.is_some());
    }

    #[test]
    fn test_file_writer_truncates_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("nested"),
            rotation: RotationStrategy::Never,
            ..FileConfig::default()
        };
        std::fs::create_dir_all(&config.directory).unwrap();
        std::fs::write(config.single_file_path(), "stale").unwrap();

        let (_writer, guard) = file_writer(&config).unwrap();
        drop(guard);
        assert_eq!(std::fs::read_to_string(config.single_file_path()).unwrap(), "");
    }
}
