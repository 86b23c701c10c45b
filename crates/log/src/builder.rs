//! Logger builder implementation

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{Config, Format};
use crate::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Applies the display options shared by every format and boxes the layer.
macro_rules! boxed_fmt_layer {
    ($layer:expr, $display:expr, $writer:expr) => {{
        let layer = $layer
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids);

        if $display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

/// Logger builder
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Dropping it does not uninstall the global subscriber; it exists so callers
/// hold logging resources for the lifetime of `main`.
#[must_use = "dropping the guard early may lose buffered log output"]
pub struct LoggerGuard {
    _active: bool,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if the filter cannot be parsed or a global subscriber
    /// is already installed.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        let writer = BoxMakeWriter::new(std::io::stderr);
        let display = &self.config.display;

        let fmt_layer: BoxedLayer = match self.config.format {
            Format::Pretty => {
                boxed_fmt_layer!(tracing_subscriber::fmt::layer().pretty(), display, writer)
            }
            Format::Compact => {
                boxed_fmt_layer!(tracing_subscriber::fmt::layer().compact(), display, writer)
            }
            Format::Json => boxed_fmt_layer!(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(display.span_list)
                    .flatten_event(display.flatten),
                display,
                writer
            ),
        };

        Registry::default()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "Logger initialized"
        );

        Ok(LoggerGuard { _active: true })
    }
}

impl LoggerGuard {
    pub(crate) fn noop() -> Self {
        Self { _active: false }
    }
}
