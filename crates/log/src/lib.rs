//! # Stratus Log
//!
//! Logging setup shared by every binary that embeds the stratus client
//! runtime. Libraries in the workspace only emit `tracing` events; this crate
//! decides where those events go.
//!
//! ## Quick Start
//!
//! ```no_run
//! fn main() -> Result<(), stratus_log::LogError> {
//!     let _guard = stratus_log::auto_init()?;
//!
//!     tracing::info!(endpoint = "https://pve.local:8006", "Connecting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};

/// Result type for logger operations
pub type LogResult<T> = Result<T, LogError>;

/// Error type for logger operations
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level directive could not be parsed
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The directive as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber was already installed
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Environment variable that overrides the level filter
pub const LOG_ENV: &str = "STRATUS_LOG";

/// Environment variable that selects the output format
pub const LOG_FORMAT_ENV: &str = "STRATUS_LOG_FORMAT";

/// Auto-detect and initialize the best logging configuration
///
/// Environment overrides win; otherwise debug builds get the development
/// preset and release builds the production preset.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var(LOG_ENV).is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests.
///
/// Safe to call from every test: once a global subscriber exists this is a
/// no-op returning an inert guard.
pub fn init_test() -> LoggerGuard {
    if tracing::dispatcher::has_been_set() {
        return LoggerGuard::noop();
    }
    init_with(Config::test()).unwrap_or_else(|_| LoggerGuard::noop())
}
