//! # Keeper Log
//!
//! Installs the process-wide `tracing` subscriber used by keeper binaries,
//! demos and tests. Configuration comes from [`Config`] presets or from the
//! environment (`KEEPER_LOG`, `RUST_LOG`, `KEEPER_LOG_FORMAT`).
//!
//! ```rust,no_run
//! keeper_log::init().expect("logger");
//! tracing::info!(binding = "db", "container sourced");
//! ```

pub mod builder;
pub mod config;
pub mod error;

pub use builder::LoggerBuilder;
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Initialise logging from the environment.
pub fn init() -> LogResult<()> {
    LoggerBuilder::from_config(Config::from_env()).build()
}

/// Initialise logging with an explicit configuration.
pub fn init_with(config: Config) -> LogResult<()> {
    LoggerBuilder::from_config(config).build()
}

/// Initialise test logging, tolerating an already installed subscriber.
///
/// Every test in a binary may call this; only the first call installs the
/// subscriber. Returns `true` when this call installed it.
pub fn init_test() -> bool {
    let config = Config::from_env_or(Config::test());
    match LoggerBuilder::from_config(config).build() {
        Ok(()) => true,
        Err(LogError::AlreadyInitialized) => false,
        Err(e) => {
            eprintln!("keeper-log: test logger not installed: {e}");
            false
        }
    }
}
