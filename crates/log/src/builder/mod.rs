//! Logger builder implementation

use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Apply display options to a fmt layer and box it.
///
/// `without_time` and `with_test_writer` change the layer type, so every
/// combination is boxed separately.
macro_rules! boxed_fmt_layer {
    ($layer:expr, $display:expr, $test_writer:expr) => {{
        let display: &DisplayConfig = $display;
        let layer = $layer
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source);
        let boxed: BoxedLayer = match (display.time, $test_writer) {
            (true, false) => layer.boxed(),
            (false, false) => layer.without_time().boxed(),
            (true, true) => layer.with_test_writer().boxed(),
            (false, true) => layer.without_time().with_test_writer().boxed(),
        };
        boxed
    }};
}

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// The configuration this builder installs
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if the filter string cannot be parsed or a global
    /// subscriber is already installed.
    pub fn build(self) -> LogResult<()> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            directive: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        let display = &self.config.display;
        let test_writer = self.config.test_writer;
        let fmt_layer = match self.config.format {
            Format::Pretty => boxed_fmt_layer!(fmt::layer().pretty(), display, test_writer),
            Format::Compact => boxed_fmt_layer!(fmt::layer().compact(), display, test_writer),
            Format::Json => boxed_fmt_layer!(fmt::layer().json(), display, test_writer),
        };

        Registry::default()
            .with(fmt_layer.with_filter(filter))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected() {
        let config = Config {
            level: "keeper=notalevel".to_string(),
            ..Config::test()
        };
        let err = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(err, LogError::Filter { .. }));
    }
}
