use crate::errors::types::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines on stderr
    #[default]
    Text,
    /// One JSON object per event on stdout
    Json,
}

/// How the process-wide subscriber is built.
///
/// Binaries construct one of these from their command line, then hand it to
/// [`setup_logging`] exactly once.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Include source file and line in every event
    pub source_location: bool,
    /// Emit an event when a span is entered for the first time and when it closes
    pub span_lifecycle: bool,
    /// Name announced in the startup line
    pub service: String,
}

impl LoggingConfig {
    pub fn new(level: Level, service: impl Into<String>) -> Self {
        Self {
            level,
            format: LogFormat::Text,
            source_location: false,
            span_lifecycle: false,
            service: service.into(),
        }
    }

    /// Build from a textual level such as `"debug"`.
    pub fn for_level(level: &str, service: impl Into<String>) -> Result<Self> {
        Ok(Self::new(parse_log_level(level)?, service))
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn with_span_lifecycle(mut self) -> Self {
        self.span_lifecycle = true;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::INFO, "teleconsult")
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives are honoured on top of the configured level. Fails
/// if a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    let spans = if config.span_lifecycle {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(spans)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Json => builder.json().with_writer(std::io::stdout).try_init(),
        LogFormat::Text => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| Error::Logging(e.to_string()))?;

    tracing::info!(
        service = %config.service,
        version = env!("CARGO_PKG_VERSION"),
        "logging initialised at {}",
        config.level
    );
    Ok(())
}

/// Parse a log level name, case-insensitively
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| Error::Config(format!("unknown log level '{}'", level)))
}
