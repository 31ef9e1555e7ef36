//! Common infrastructure for the teleconsult stack.
//!
//! Every crate in the workspace logs through `tracing`, loads its settings
//! from TOML files through [`config`], and reports infrastructure failures
//! through [`errors::Error`].

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use logging::setup::{parse_log_level, setup_logging, LogFormat, LoggingConfig};
