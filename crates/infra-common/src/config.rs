//! TOML configuration loading shared by every crate.
//!
//! Components define their own `serde` configuration structs; this module
//! only knows how to read them from disk or from a string and how to
//! (de)serialise `Duration`s as whole seconds.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::errors::context::ErrorExt;
use crate::errors::types::{Error, Result};

/// Parse a configuration document from a TOML string
pub fn from_toml_str<T: DeserializeOwned>(raw: &str) -> Result<T> {
    toml::from_str(raw).map_err(Error::from)
}

/// Load a configuration document from a TOML file
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    from_toml_str(&raw).with_context("config", format!("load {}", path.display()))
}

/// `serde(with = ...)` helper for durations written as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(with = "duration_secs")]
        wait: Duration,
    }

    #[test]
    fn parses_from_string() {
        let sample: Sample = from_toml_str("name = \"a\"\nwait = 30\n").unwrap();
        assert_eq!(sample, Sample { name: "a".into(), wait: Duration::from_secs(30) });
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"b\"\nwait = 5").unwrap();
        let sample: Sample = load_toml(file.path()).unwrap();
        assert_eq!(sample.wait, Duration::from_secs(5));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_toml::<Sample>("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_document_keeps_parse_variant() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = ").unwrap();
        let err = load_toml::<Sample>(file.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
