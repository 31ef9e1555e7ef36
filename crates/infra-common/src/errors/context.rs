use crate::errors::types::Error;
use std::fmt;

/// Where an infrastructure error happened, e.g. `config` / `load app.toml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    /// Free-form detail such as a line number or key
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    pub fn with_details(self, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..self
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.component, self.operation, details),
            None => write!(f, "{}: {}", self.component, self.operation),
        }
    }
}

/// Extension trait for attaching context to infrastructure errors
pub trait ErrorExt<T> {
    /// Add context to the error side of a result
    fn context(self, ctx: ErrorContext) -> Result<T, Error>;

    /// Add simple context with component and operation
    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error>;
}

impl<T> ErrorExt<T> for Result<T, Error> {
    fn context(self, ctx: ErrorContext) -> Result<T, Error> {
        self.map_err(|err| match err {
            // Keep the variant so callers can still match on configuration problems
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            Error::Parse(msg) => Error::Parse(format!("{} [{}]", msg, ctx)),
            other => Error::Custom(format!("{} [{}]", other, ctx)),
        })
    }

    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_appended_and_variant_kept() {
        let res: Result<(), Error> = Err(Error::Config("missing field".into()));
        let err = res.with_context("consult-core", "load config").unwrap_err();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("missing field"));
                assert!(msg.contains("consult-core"));
                assert!(msg.contains("load config"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn details_are_rendered() {
        let ctx = ErrorContext::new("cli", "parse").with_details("line 3");
        assert_eq!(ctx.to_string(), "cli: parse (line 3)");
    }
}
