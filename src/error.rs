//! Error types for the fetch pipeline and its configuration.
//!
//! [`FetchError`] is the single error taxonomy shared by the renderer, the
//! extractors and the retry loop. Only [`crate::normalize`] turns it into the
//! public status vocabulary.

use thiserror::Error;

/// Failure raised somewhere inside one fetch invocation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An extractor found no matching pattern or selector. Drives fallback
    /// to the next strategy, or a retry once every strategy has missed.
    #[error("no news items found: {0}")]
    NotFound(String),

    /// Navigation or a readiness wait exceeded its budget.
    #[error("timed out after {elapsed_ms}ms while {stage}")]
    Timeout { stage: &'static str, elapsed_ms: u64 },

    /// Embedded data matched the textual pattern but is not valid structured data.
    #[error("embedded data could not be parsed: {0}")]
    Parse(String),

    /// The rendering session failed to start or crashed mid-navigation.
    #[error("render session failed: {0}")]
    Render(String),

    /// Every attempt failed; `last` is the error seen on the final attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// The underlying error, looking through [`FetchError::Exhausted`].
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), FetchError::Timeout { .. })
    }

    /// Extractor-level miss. Parse failures count as misses so they drive fallback.
    pub fn is_miss(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::Parse(_))
    }
}

/// Problems loading or validating a [`crate::config::SourceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid URL for `{field}`: {value}")]
    Url { field: &'static str, value: String },

    #[error("invalid CSS selector for `{field}`: {value}")]
    Selector { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
