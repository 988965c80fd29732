//! Errors raised while loading policy rules.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The rule document could not be parsed.
    #[error("failed to parse creation rules: {0}")]
    Parse(#[from] toml::de::Error),
}
