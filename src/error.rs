use thiserror::Error;

/// Classifies remote list fetch errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection or transport failure
    Network,
    /// Server answered with a non-2xx status
    Status,
    /// The request did not finish within its timebox
    Timeout,
    /// The response body could not be read as text
    Body,
}

/// Content farm filter error types
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Invalid regex /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch error for {url}: {message}")]
    Fetch {
        kind: FetchErrorKind,
        url: String,
        message: String,
    },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FilterError {
    /// Shorthand for building a fetch error.
    pub fn fetch(kind: FetchErrorKind, url: &str, message: impl Into<String>) -> Self {
        FilterError::Fetch {
            kind,
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// The fetch error kind, if this is a fetch failure.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            FilterError::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
