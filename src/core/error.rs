#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Missing or invalid API key, unreadable or invalid config file
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Network failures, rate limits, server errors and malformed replies.
    /// The chat keeps going after logging one of these.
    #[error("Remote error: {0}")]
    Transient(String),
    /// Authentication or permission failures, unknown models, a broken terminal
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),
}

impl ChatError {
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Unrecoverable(_))
    }

    /// Variant name, recorded in the `ERROR` column of file logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration",
            Self::Transient(_) => "Transient",
            Self::Unrecoverable(_) => "Unrecoverable",
        }
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::Unrecoverable(format!("I/O error: {err}"))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        // HTTP statuses are classified from the response body by the provider.
        if err.is_timeout() {
            Self::Transient(format!("Request timed out: {err}"))
        } else {
            Self::Transient(format!("Network error: {err}"))
        }
    }
}
