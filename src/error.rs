//! Error types for the pagestitch composition service

use thiserror::Error;

/// Result type alias for composition operations
pub type Result<T> = std::result::Result<T, StitchError>;

/// Error types that can occur while composing a page
#[derive(Error, Debug, Clone)]
pub enum StitchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template fetch error: {0}")]
    TemplateFetch(String),

    #[error("Template parse error: {0}")]
    TemplateParse(String),

    #[error("Context fetch error: {0}")]
    ContextFetch(String),

    #[error("Fragment {index} timed out after {timeout_ms} ms")]
    FragmentTimeout { index: usize, timeout_ms: u64 },

    #[error("Fragment {index} network error: {message}")]
    FragmentNetwork { index: usize, message: String },

    #[error("Fragment {index} upstream returned 5xx: {status}")]
    FragmentServer { index: usize, status: u16 },

    #[error("Client disconnected")]
    ClientDisconnect,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StitchError {
    fn from(err: std::io::Error) -> Self {
        StitchError::Io(err.to_string())
    }
}

impl StitchError {
    /// Determine whether this fragment failure should trigger the fallback URL
    ///
    /// Timeouts, network errors and upstream 5xx responses are the three
    /// outcomes that abort the current attempt; everything else is either
    /// not a fragment failure or already terminal.
    pub fn should_fallback(&self) -> bool {
        matches!(
            self,
            StitchError::FragmentTimeout { .. }
                | StitchError::FragmentNetwork { .. }
                | StitchError::FragmentServer { .. }
        )
    }

    /// Convert error to the HTTP status code reported to the client
    ///
    /// Template and context acquisition failures, parse failures and
    /// primary-fragment failures all surface as 500; a disconnected client
    /// gets no response at all, so the mapping there is nominal.
    pub fn to_http_status(&self) -> u16 {
        match self {
            StitchError::TemplateFetch(_) => 500,
            StitchError::TemplateParse(_) => 500,
            StitchError::ContextFetch(_) => 500,
            StitchError::FragmentTimeout { .. } => 500,
            StitchError::FragmentNetwork { .. } => 500,
            StitchError::FragmentServer { .. } => 500,
            StitchError::ClientDisconnect => 499,
            StitchError::Config(_) => 500,
            StitchError::Http(_) => 500,
            StitchError::Io(_) => 500,
        }
    }
}
