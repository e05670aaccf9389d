//! Error types for vaxbot.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for all vaxbot operations.
#[derive(Error, Debug)]
pub enum VaxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Invalid handoff from {from} to {to}")]
    InvalidHandoff { from: String, to: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Max turns ({0}) exceeded")]
    MaxTurnsExceeded(usize),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Speech synthesis failed: {0}")]
    SpeechSynthesis(String),

    #[error("Language detection failed: {0}")]
    LanguageDetection(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl VaxError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::UnknownAgent(_) | Self::InvalidArgument(_) => ErrorCategory::Client,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                _ => ErrorCategory::Upstream,
            },
            Self::InvalidHandoff { .. } | Self::MaxTurnsExceeded(_) | Self::Stream(_) => {
                ErrorCategory::Engine
            }
            Self::ToolExecution { .. } => ErrorCategory::Tool,
            Self::SpeechSynthesis(_) => ErrorCategory::Speech,
            Self::LanguageDetection(_) => ErrorCategory::Upstream,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the caller sent something we cannot act on (bad agent name, bad input).
    pub fn is_client_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Client)
    }

    /// Whether the error aborts the whole request rather than a single tool call.
    pub fn is_structural(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Client | ErrorCategory::Engine | ErrorCategory::Configuration
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VaxError>;
