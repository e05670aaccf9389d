//! Error classification used to route failures to the right surface.

use serde::{Deserialize, Serialize};

/// Broad error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing credentials or environment, fatal at startup.
    Configuration,
    /// The request itself is wrong (unknown agent, bad input).
    Client,
    Authentication,
    Network,
    Timeout,
    /// A collaborator service answered with an error.
    Upstream,
    /// The run engine could not continue (turn limit, invalid handoff).
    Engine,
    Tool,
    Speech,
    Serialization,
    Internal,
}

impl ErrorCategory {
    /// HTTP status the API layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Client => 400,
            Self::Authentication => 401,
            Self::Timeout => 504,
            Self::Upstream | Self::Network => 502,
            _ => 500,
        }
    }
}
