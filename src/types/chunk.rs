//! Response chunks: the externally stable unit of the outbound stream.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ModelMessage;
use crate::context::{ContextSnapshot, PayloadKind};

/// Discriminator of a [`ResponseChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    /// Incremental assistant text.
    DeltaText,
    /// End of one assistant utterance.
    CompletedText,
    /// A handoff completed.
    NewAgent,
    /// A tool invocation started.
    ToolCall,
    /// A tool produced a structured result.
    ToolCallOutput,
    /// Run finished. Always the last chunk.
    Terminating,
}

/// One line of the NDJSON response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub event_type: EventType,
    /// Accumulated assistant text for the run so far.
    pub message: String,
    /// Text added by this chunk (delta text only).
    #[serde(default)]
    pub delta_message: String,
    pub data_type: Option<PayloadKind>,
    pub data: Option<serde_json::Value>,
    /// Full transcript, populated on the terminating chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ModelMessage>>,
    /// Acting agent, or the next entry agent on the terminating chunk.
    pub agent_name: String,
    pub user_info: ContextSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_language: Option<String>,
    /// Base64 audio for voice mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
}

impl ResponseChunk {
    pub fn new(
        event_type: EventType,
        agent_name: impl Into<String>,
        user_info: ContextSnapshot,
    ) -> Self {
        Self {
            event_type,
            message: String::new(),
            delta_message: String::new(),
            data_type: None,
            data: None,
            history: None,
            agent_name: agent_name.into(),
            user_info,
            response_language: None,
            audio_data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_delta(mut self, delta: impl Into<String>) -> Self {
        self.delta_message = delta.into();
        self
    }

    pub fn with_payload(mut self, kind: Option<PayloadKind>, data: serde_json::Value) -> Self {
        self.data_type = kind;
        self.data = Some(data);
        self
    }

    pub fn with_history(mut self, history: Vec<ModelMessage>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_audio(mut self, audio: Option<String>) -> Self {
        self.audio_data = audio;
        self
    }

    pub fn with_response_language(mut self, language: Option<String>) -> Self {
        self.response_language = language;
        self
    }

    /// Serialize as one NDJSON line (trailing newline included).
    pub fn to_ndjson(&self) -> crate::error::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
