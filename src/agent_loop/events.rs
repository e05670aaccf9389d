//! Run event stream types.

use serde::{Deserialize, Serialize};

use crate::types::AgentToolCall;

/// Low-level model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawResponse {
    /// Incremental assistant text.
    TextDelta { delta: String },
    /// End of one assistant text output.
    ContentPartDone,
    Other,
}

/// A fully formed item of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunItem {
    MessageOutput {
        agent: String,
        text: String,
    },
    ToolCall {
        agent: String,
        call: AgentToolCall,
    },
    ToolCallOutput {
        agent: String,
        call_id: String,
        output: serde_json::Value,
    },
    HandoffCall {
        agent: String,
        call: AgentToolCall,
    },
    HandoffOutput {
        source: String,
        target: String,
    },
}

/// One event of a streamed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    RawResponse(RawResponse),
    /// An agent became active: the starting agent, then every handoff target.
    AgentUpdated { new_agent: String },
    RunItem(RunItem),
}

impl RunEvent {
    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::RawResponse(RawResponse::TextDelta {
            delta: delta.into(),
        })
    }

    pub fn agent_updated(agent: impl Into<String>) -> Self {
        Self::AgentUpdated {
            new_agent: agent.into(),
        }
    }
}
