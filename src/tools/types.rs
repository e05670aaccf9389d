//! Tool-related types: parameter schemas and tool outputs.

use serde::{Deserialize, Serialize};

use crate::context::PayloadKind;

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: serde_json::Value,
}

impl AgentToolParameters {
    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    /// Add a string property.
    pub fn string(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({
                "type": "string",
                "description": description.into(),
            }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Build into AgentToolParameters.
    pub fn build(self) -> AgentToolParameters {
        AgentToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// What a tool hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Structured record, collection, or a sentinel string.
    pub value: serde_json::Value,
    /// Classification written to the context when set.
    pub kind: Option<PayloadKind>,
    /// Ask the engine to send the next turn back to the entry agent.
    pub restart: bool,
}

impl ToolOutput {
    pub fn value(value: serde_json::Value) -> Self {
        Self {
            value,
            kind: None,
            restart: false,
        }
    }

    /// A human-readable result, typically a "not found" sentinel.
    pub fn text(text: impl Into<String>) -> Self {
        Self::value(serde_json::Value::String(text.into()))
    }

    pub fn with_kind(mut self, kind: PayloadKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    /// The text placed in the transcript for the model to read.
    pub fn model_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
