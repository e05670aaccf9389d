//! Agent definitions: graph nodes combining instructions, tools, and handoff edges.

use std::fmt;
use std::sync::Arc;

use crate::context::ContextSnapshot;

/// Renders an agent's system prompt from an immutable context snapshot.
pub type InstructionFn = dyn Fn(&ContextSnapshot) -> String + Send + Sync;

/// System prompt of an agent.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    /// Evaluated just before every turn of the agent.
    Dynamic(Arc<InstructionFn>),
}

impl Instructions {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ContextSnapshot) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn render(&self, snapshot: &ContextSnapshot) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Dynamic(f) => f(snapshot),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(&text.len()).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Another agent exposed as a callable tool. The sub-agent runs to completion
/// on the query and its final text becomes the tool result; no handoff occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentToolBinding {
    pub tool_name: String,
    pub description: String,
    pub agent: String,
}

/// Where an agent's outgoing handoff edges come from.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffSource {
    /// Fixed at construction.
    Declared(Vec<String>),
    /// Read from the run's context at dispatch time (interrupt handler only).
    ResumeTargets,
}

impl Default for HandoffSource {
    fn default() -> Self {
        Self::Declared(Vec::new())
    }
}

/// A node in the agent graph.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: Instructions,
    /// Shown to other agents on the handoff tool pointing here.
    pub handoff_description: Option<String>,
    /// Names of bound tools, in the order offered to the model.
    pub tools: Vec<String>,
    pub agent_tools: Vec<AgentToolBinding>,
    pub handoffs: HandoffSource,
    /// Tool the model must call on its first turn after activation.
    pub forced_tool: Option<String>,
    /// Completing this agent's task ends the flow.
    pub terminal: bool,
    /// Structured tool results of this agent are surfaced to the client.
    pub publishes_tool_output: bool,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, instructions: impl Into<Instructions>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            tools: Vec::new(),
            agent_tools: Vec::new(),
            handoffs: HandoffSource::default(),
            forced_tool: None,
            terminal: false,
            publishes_tool_output: false,
        }
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_agent_tool(
        mut self,
        tool_name: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        self.agent_tools.push(AgentToolBinding {
            tool_name: tool_name.into(),
            description: description.into(),
            agent: agent.into(),
        });
        self
    }

    /// Append declared handoff targets.
    pub fn with_handoffs<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared = match self.handoffs {
            HandoffSource::Declared(existing) => existing,
            HandoffSource::ResumeTargets => Vec::new(),
        };
        declared.extend(targets.into_iter().map(Into::into));
        self.handoffs = HandoffSource::Declared(declared);
        self
    }

    /// Compute handoff edges from the context's resume targets.
    pub fn with_resume_targets(mut self) -> Self {
        self.handoffs = HandoffSource::ResumeTargets;
        self
    }

    pub fn with_forced_tool(mut self, tool: impl Into<String>) -> Self {
        self.forced_tool = Some(tool.into());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn publishing_tool_output(mut self) -> Self {
        self.publishes_tool_output = true;
        self
    }

    /// Declared targets, empty for computed edge sets.
    pub fn declared_handoffs(&self) -> &[String] {
        match &self.handoffs {
            HandoffSource::Declared(targets) => targets,
            HandoffSource::ResumeTargets => &[],
        }
    }

    pub fn agent_tool(&self, tool_name: &str) -> Option<&AgentToolBinding> {
        self.agent_tools.iter().find(|b| b.tool_name == tool_name)
    }
}
