//! Agent registry: name → definition, immutable after construction.

use std::collections::HashMap;
use std::sync::Arc;

use super::agent::{AgentDefinition, HandoffSource};
use crate::error::{Result, VaxError};
use crate::tools::ToolRegistry;

/// Immutable set of agents plus the two distinguished nodes of the graph.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<AgentDefinition>>,
    order: Vec<String>,
    entry: String,
    interrupt_handler: Option<String>,
}

impl AgentRegistry {
    pub fn builder(entry: impl Into<String>) -> RegistryBuilder {
        RegistryBuilder {
            entry: entry.into(),
            interrupt_handler: None,
            agents: Vec::new(),
        }
    }

    /// Look up an agent by name.
    pub fn resolve(&self, name: &str) -> Result<&Arc<AgentDefinition>> {
        self.agents
            .get(name)
            .ok_or_else(|| VaxError::UnknownAgent(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<AgentDefinition>> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// The root of the graph.
    pub fn entry_agent(&self) -> &Arc<AgentDefinition> {
        // `build` guarantees the entry is registered.
        &self.agents[&self.entry]
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    pub fn interrupt_handler(&self) -> Option<&str> {
        self.interrupt_handler.as_deref()
    }

    pub fn is_interrupt_handler(&self, name: &str) -> bool {
        self.interrupt_handler.as_deref() == Some(name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.agents.get(name).is_some_and(|a| a.terminal)
    }

    pub fn publishes_tool_output(&self, name: &str) -> bool {
        self.agents.get(name).is_some_and(|a| a.publishes_tool_output)
    }

    /// Agent names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Outgoing edges of `agent` for the current run. Computed edge sets read
    /// `resume_targets`, keep only registered agents, and always contain the entry.
    pub fn outgoing(&self, agent: &AgentDefinition, resume_targets: &[String]) -> Vec<String> {
        match &agent.handoffs {
            HandoffSource::Declared(targets) => targets.clone(),
            HandoffSource::ResumeTargets => {
                let mut edges = vec![self.entry.clone()];
                for target in resume_targets {
                    if self.contains(target) && !edges.contains(target) {
                        edges.push(target.clone());
                    }
                }
                edges
            }
        }
    }

    /// Check every bound tool name against a tool registry.
    pub fn validate_tools(&self, tools: &ToolRegistry) -> Result<()> {
        for name in &self.order {
            let agent = &self.agents[name];
            for tool in agent.tools.iter().chain(agent.forced_tool.iter()) {
                let bound_as_agent = agent.agent_tool(tool).is_some();
                if !tools.contains(tool) && !bound_as_agent {
                    return Err(VaxError::Configuration(format!(
                        "agent {name} is bound to unknown tool {tool}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Collects agents and validates the graph on [`build`](Self::build).
pub struct RegistryBuilder {
    entry: String,
    interrupt_handler: Option<String>,
    agents: Vec<AgentDefinition>,
}

impl RegistryBuilder {
    pub fn agent(mut self, agent: AgentDefinition) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn interrupt_handler(mut self, name: impl Into<String>) -> Self {
        self.interrupt_handler = Some(name.into());
        self
    }

    pub fn build(self) -> Result<AgentRegistry> {
        let mut agents = HashMap::with_capacity(self.agents.len());
        let mut order = Vec::with_capacity(self.agents.len());
        for agent in self.agents {
            if agents.contains_key(&agent.name) {
                return Err(VaxError::Configuration(format!(
                    "agent {} registered twice",
                    agent.name
                )));
            }
            order.push(agent.name.clone());
            agents.insert(agent.name.clone(), Arc::new(agent));
        }

        if !agents.contains_key(&self.entry) {
            return Err(VaxError::Configuration(format!(
                "entry agent {} is not registered",
                self.entry
            )));
        }
        if let Some(handler) = &self.interrupt_handler {
            match agents.get(handler) {
                None => {
                    return Err(VaxError::Configuration(format!(
                        "interrupt handler {handler} is not registered"
                    )))
                }
                Some(a) if a.handoffs != HandoffSource::ResumeTargets => {
                    return Err(VaxError::Configuration(format!(
                        "interrupt handler {handler} must compute its handoffs from resume targets"
                    )))
                }
                Some(_) => {}
            }
        }

        for name in &order {
            let agent = &agents[name];
            if agent.handoffs == HandoffSource::ResumeTargets
                && self.interrupt_handler.as_deref() != Some(name.as_str())
            {
                return Err(VaxError::Configuration(format!(
                    "only the interrupt handler may compute handoffs; {name} does"
                )));
            }
            for target in agent.declared_handoffs() {
                if !agents.contains_key(target) {
                    return Err(VaxError::Configuration(format!(
                        "agent {name} hands off to unknown agent {target}"
                    )));
                }
            }
            for binding in &agent.agent_tools {
                if !agents.contains_key(&binding.agent) {
                    return Err(VaxError::Configuration(format!(
                        "agent {name} exposes unknown agent {} as tool {}",
                        binding.agent, binding.tool_name
                    )));
                }
            }
        }

        Ok(AgentRegistry {
            agents,
            order,
            entry: self.entry,
            interrupt_handler: self.interrupt_handler,
        })
    }
}
