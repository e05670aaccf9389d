//! Agent graph: definitions, registry, handoff policy, and the vaccination catalog.

pub mod agent;
pub mod catalog;
pub mod policy;
pub mod prompts;
pub mod registry;

pub use agent::{AgentDefinition, AgentToolBinding, HandoffSource, Instructions};
pub use catalog::vaccination_registry;
pub use policy::{take_handoff, HandoffKind};
pub use registry::{AgentRegistry, RegistryBuilder};
