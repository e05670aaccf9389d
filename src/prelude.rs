//! Convenience re-exports for common use.

pub use crate::agent::{vaccination_registry, AgentDefinition, AgentRegistry};
pub use crate::agent_loop::{LoopRunner, RunEngine, RunEvent, RunRequest, RunStreaming};
pub use crate::audio::SpeechSynthesizer;
pub use crate::config::VaxConfig;
pub use crate::context::{ContextSnapshot, ConversationContext, PayloadKind, SharedContext};
pub use crate::error::{Result, VaxError};
pub use crate::language::LanguageDetector;
pub use crate::provider::ModelProvider;
pub use crate::service::{ChatService, TurnRequest};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolOutput};
pub use crate::translator::{EventTranslator, ResponseMode};
pub use crate::types::{EventType, ModelMessage, ResponseChunk, Role};
