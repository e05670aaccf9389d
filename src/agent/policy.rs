//! Handoff/interrupt graph policy.
//!
//! Every handoff goes through [`take_handoff`], which validates the edge and
//! applies its side effects to the run's context. Entering the interrupt
//! handler records the interrupted agent and recomputes the handler's resume
//! targets to exactly `{entry, interrupted}`. The set is overwritten on every
//! interrupt, so only the most recent interruption can be resumed.

use tracing::{debug, info};

use super::registry::AgentRegistry;
use crate::context::ConversationContext;
use crate::error::{Result, VaxError};
use crate::types::{ModelMessage, Role};

/// Prefix of the synthetic tool the model calls to hand off.
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

pub fn handoff_tool_name(agent: &str) -> String {
    format!("{HANDOFF_TOOL_PREFIX}{agent}")
}

/// Target agent of a handoff tool name.
pub fn handoff_target(tool_name: &str) -> Option<&str> {
    tool_name.strip_prefix(HANDOFF_TOOL_PREFIX)
}

/// Kind of a completed handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffKind {
    Ordinary,
    Interrupt,
}

/// Resume targets after interrupting `interrupted`: the entry agent, plus the
/// interrupted agent when it resolves.
pub fn interrupt_resume_targets(registry: &AgentRegistry, interrupted: Option<&str>) -> Vec<String> {
    let mut targets = vec![registry.entry_name().to_string()];
    if let Some(name) = interrupted {
        if registry.contains(name) && name != registry.entry_name() {
            targets.push(name.to_string());
        }
    }
    targets
}

/// Validate and apply the handoff `from → to`.
pub fn take_handoff(
    registry: &AgentRegistry,
    ctx: &mut ConversationContext,
    from: &str,
    to: &str,
) -> Result<HandoffKind> {
    let source = registry.resolve(from)?;
    let edges = registry.outgoing(source, &ctx.resume_targets);
    if !edges.iter().any(|e| e == to) {
        return Err(VaxError::InvalidHandoff {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    registry.resolve(to)?;

    let kind = if registry.is_interrupt_handler(to) {
        ctx.interrupted_agent = Some(from.to_string());
        ctx.resume_targets = interrupt_resume_targets(registry, Some(from));
        HandoffKind::Interrupt
    } else {
        HandoffKind::Ordinary
    };
    ctx.current_agent = Some(to.to_string());

    info!(agent = from, target = to, interrupt = kind == HandoffKind::Interrupt, "handoff");
    Ok(kind)
}

/// Next entry agent once a run is exhausted. Terminal agents and a set restart
/// flag send the next turn to the entry agent; the flag is cleared either way.
pub fn resolve_next_agent(
    registry: &AgentRegistry,
    ctx: &mut ConversationContext,
    last_agent: &str,
) -> String {
    let reset = registry.is_terminal(last_agent) || ctx.restart;
    ctx.restart = false;
    if reset {
        debug!(agent = last_agent, "flow finished, next turn starts at entry");
        registry.entry_name().to_string()
    } else {
        last_agent.to_string()
    }
}

/// Rebuild interrupt bookkeeping from a replayed transcript.
///
/// Contexts are rebuilt per request, so a turn that starts at the interrupt
/// handler would otherwise only be able to reach the entry agent. The last
/// handoff into the handler in the history names the agent it interrupted.
pub fn restore_interrupt_state(
    registry: &AgentRegistry,
    ctx: &mut ConversationContext,
    transcript: &[ModelMessage],
) {
    let Some(handler) = registry.interrupt_handler() else {
        return;
    };
    let handoff_tool = handoff_tool_name(handler);
    let interrupted = transcript
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find(|m| m.tool_calls().iter().any(|tc| tc.name == handoff_tool))
        .and_then(|m| m.name.clone());
    if let Some(name) = interrupted {
        debug!(interrupted = %name, "restored interrupt state from history");
        ctx.resume_targets = interrupt_resume_targets(registry, Some(&name));
        ctx.interrupted_agent = Some(name);
    }
}
