//! Streamed multi-agent runner.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{RawResponse, RunEvent, RunItem};
use crate::agent::policy::{handoff_target, handoff_tool_name, take_handoff};
use crate::agent::{AgentDefinition, AgentRegistry, AgentToolBinding};
use crate::context::SharedContext;
use crate::error::{Result, VaxError};
use crate::provider::{ModelProvider, ProviderRequest, ToolChoice, ToolDefinition};
use crate::tools::{AgentToolParameters, ToolArguments, ToolExecutionContext, ToolOutput, ToolRegistry};
use crate::types::{AgentToolCall, GenerationSettings, ModelMessage, StreamEventType, ToolCallDelta};
use crate::util::timeout::with_timeout;

pub const DEFAULT_MAX_TURNS: usize = 20;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);
const SUB_AGENT_MAX_TURNS: usize = 10;
const MULTIPLE_HANDOFFS: &str = "Multiple handoffs detected, ignoring this one.";
pub const TOOL_FAILURE_PREFIX: &str = "An error occurred while running the tool: ";

/// Request payload to start a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Agent the run starts at.
    pub agent: String,
    /// Prior transcript plus the new user message.
    pub input: Vec<ModelMessage>,
    pub context: SharedContext,
    pub max_turns: usize,
}

impl RunRequest {
    pub fn new(agent: impl Into<String>, input: Vec<ModelMessage>, context: SharedContext) -> Self {
        Self {
            agent: agent.into(),
            input,
            context,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// What is known about a run once its events are exhausted.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub transcript: Vec<ModelMessage>,
    pub current_agent: String,
    /// Leading transcript entries that were run input rather than output.
    pub input_len: usize,
}

impl RunState {
    pub fn new(agent: impl Into<String>, transcript: Vec<ModelMessage>) -> Self {
        Self {
            transcript,
            current_agent: agent.into(),
            input_len: 0,
        }
    }

    pub fn with_input_len(mut self, input_len: usize) -> Self {
        self.input_len = input_len;
        self
    }
}

/// A streamed run: the event stream plus accessors valid after exhaustion.
pub struct RunStreaming {
    events: BoxStream<'static, Result<RunEvent>>,
    state: Arc<Mutex<RunState>>,
}

impl RunStreaming {
    pub fn new(events: BoxStream<'static, Result<RunEvent>>, state: Arc<Mutex<RunState>>) -> Self {
        Self { events, state }
    }

    /// Agent active when the run ended.
    pub fn current_agent(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_agent
            .clone()
    }

    /// Messages the run appended after its input.
    pub fn new_items(&self) -> Vec<ModelMessage> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .transcript
            .get(state.input_len..)
            .unwrap_or_default()
            .to_vec()
    }

    /// Full transcript of the run, input included.
    pub fn to_input_list(&self) -> Vec<ModelMessage> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transcript
            .clone()
    }
}

impl Stream for RunStreaming {
    type Item = Result<RunEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RunStreaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStreaming")
            .field("current_agent", &self.current_agent())
            .finish_non_exhaustive()
    }
}

/// Produces streamed runs over the agent graph.
pub trait RunEngine: Send + Sync {
    fn run_streamed(&self, request: RunRequest) -> RunStreaming;
}

/// Default run engine: a model/tool loop with handoffs between agents.
#[derive(Clone)]
pub struct LoopRunner {
    registry: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn ModelProvider>,
    settings: GenerationSettings,
    tool_timeout: Duration,
}

impl LoopRunner {
    /// Fails when an agent binds a tool the registry does not provide.
    pub fn new(
        registry: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn ModelProvider>,
    ) -> Result<Self> {
        registry.validate_tools(&tools)?;
        Ok(Self {
            registry,
            tools,
            provider,
            settings: GenerationSettings::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        })
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    fn turn_request(
        &self,
        agent: &AgentDefinition,
        instructions: String,
        transcript: &[ModelMessage],
        handoffs: &[String],
        forced: Option<String>,
    ) -> ProviderRequest {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ModelMessage::system(instructions));
        messages.extend(transcript.iter().cloned());

        let mut tools = self.tools.definitions(&agent.tools);
        tools.extend(agent.agent_tools.iter().map(agent_tool_definition));
        tools.extend(
            handoffs
                .iter()
                .filter_map(|target| self.registry.get(target))
                .map(|target| handoff_definition(target)),
        );

        let mut request = ProviderRequest::new(messages)
            .with_settings(self.settings.clone())
            .with_tools(tools);
        if let Some(name) = forced {
            request = request.with_tool_choice(ToolChoice::Function(name));
        }
        request
    }

    async fn execute_tool(
        &self,
        agent: &AgentDefinition,
        call: &AgentToolCall,
        context: &SharedContext,
    ) -> Result<ToolOutput> {
        if !agent.tools.iter().any(|t| t == &call.name) {
            return Err(VaxError::tool(
                &call.name,
                format!("tool not available to {}", agent.name),
            ));
        }
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| VaxError::tool(&call.name, "tool not registered"))?;
        let exec_ctx = {
            let ctx = context.lock().await;
            ToolExecutionContext::from_context(&ctx, &agent.name, &call.id)
        };
        let args = ToolArguments::new(call.arguments.clone());
        // Failures inside the tool go back to the model as text; only an
        // elapsed call aborts the run.
        let output = match with_timeout(self.tool_timeout, tool.execute(&args, &exec_ctx)).await {
            Ok(output) => output,
            Err(e @ VaxError::Timeout(_)) => return Err(e),
            Err(e) => {
                warn!(agent = %agent.name, tool = %call.name, error = %e, "tool failed");
                ToolOutput::text(format!("{TOOL_FAILURE_PREFIX}{e}"))
            }
        };
        apply_output(context, &output).await;
        Ok(output)
    }

    /// Run `binding.agent` to completion on a one-message transcript.
    async fn complete_sub_agent(
        &self,
        binding: &AgentToolBinding,
        call: &AgentToolCall,
        context: &SharedContext,
    ) -> Result<ToolOutput> {
        let sub_agent = Arc::clone(self.registry.resolve(&binding.agent)?);
        let args = ToolArguments::new(call.arguments.clone());
        let query = match args.get_str_opt("input") {
            Some(input) => input.to_string(),
            None => args.raw().to_string(),
        };
        debug!(agent = %sub_agent.name, tool = %binding.tool_name, "running agent tool");

        let mut transcript = vec![ModelMessage::user(query)];
        let mut forced = sub_agent.forced_tool.clone();
        for _ in 0..SUB_AGENT_MAX_TURNS {
            let instructions = {
                let ctx = context.lock().await;
                sub_agent.instructions.render(&ctx.snapshot())
            };
            let request =
                self.turn_request(&sub_agent, instructions, &transcript, &[], forced.take());
            let response = self.provider.generate_text(&request).await?;
            if response.tool_calls.is_empty() {
                return Ok(ToolOutput::text(response.text));
            }

            transcript.push(ModelMessage::assistant_tool_calls(
                response.text,
                response.tool_calls.clone(),
            ));
            for inner in &response.tool_calls {
                let output = self.execute_tool(&sub_agent, inner, context).await?;
                transcript.push(ModelMessage::tool_result(&inner.id, output.model_text()));
            }
        }
        Err(VaxError::MaxTurnsExceeded(SUB_AGENT_MAX_TURNS))
    }
}

impl RunEngine for LoopRunner {
    fn run_streamed(&self, request: RunRequest) -> RunStreaming {
        let state = Arc::new(Mutex::new(
            RunState::new(request.agent.clone(), request.input.clone())
                .with_input_len(request.input.len()),
        ));
        let shared = Arc::clone(&state);
        let this = self.clone();

        let events = async_stream::try_stream! {
            let RunRequest { agent, input, context, max_turns } = request;
            let mut agent = Arc::clone(this.registry.resolve(&agent)?);
            let mut transcript = input;

            context.lock().await.current_agent = Some(agent.name.clone());
            yield RunEvent::agent_updated(&agent.name);

            let mut forced = agent.forced_tool.clone();
            let mut turns = 0usize;
            loop {
                if turns >= max_turns {
                    Err::<(), _>(VaxError::MaxTurnsExceeded(max_turns))?;
                }
                turns += 1;

                let (instructions, resume_targets) = {
                    let ctx = context.lock().await;
                    (agent.instructions.render(&ctx.snapshot()), ctx.resume_targets.clone())
                };
                let handoffs = this.registry.outgoing(&agent, &resume_targets);
                let provider_request =
                    this.turn_request(&agent, instructions, &transcript, &handoffs, forced.take());
                debug!(agent = %agent.name, turn = turns, tools = provider_request.tools.len(), "model turn");

                let mut stream = this.provider.stream_text(&provider_request).await?;
                let mut text = String::new();
                let mut pending: BTreeMap<usize, PendingCall> = BTreeMap::new();
                while let Some(delta) = stream.next().await {
                    let delta = delta?;
                    match delta.event_type {
                        StreamEventType::TextDelta => {
                            if !delta.text.is_empty() {
                                text.push_str(&delta.text);
                                yield RunEvent::text_delta(delta.text);
                            }
                        }
                        StreamEventType::ToolCallDelta => {
                            if let Some(fragment) = delta.tool_call {
                                pending.entry(fragment.index).or_default().absorb(fragment);
                            }
                        }
                        StreamEventType::Done => break,
                        StreamEventType::Error => {
                            Err::<(), _>(VaxError::Stream(delta.text))?;
                        }
                    }
                }

                if !text.is_empty() {
                    yield RunEvent::RawResponse(RawResponse::ContentPartDone);
                    yield RunEvent::RunItem(RunItem::MessageOutput {
                        agent: agent.name.clone(),
                        text: text.clone(),
                    });
                }

                let calls: Vec<AgentToolCall> = pending.into_values().map(PendingCall::finish).collect();
                if calls.is_empty() {
                    if !text.is_empty() {
                        transcript.push(ModelMessage::assistant(text).with_agent(&agent.name));
                    }
                    break;
                }
                transcript.push(
                    ModelMessage::assistant_tool_calls(text, calls.clone()).with_agent(&agent.name),
                );

                let mut next_agent: Option<Arc<AgentDefinition>> = None;
                for call in &calls {
                    if let Some(target) = handoff_target(&call.name) {
                        if next_agent.is_some() {
                            warn!(agent = %agent.name, target, "ignoring extra handoff");
                            transcript.push(ModelMessage::tool_result(&call.id, MULTIPLE_HANDOFFS));
                            continue;
                        }
                        yield RunEvent::RunItem(RunItem::HandoffCall {
                            agent: agent.name.clone(),
                            call: call.clone(),
                        });
                        take_handoff(&this.registry, &mut *context.lock().await, &agent.name, target)?;
                        transcript.push(ModelMessage::tool_result(
                            &call.id,
                            json!({ "assistant": target }).to_string(),
                        ));
                        yield RunEvent::RunItem(RunItem::HandoffOutput {
                            source: agent.name.clone(),
                            target: target.to_string(),
                        });
                        next_agent = Some(Arc::clone(this.registry.resolve(target)?));
                        continue;
                    }

                    yield RunEvent::RunItem(RunItem::ToolCall {
                        agent: agent.name.clone(),
                        call: call.clone(),
                    });
                    let output = match agent.agent_tool(&call.name) {
                        Some(binding) => this.complete_sub_agent(binding, call, &context).await?,
                        None => this.execute_tool(&agent, call, &context).await?,
                    };
                    transcript.push(ModelMessage::tool_result(&call.id, output.model_text()));
                    yield RunEvent::RunItem(RunItem::ToolCallOutput {
                        agent: agent.name.clone(),
                        call_id: call.id.clone(),
                        output: output.value,
                    });
                }

                if let Some(next) = next_agent {
                    agent = next;
                    forced = agent.forced_tool.clone();
                    yield RunEvent::agent_updated(&agent.name);
                }
            }

            debug!(agent = %agent.name, turns, "run complete");
            {
                let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                state.current_agent = agent.name.clone();
                state.transcript = transcript;
            }
        };

        RunStreaming::new(Box::pin(events), state)
    }
}

/// Record a tool's payload classification and restart request.
async fn apply_output(context: &SharedContext, output: &ToolOutput) {
    if output.kind.is_none() && !output.restart {
        return;
    }
    let mut ctx = context.lock().await;
    if let Some(kind) = output.kind {
        ctx.data_type = Some(kind);
    }
    if output.restart {
        ctx.restart = true;
    }
}

fn agent_tool_definition(binding: &AgentToolBinding) -> ToolDefinition {
    ToolDefinition {
        name: binding.tool_name.clone(),
        description: binding.description.clone(),
        parameters: AgentToolParameters::object()
            .string("input", "The question or request for the agent.", true)
            .build()
            .schema,
    }
}

fn handoff_definition(target: &AgentDefinition) -> ToolDefinition {
    let description = target
        .handoff_description
        .clone()
        .unwrap_or_else(|| format!("Handoff to the {} agent to handle the request.", target.name));
    ToolDefinition {
        name: handoff_tool_name(&target.name),
        description,
        parameters: AgentToolParameters::empty().schema,
    }
}

/// Tool call assembled from streamed fragments.
#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn absorb(&mut self, fragment: ToolCallDelta) {
        if let Some(id) = fragment.id {
            self.id = id;
        }
        if let Some(name) = fragment.name {
            self.name.push_str(&name);
        }
        self.arguments.push_str(&fragment.arguments);
    }

    fn finish(self) -> AgentToolCall {
        let arguments = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments)
                .unwrap_or(serde_json::Value::String(self.arguments))
        };
        let id = if self.id.is_empty() {
            format!("call_{}", Uuid::new_v4().simple())
        } else {
            self.id
        };
        AgentToolCall {
            id,
            name: self.name,
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_assemble_into_one_call() {
        let mut call = PendingCall::default();
        call.absorb(ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("get_available_slots_tool".into()),
            arguments: "{\"clinic\":".into(),
        });
        call.absorb(ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: "\"Bukit Batok\"}".into(),
        });
        let call = call.finish();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "get_available_slots_tool");
        assert_eq!(call.arguments, json!({"clinic": "Bukit Batok"}));
    }

    #[test]
    fn missing_id_and_arguments_get_defaults() {
        let call = PendingCall {
            name: "transfer_to_triage_agent".into(),
            ..Default::default()
        }
        .finish();
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn handoff_tool_uses_target_description() {
        let target = AgentDefinition::new("clinic_agent", "find clinics")
            .with_handoff_description("Finds clinics.");
        let def = handoff_definition(&target);
        assert_eq!(def.name, "transfer_to_clinic_agent");
        assert_eq!(def.description, "Finds clinics.");
    }
}
