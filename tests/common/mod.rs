//! Shared test helpers: a scripted model provider, language detector and speech synthesiser.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use vaxbot::agent::vaccination_registry;
use vaxbot::agent_loop::{LoopRunner, RunEvent, RunStreaming};
use vaxbot::audio::SpeechSynthesizer;
use vaxbot::error::VaxError;
use vaxbot::language::LanguageDetector;
use vaxbot::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use vaxbot::service::ChatService;
use vaxbot::tools::{vaccination_toolset, BackendClient};
use vaxbot::types::*;

enum ScriptedTurn {
    Deltas(Vec<TextStreamDelta>),
    Fail(String),
}

/// A provider that replays queued turns in order.
///
/// Streamed turns serve the run engine; completions serve `generate_text`
/// callers (agent tools and the vaccine name tool).
pub struct ScriptedProvider {
    model_id: String,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    completions: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    completion_requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model_id: "scripted-model".to_string(),
            turns: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            completion_requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue raw stream deltas for one model turn.
    pub fn queue_deltas(&self, deltas: Vec<TextStreamDelta>) {
        self.turns
            .lock()
            .unwrap()
            .push_back(ScriptedTurn::Deltas(deltas));
    }

    /// Queue a plain text turn, streamed word by word.
    pub fn queue_text(&self, text: &str) {
        let mut deltas: Vec<TextStreamDelta> = text
            .split_inclusive(' ')
            .map(TextStreamDelta::text)
            .collect();
        deltas.push(TextStreamDelta::done(Some(FinishReason::Stop)));
        self.queue_deltas(deltas);
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: Value) {
        self.queue_tool_calls(&[(id, name, args)]);
    }

    /// Queue one turn requesting several tool calls. Each call's arguments
    /// arrive split over two fragments.
    pub fn queue_tool_calls(&self, calls: &[(&str, &str, Value)]) {
        self.queue_deltas(tool_call_deltas("", calls));
    }

    /// Queue a turn with leading text followed by tool calls.
    pub fn queue_text_and_tool_calls(&self, text: &str, calls: &[(&str, &str, Value)]) {
        self.queue_deltas(tool_call_deltas(text, calls));
    }

    pub fn queue_handoff(&self, id: &str, target: &str) {
        self.queue_tool_call(id, &format!("transfer_to_{target}"), Value::Object(Default::default()));
    }

    /// The next `stream_text` call fails before streaming.
    pub fn queue_failure(&self, message: &str) {
        self.turns
            .lock()
            .unwrap()
            .push_back(ScriptedTurn::Fail(message.to_string()));
    }

    /// Queue a non-streamed text completion.
    pub fn queue_completion(&self, text: &str) {
        self.completions.lock().unwrap().push_back(ProviderResponse {
            text: text.to_string(),
            tool_calls: vec![],
            finish_reason: Some(FinishReason::Stop),
        });
    }

    /// Queue a non-streamed completion requesting one tool call.
    pub fn queue_completion_tool_call(&self, id: &str, name: &str, args: Value) {
        self.completions.lock().unwrap().push_back(ProviderResponse {
            text: String::new(),
            tool_calls: vec![AgentToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: Some(FinishReason::ToolCalls),
        });
    }

    /// Requests seen by `stream_text`, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests seen by `generate_text`, in order.
    pub fn completion_requests(&self) -> Vec<ProviderRequest> {
        self.completion_requests.lock().unwrap().clone()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_call_deltas(text: &str, calls: &[(&str, &str, Value)]) -> Vec<TextStreamDelta> {
    let mut deltas = Vec::new();
    if !text.is_empty() {
        deltas.push(TextStreamDelta::text(text));
    }
    for (index, (id, name, args)) in calls.iter().enumerate() {
        let args = args.to_string();
        let mid = (0..=args.len() / 2)
            .rev()
            .find(|i| args.is_char_boundary(*i))
            .unwrap_or(0);
        deltas.push(TextStreamDelta::tool_call(ToolCallDelta {
            index,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: args[..mid].to_string(),
        }));
        deltas.push(TextStreamDelta::tool_call(ToolCallDelta {
            index,
            id: None,
            name: None,
            arguments: args[mid..].to_string(),
        }));
    }
    deltas.push(TextStreamDelta::done(Some(FinishReason::ToolCalls)));
    deltas
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: &ProviderRequest) -> Result<ProviderResponse, VaxError> {
        self.completion_requests.lock().unwrap().push(request.clone());
        let next = self.completions.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ProviderResponse {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            finish_reason: Some(FinishReason::Stop),
        }))
    }

    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, VaxError>>, VaxError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.turns.lock().unwrap().pop_front();
        let deltas = match next {
            Some(ScriptedTurn::Deltas(deltas)) => deltas,
            Some(ScriptedTurn::Fail(message)) => return Err(VaxError::api(500, message)),
            None => vec![
                TextStreamDelta::text("Mock streamed response"),
                TextStreamDelta::done(Some(FinishReason::Stop)),
            ],
        };
        Ok(futures::stream::iter(deltas.into_iter().map(Ok)).boxed())
    }
}

/// Detector answering with a fixed language, or failing when built with `failing`.
pub struct ScriptedDetector {
    language: Option<String>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedDetector {
    pub fn new(language: &str) -> Self {
        Self {
            language: Some(language.to_string()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            language: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageDetector for ScriptedDetector {
    async fn detect(&self, text: &str) -> Result<String, VaxError> {
        self.inputs.lock().unwrap().push(text.to_string());
        self.language
            .clone()
            .ok_or_else(|| VaxError::LanguageDetection("detector offline".into()))
    }
}

/// Synthesiser that returns a readable marker instead of audio and records its inputs.
#[derive(Default)]
pub struct RecordingSpeech {
    texts: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSpeech {
    async fn read_text(&self, text: &str) -> Result<String, VaxError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(format!("audio:{}", text.trim()))
    }
}

/// "Today" used by every scenario.
pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// The vaccination engine over a scripted model and a mock backend.
pub fn vaccination_runner(provider: Arc<ScriptedProvider>, backend_url: &str) -> LoopRunner {
    let registry = Arc::new(vaccination_registry().unwrap());
    let backend = Arc::new(BackendClient::new(backend_url, Duration::from_secs(5)));
    let tools = Arc::new(vaccination_toolset(backend, provider.clone(), None));
    LoopRunner::new(registry, tools, provider).unwrap()
}

/// The full chat pipeline over a scripted model, a mock backend and a scripted detector.
pub fn chat_service(
    provider: Arc<ScriptedProvider>,
    backend_url: &str,
    detector: Arc<ScriptedDetector>,
) -> ChatService {
    let runner = vaccination_runner(provider, backend_url);
    let registry = runner.registry().clone();
    ChatService::new(registry, Arc::new(runner), detector).with_reference_date(reference_date())
}

/// Drain a run, returning its events and the error that ended it, if any.
pub async fn drain_run(run: &mut RunStreaming) -> (Vec<RunEvent>, Option<VaxError>) {
    let mut events = Vec::new();
    while let Some(event) = run.next().await {
        match event {
            Ok(event) => events.push(event),
            Err(e) => return (events, Some(e)),
        }
    }
    (events, None)
}

/// Drain a chunk stream, returning its chunks and the error that ended it, if any.
pub async fn drain_chunks(
    mut chunks: BoxStream<'static, Result<ResponseChunk, VaxError>>,
) -> (Vec<ResponseChunk>, Option<VaxError>) {
    let mut out = Vec::new();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => out.push(chunk),
            Err(e) => return (out, Some(e)),
        }
    }
    (out, None)
}

pub fn event_types(chunks: &[ResponseChunk]) -> Vec<EventType> {
    chunks.iter().map(|c| c.event_type).collect()
}
