//! Event translator: turns a run's event stream into response chunks.
//!
//! Every chunk carries the acting agent and a snapshot of the context taken
//! when the chunk is built. The run is exhausted before the single
//! `terminating` chunk is emitted; engine errors propagate unchanged and no
//! terminating chunk follows them.

use std::sync::{Arc, OnceLock};

use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use tracing::debug;

use crate::agent::policy::resolve_next_agent;
use crate::agent::AgentRegistry;
use crate::agent_loop::{RawResponse, RunEvent, RunItem, RunStreaming};
use crate::audio::SpeechSynthesizer;
use crate::context::SharedContext;
use crate::error::Result;
use crate::language::LanguageDetector;
use crate::types::{last_assistant_text, EventType, ResponseChunk};

/// How the response is delivered.
#[derive(Clone, Default)]
pub enum ResponseMode {
    /// Text only; the terminating chunk carries the response language.
    #[default]
    Chat,
    /// Text plus synthesised audio when a synthesiser is available.
    Voice(Option<Arc<dyn SpeechSynthesizer>>),
}

impl ResponseMode {
    fn synthesizer(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        match self {
            Self::Chat => None,
            Self::Voice(synth) => synth.clone(),
        }
    }
}

impl std::fmt::Debug for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => f.write_str("Chat"),
            Self::Voice(synth) => write!(f, "Voice(speech: {})", synth.is_some()),
        }
    }
}

/// A delta ends a sentence when punctuation is followed by whitespace.
pub fn ends_sentence(delta: &str) -> bool {
    static BOUNDARY: OnceLock<Option<Regex>> = OnceLock::new();
    BOUNDARY
        .get_or_init(|| Regex::new(r"[.,!?。，！？:\n]\s").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(delta))
}

#[derive(Clone)]
pub struct EventTranslator {
    registry: Arc<AgentRegistry>,
    detector: Arc<dyn LanguageDetector>,
}

impl EventTranslator {
    pub fn new(registry: Arc<AgentRegistry>, detector: Arc<dyn LanguageDetector>) -> Self {
        Self { registry, detector }
    }

    /// Translate `run`, which started at `start_agent`, into response chunks.
    pub fn translate(
        &self,
        mut run: RunStreaming,
        context: SharedContext,
        start_agent: String,
        mode: ResponseMode,
    ) -> BoxStream<'static, Result<ResponseChunk>> {
        let registry = Arc::clone(&self.registry);
        let detector = Arc::clone(&self.detector);
        let speech = mode.synthesizer();
        let chat = matches!(mode, ResponseMode::Chat);

        let chunks = async_stream::try_stream! {
            let mut agent = start_agent;
            let mut message = String::new();
            let mut pending_speech = String::new();

            while let Some(event) = run.next().await {
                match event? {
                    RunEvent::RawResponse(RawResponse::TextDelta { delta }) => {
                        message.push_str(&delta);
                        pending_speech.push_str(&delta);
                        let mut audio = None;
                        if let Some(synth) = &speech {
                            if ends_sentence(&delta) {
                                audio = Some(synth.read_text(&pending_speech).await?);
                                pending_speech.clear();
                            }
                        }
                        let snapshot = context.lock().await.snapshot();
                        yield ResponseChunk::new(EventType::DeltaText, &agent, snapshot)
                            .with_message(&message)
                            .with_delta(delta)
                            .with_audio(audio);
                    }
                    RunEvent::RawResponse(RawResponse::ContentPartDone) => {
                        message.push('\n');
                        let mut audio = None;
                        if let Some(synth) = &speech {
                            if !pending_speech.trim().is_empty() {
                                audio = Some(synth.read_text(&pending_speech).await?);
                            }
                        }
                        pending_speech.clear();
                        let snapshot = context.lock().await.snapshot();
                        yield ResponseChunk::new(EventType::CompletedText, &agent, snapshot)
                            .with_message(&message)
                            .with_audio(audio);
                    }
                    RunEvent::RawResponse(RawResponse::Other) => {}
                    RunEvent::AgentUpdated { new_agent } => {
                        let snapshot = {
                            let mut ctx = context.lock().await;
                            ctx.current_agent = Some(new_agent.clone());
                            ctx.snapshot()
                        };
                        agent = new_agent;
                        yield ResponseChunk::new(EventType::NewAgent, &agent, snapshot)
                            .with_message(&message);
                    }
                    RunEvent::RunItem(RunItem::ToolCall { agent: caller, call }) => {
                        let snapshot = context.lock().await.snapshot();
                        yield ResponseChunk::new(EventType::ToolCall, caller, snapshot)
                            .with_message(call.name);
                    }
                    RunEvent::RunItem(RunItem::ToolCallOutput { agent: caller, output, .. }) => {
                        if !registry.publishes_tool_output(&caller) {
                            continue;
                        }
                        let (kind, snapshot) = {
                            let mut ctx = context.lock().await;
                            ctx.data = Some(output.clone());
                            (ctx.data_type, ctx.snapshot())
                        };
                        yield ResponseChunk::new(EventType::ToolCallOutput, caller, snapshot)
                            .with_payload(kind, output);
                    }
                    RunEvent::RunItem(_) => {}
                }
            }

            let history = run.to_input_list();
            let (next_agent, snapshot) = {
                let mut ctx = context.lock().await;
                let next = resolve_next_agent(&registry, &mut ctx, &run.current_agent());
                (next, ctx.snapshot())
            };
            // Replayed history does not count.
            let response_language = match last_assistant_text(&run.new_items()) {
                Some(text) if chat => Some(detector.detect(&text).await?),
                _ => None,
            };
            debug!(agent = %next_agent, messages = history.len(), "run translated");
            yield ResponseChunk::new(EventType::Terminating, next_agent, snapshot)
                .with_history(history)
                .with_response_language(response_language);
        };

        Box::pin(chunks)
    }
}
