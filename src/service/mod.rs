//! Turn pipeline: request → context → run engine → event translator.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::policy::restore_interrupt_state;
use crate::agent::{vaccination_registry, AgentRegistry};
use crate::agent_loop::{LoopRunner, RunEngine, RunRequest, DEFAULT_MAX_TURNS};
use crate::config::VaxConfig;
use crate::context::ConversationContext;
use crate::error::Result;
use crate::language::{BackendLanguageDetector, LanguageDetector};
use crate::provider::{ModelProvider, OpenAiProvider};
use crate::tools::{vaccination_toolset, BackendClient, HealthHubClient};
use crate::translator::{EventTranslator, ResponseMode};
use crate::types::{ModelMessage, ResponseChunk};

/// One inbound chat or voice turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    /// Transcript returned by the previous turn's terminating chunk.
    #[serde(default)]
    pub history: Option<Vec<ModelMessage>>,
    /// Agent to resume at; the entry agent when absent.
    #[serde(default)]
    pub agent_name: Option<String>,
    pub auth_token: String,
    #[serde(default)]
    pub session_id: String,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: None,
            agent_name: None,
            auth_token: auth_token.into(),
            session_id: String::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ModelMessage>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_name = Some(agent.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Stateless across requests: every turn builds its own context.
#[derive(Clone)]
pub struct ChatService {
    registry: Arc<AgentRegistry>,
    engine: Arc<dyn RunEngine>,
    detector: Arc<dyn LanguageDetector>,
    translator: EventTranslator,
    max_turns: usize,
    reference_date: Option<NaiveDate>,
}

impl ChatService {
    pub fn new(
        registry: Arc<AgentRegistry>,
        engine: Arc<dyn RunEngine>,
        detector: Arc<dyn LanguageDetector>,
    ) -> Self {
        let translator = EventTranslator::new(Arc::clone(&registry), Arc::clone(&detector));
        Self {
            registry,
            engine,
            detector,
            translator,
            max_turns: DEFAULT_MAX_TURNS,
            reference_date: None,
        }
    }

    /// Wire the vaccination agents, tools and collaborators from configuration.
    pub fn from_config(config: &VaxConfig) -> Result<Self> {
        let registry = Arc::new(vaccination_registry()?);
        let provider: Arc<dyn ModelProvider> = Arc::new(OpenAiProvider::new(
            &config.model,
            &config.openai_api_key,
            Some(config.openai_base_url.clone()),
        ));
        let backend = Arc::new(
            BackendClient::new(&config.backend_url, config.tool_timeout)
                .with_onemap_url(&config.onemap_url),
        );
        let healthhub = config.healthhub.as_ref().map(|hh| {
            Arc::new(HealthHubClient::new(
                &hh.endpoint,
                &hh.session_id,
                config.tool_timeout,
            ))
        });
        let tools = Arc::new(vaccination_toolset(backend, Arc::clone(&provider), healthhub));
        let engine = LoopRunner::new(Arc::clone(&registry), tools, provider)?
            .with_tool_timeout(config.tool_timeout);
        let detector = Arc::new(BackendLanguageDetector::new(&config.backend_url));

        Ok(Self::new(registry, Arc::new(engine), detector).with_max_turns(config.max_turns))
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Pin "today" instead of reading the clock.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Start a turn. Request-level failures (unknown agent, bad token,
    /// language detection) surface here, before any chunk is produced.
    pub async fn stream_turn(
        &self,
        request: TurnRequest,
        mode: ResponseMode,
    ) -> Result<BoxStream<'static, Result<ResponseChunk>>> {
        let TurnRequest {
            message,
            history,
            agent_name,
            auth_token,
            session_id,
        } = request;

        let start_agent = match agent_name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => self.registry.resolve(name)?.name.clone(),
            None => self.registry.entry_name().to_string(),
        };

        let mut context = ConversationContext::new(auth_token)?;
        if let Some(date) = self.reference_date {
            context = context.with_reference_date(date);
        }
        let language = self.detector.detect(&message).await?;
        context = context.with_input_language(language);

        let mut transcript = history.unwrap_or_default();
        if self.registry.is_interrupt_handler(&start_agent) {
            restore_interrupt_state(&self.registry, &mut context, &transcript);
        }
        transcript.push(ModelMessage::user(message));

        info!(
            %session_id,
            agent = %start_agent,
            history = transcript.len() - 1,
            language = ?context.user_input_language,
            "turn started"
        );

        let context = context.into_shared();
        let run = self.engine.run_streamed(
            RunRequest::new(&start_agent, transcript, Arc::clone(&context))
                .with_max_turns(self.max_turns),
        );
        Ok(self.translator.translate(run, context, start_agent, mode))
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("entry", &self.registry.entry_name())
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}
