//! Model-backed and third-party knowledge tools: vaccine name normalisation and HealthHub AI.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::tool::AgentTool;
use super::types::{AgentToolParameters, ToolOutput};
use crate::error::{Result, VaxError};
use crate::provider::http::shared_client;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::types::{GenerationSettings, ModelMessage};
use crate::util::timeout::with_timeout;

/// Official vaccine names the backend knows about.
pub const OFFICIAL_VACCINES: &[&str] = &[
    "Influenza (INF)",
    "Pneumococcal Conjugate (PCV13)",
    "Human Papillomavirus (HPV)",
    "Tetanus, Diphtheria, Pertussis (Tdap)",
    "Hepatitis B (HepB)",
    "Measles, Mumps, Rubella (MMR)",
    "Varicella (VAR)",
];

const NAME_SEED: u64 = 1234;
const NAME_MAX_TOKENS: u32 = 512;

fn standardise_prompt(requested: &str) -> String {
    let list = OFFICIAL_VACCINES
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The input may use an informal name; map it to the official name. \
         For example, \"flu vaccine\" maps to \"Influenza (INF)\".\n\n\
         Find the closest match of {requested} in this list:\n{list}\n\n\
         If there is a match, return the list value exactly.\n\
         Otherwise return \"Handoff to recommender_agent\".\n\n\
         Official vaccine name:"
    )
}

pub fn standardise_vaccine_name_tool(provider: Arc<dyn ModelProvider>) -> AgentTool {
    AgentTool::new(
        "standardise_vaccine_name_tool",
        "Maps an informal vaccine name to its official name. Always use when the step requires it.",
        AgentToolParameters::object()
            .string(
                "requested_vaccine",
                "Vaccine type found in the chat history",
                true,
            )
            .build(),
        move |args, _ctx| {
            let provider = provider.clone();
            async move {
                let requested = args.get_str("requested_vaccine")?.to_string();
                let request = ProviderRequest::new(vec![ModelMessage::system(standardise_prompt(
                    &requested,
                ))])
                .with_settings(
                    GenerationSettings::builder()
                        .temperature(0.0)
                        .seed(NAME_SEED)
                        .max_tokens(NAME_MAX_TOKENS)
                        .build(),
                );
                let response = provider.generate_text(&request).await?;
                let name = response.text.trim().to_string();
                debug!(requested = %requested, official = %name, "standardised vaccine name");
                if name == "None" {
                    return Ok(ToolOutput::text(name));
                }
                Ok(ToolOutput::value(json!({ "vaccine_name": name })))
            }
        },
    )
}

/// Connection details for the HealthHub AI chatbot.
#[derive(Debug, Clone)]
pub struct HealthHubClient {
    endpoint: String,
    session_id: String,
    timeout: Duration,
}

impl HealthHubClient {
    pub fn new(endpoint: impl Into<String>, session_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            timeout,
        }
    }

    fn request_body(query: &str, message_id: &str) -> Value {
        let b64 = |s: &str| BASE64.encode(s.as_bytes());
        json!({
            "persona": {
                "id": "tool_persona",
                "name": "HHAI Tool",
                "persona_type": "general",
                "gender": "male",
                "age": 30,
                "age_type": "years",
                "existing_conditions": "none",
                "persona_config": {},
            },
            "query": {
                "role": b64("user"),
                "content": b64(query),
                "query_type": b64("manual"),
                "message_id": b64(message_id),
            },
            "page_language": "english",
        })
    }

    /// Send one query and join the streamed answer.
    pub async fn ask(&self, query: &str) -> Result<String> {
        let body = Self::request_body(query, &uuid::Uuid::new_v4().to_string());
        with_timeout(self.timeout, async {
            let resp = shared_client()
                .post(&self.endpoint)
                .header("X-Session-Id", &self.session_id)
                .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
                .json(&body)
                .send()
                .await?;
            let status = resp.status().as_u16();
            let text = resp.text().await?;
            if !(200..300).contains(&status) {
                return Err(VaxError::api(status, text));
            }
            Ok(join_response_messages(&text))
        })
        .await
    }
}

/// Concatenate `response_message` from a body of back-to-back JSON objects.
/// A trailing partial object is ignored.
pub(crate) fn join_response_messages(body: &str) -> String {
    let mut answer = String::new();
    for value in serde_json::Deserializer::from_str(body).into_iter::<Value>() {
        match value {
            Ok(obj) => {
                if let Some(msg) = obj.get("response_message").and_then(Value::as_str) {
                    answer.push_str(msg);
                }
            }
            Err(e) => {
                debug!(error = %e, "partial HealthHub object");
                break;
            }
        }
    }
    answer
}

pub fn healthhub_ai_tool(client: Option<Arc<HealthHubClient>>) -> AgentTool {
    AgentTool::new(
        "healthhub_ai_tool",
        "Forwards a health-related question to the HealthHub AI chatbot.",
        AgentToolParameters::object()
            .string("user_query", "The health-related question to send", true)
            .build(),
        move |args, _ctx| {
            let client = client.clone();
            async move {
                let query = args.get_str("user_query")?.to_string();
                let Some(client) = client else {
                    return Ok(ToolOutput::text(
                        "HealthHub chatbot unavailable: not configured",
                    ));
                };
                match client.ask(&query).await {
                    Ok(answer) => Ok(ToolOutput::text(answer)),
                    Err(e) => {
                        warn!(error = %e, "HealthHub request failed");
                        Ok(ToolOutput::text(format!("HealthHub chatbot unavailable: {e}")))
                    }
                }
            }
        },
    )
}
