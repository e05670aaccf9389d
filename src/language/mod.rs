//! Language detection for user input and assistant replies.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::VaxError;
use crate::provider::http::shared_client;
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maps text to a language tag such as `en` or `zh`.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, text: &str) -> Result<String, VaxError>;
}

/// Detector backed by the booking backend's `/translate/get_language` endpoint.
#[derive(Debug, Clone)]
pub struct BackendLanguageDetector {
    url: String,
    timeout: Duration,
}

impl BackendLanguageDetector {
    pub fn new(backend_url: &str) -> Self {
        Self {
            url: format!("{}/translate/get_language", backend_url.trim_end_matches('/')),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LanguageDetector for BackendLanguageDetector {
    async fn detect(&self, text: &str) -> Result<String, VaxError> {
        let body = with_timeout(self.timeout, async {
            let resp = shared_client()
                .post(&self.url)
                .json(&json!({ "text": text }))
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                return Err(VaxError::LanguageDetection(format!(
                    "{} - {detail}",
                    status.as_u16()
                )));
            }
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        let language = language_tag(&body)
            .ok_or_else(|| VaxError::LanguageDetection(format!("unexpected response: {body}")))?;
        debug!(%language, "detected language");
        Ok(language)
    }
}

/// The endpoint answers with a bare JSON string; `{"language": ..}` is accepted too.
fn language_tag(body: &Value) -> Option<String> {
    match body {
        Value::String(tag) if !tag.trim().is_empty() => Some(tag.trim().to_string()),
        Value::Object(map) => map
            .get("language")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
