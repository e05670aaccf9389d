//! Azure Speech REST synthesiser authenticated with an Entra ID app token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{normalize_markdown, SpeechSynthesizer};
use crate::error::VaxError;
use crate::provider::http::shared_client;
use crate::util::timeout::with_timeout;

pub const DEFAULT_VOICE: &str = "en-US-EmmaNeural";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const TOKEN_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
const OUTPUT_FORMAT: &str = "audio-16khz-32kbitrate-mono-mp3";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Credentials and target of the speech resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureSpeechConfig {
    pub resource_id: String,
    pub region: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Token authority, defaults to [`DEFAULT_AUTHORITY`].
    #[serde(default)]
    pub authority: Option<String>,
    /// Synthesis endpoint, defaults to the regional TTS host.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

impl AzureSpeechConfig {
    fn token_url(&self) -> String {
        let authority = self.authority.as_deref().unwrap_or(DEFAULT_AUTHORITY);
        format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    fn synthesis_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/cognitiveservices/v1", endpoint.trim_end_matches('/')),
            None => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            ),
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Process-wide synthesiser. The token is refreshed under a lock, so
/// concurrent synthesis calls never read a half-refreshed credential.
#[derive(Debug)]
pub struct AzureSpeechSynthesizer {
    config: AzureSpeechConfig,
    token: Mutex<CachedToken>,
    timeout: Duration,
}

impl AzureSpeechSynthesizer {
    /// Acquire the first token and build the synthesiser.
    pub async fn initialize(config: AzureSpeechConfig) -> Result<Self, VaxError> {
        let token = fetch_token(&config).await?;
        debug!(region = %config.region, voice = %config.voice, "speech synthesiser ready");
        Ok(Self {
            config,
            token: Mutex::new(token),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `aad#<resource>#<token>`, refreshed when it expires within a minute.
    async fn auth_token(&self) -> Result<String, VaxError> {
        let mut cached = self.token.lock().await;
        if cached.expires_at <= Instant::now() + REFRESH_MARGIN {
            debug!("refreshing speech token");
            *cached = fetch_token(&self.config).await?;
        }
        Ok(format!("aad#{}#{}", self.config.resource_id, cached.value))
    }

    fn ssml(&self, text: &str) -> String {
        format!(
            "<speak version='1.0' xml:lang='en-US'><voice name='{}'>{}</voice></speak>",
            escape_xml(&self.config.voice),
            escape_xml(text)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    async fn read_text(&self, text: &str) -> Result<String, VaxError> {
        let auth = self.auth_token().await?;
        let body = self.ssml(&normalize_markdown(text));
        let auth = HeaderValue::from_str(&format!("Bearer {auth}"))
            .map_err(|e| VaxError::SpeechSynthesis(format!("invalid token: {e}")))?;

        let audio = with_timeout(self.timeout, async {
            let resp = shared_client()
                .post(self.config.synthesis_url())
                .header(AUTHORIZATION, auth)
                .header(CONTENT_TYPE, "application/ssml+xml")
                .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
                .header(USER_AGENT, "vaxbot")
                .body(body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                return Err(VaxError::SpeechSynthesis(format!(
                    "status {}: {detail}",
                    status.as_u16()
                )));
            }
            Ok(resp.bytes().await?)
        })
        .await?;

        Ok(base64::engine::general_purpose::STANDARD.encode(audio))
    }
}

async fn fetch_token(config: &AzureSpeechConfig) -> Result<CachedToken, VaxError> {
    let resp = shared_client()
        .post(config.token_url())
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("scope", TOKEN_SCOPE),
        ])
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let detail = resp.text().await.unwrap_or_default();
        return Err(VaxError::Authentication(format!(
            "speech token request failed ({}): {detail}",
            status.as_u16()
        )));
    }
    let token: TokenResponse = resp.json().await?;
    Ok(CachedToken {
        value: token.access_token,
        expires_at: Instant::now() + Duration::from_secs(token.expires_in),
    })
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
