//! Configuration (layered: TOML file < environment).

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::audio::azure::{AzureSpeechConfig, DEFAULT_VOICE};
use crate::error::{Result, VaxError};
use crate::metrics::phoenix::{DEFAULT_ENDPOINT as DEFAULT_PHOENIX_ENDPOINT, DEFAULT_PROJECT};
use crate::provider::openai::DEFAULT_BASE_URL;
use crate::tools::backend::DEFAULT_ONEMAP_URL;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND: &str = "127.0.0.1:8001";
pub const DEFAULT_MAX_TURNS: usize = 20;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// HealthHub chatbot endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthHubConfig {
    pub endpoint: String,
    pub session_id: String,
}

/// Trace store used by the metrics endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct PhoenixConfig {
    pub api_key: String,
    pub endpoint: String,
    pub project: String,
}

impl fmt::Debug for PhoenixConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhoenixConfig")
            .field("api_key", &"..")
            .field("endpoint", &self.endpoint)
            .field("project", &self.project)
            .finish()
    }
}

/// Resolved service configuration.
#[derive(Clone)]
pub struct VaxConfig {
    pub backend_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub max_turns: usize,
    pub tool_timeout: Duration,
    pub bind: SocketAddr,
    pub onemap_url: String,
    pub healthhub: Option<HealthHubConfig>,
    pub speech: Option<AzureSpeechConfig>,
    pub phoenix: Option<PhoenixConfig>,
}

impl fmt::Debug for VaxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaxConfig")
            .field("backend_url", &self.backend_url)
            .field("openai_api_key", &"..")
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("tool_timeout", &self.tool_timeout)
            .field("bind", &self.bind)
            .field("onemap_url", &self.onemap_url)
            .field("healthhub", &self.healthhub)
            .field("speech", &self.speech.as_ref().map(|s| &s.region))
            .field("phoenix", &self.phoenix)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    model: Option<String>,
    max_turns: Option<usize>,
    tool_timeout_secs: Option<u64>,
    bind: Option<String>,
    onemap_url: Option<String>,
    #[serde(default)]
    healthhub: HealthHubSection,
    #[serde(default)]
    speech: SpeechSection,
    #[serde(default)]
    phoenix: PhoenixSection,
}

#[derive(Debug, Default, Deserialize)]
struct HealthHubSection {
    endpoint: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechSection {
    resource_id: Option<String>,
    region: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    voice: Option<String>,
    authority: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PhoenixSection {
    api_key: Option<String>,
    endpoint: Option<String>,
    project: Option<String>,
}

impl VaxConfig {
    /// Load `.env`, then the optional TOML file, then let the process
    /// environment override it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // .env is optional
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    VaxError::Configuration(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str::<FileConfig>(&text).map_err(|e| {
                    VaxError::Configuration(format!("invalid {}: {e}", path.display()))
                })?
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, env)
    }

    fn resolve(mut file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let layer = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = env(key) {
                *slot = Some(value);
            }
        };

        layer(&mut file.backend_url, "BACKEND_MAIN_API_URL");
        layer(&mut file.openai_api_key, "OPENAI_API_KEY");
        layer(&mut file.openai_base_url, "OPENAI_BASE_URL");
        layer(&mut file.model, "VAXBOT_MODEL");
        layer(&mut file.bind, "VAXBOT_BIND");
        layer(&mut file.onemap_url, "ONEMAP_URL");
        layer(&mut file.healthhub.endpoint, "AZURE_HHAI_CHAT_ENDPOINT");
        layer(&mut file.healthhub.session_id, "AZURE_HHAI_CHAT_SESSION_ID");
        layer(&mut file.speech.resource_id, "AZURE_SPEECH_SERVICE_ID");
        layer(&mut file.speech.region, "AZURE_SPEECH_SERVICE_LOCATION");
        layer(&mut file.speech.tenant_id, "AZURE_TENANT_ID");
        layer(&mut file.speech.client_id, "AZURE_CLIENT_ID");
        layer(&mut file.speech.client_secret, "AZURE_CLIENT_SECRET");
        layer(&mut file.speech.voice, "AZURE_SPEECH_VOICE");
        layer(&mut file.phoenix.api_key, "PHOENIX_API_KEY");
        layer(&mut file.phoenix.endpoint, "PHOENIX_COLLECTOR_ENDPOINT");
        layer(&mut file.phoenix.project, "PHOENIX_PROJECT");
        if let Some(value) = env("VAXBOT_MAX_TURNS") {
            file.max_turns = Some(parse_number("VAXBOT_MAX_TURNS", &value)?);
        }
        if let Some(value) = env("VAXBOT_TOOL_TIMEOUT_SECS") {
            file.tool_timeout_secs = Some(parse_number("VAXBOT_TOOL_TIMEOUT_SECS", &value)?);
        }

        let bind_text = file.bind.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_text
            .parse()
            .map_err(|e| VaxError::Configuration(format!("invalid bind address {bind_text}: {e}")))?;
        let max_turns = file.max_turns.unwrap_or(DEFAULT_MAX_TURNS);
        if max_turns == 0 {
            return Err(VaxError::Configuration("max_turns must be positive".into()));
        }

        Ok(Self {
            backend_url: required(file.backend_url, "BACKEND_MAIN_API_URL")?,
            openai_api_key: required(file.openai_api_key, "OPENAI_API_KEY")?,
            openai_base_url: file
                .openai_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_turns,
            tool_timeout: Duration::from_secs(
                file.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            ),
            bind,
            onemap_url: file
                .onemap_url
                .unwrap_or_else(|| DEFAULT_ONEMAP_URL.to_string()),
            healthhub: healthhub(file.healthhub)?,
            speech: speech(file.speech)?,
            phoenix: file.phoenix.api_key.map(|api_key| PhoenixConfig {
                api_key,
                endpoint: file
                    .phoenix
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_PHOENIX_ENDPOINT.to_string()),
                project: file
                    .phoenix
                    .project
                    .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            }),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| VaxError::Configuration(format!("{name} is not set")))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VaxError::Configuration(format!("invalid {name} {value:?}: {e}")))
}

fn healthhub(section: HealthHubSection) -> Result<Option<HealthHubConfig>> {
    match (section.endpoint, section.session_id) {
        (Some(endpoint), Some(session_id)) => Ok(Some(HealthHubConfig {
            endpoint,
            session_id,
        })),
        (None, None) => Ok(None),
        _ => Err(VaxError::Configuration(
            "HealthHub needs both AZURE_HHAI_CHAT_ENDPOINT and AZURE_HHAI_CHAT_SESSION_ID".into(),
        )),
    }
}

/// All five credentials or none; the voice alone does not enable speech.
fn speech(section: SpeechSection) -> Result<Option<AzureSpeechConfig>> {
    let SpeechSection {
        resource_id,
        region,
        tenant_id,
        client_id,
        client_secret,
        voice,
        authority,
        endpoint,
    } = section;
    match (resource_id, region, tenant_id, client_id, client_secret) {
        (Some(resource_id), Some(region), Some(tenant_id), Some(client_id), Some(client_secret)) => {
            Ok(Some(AzureSpeechConfig {
                resource_id,
                region,
                tenant_id,
                client_id,
                client_secret,
                voice: voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
                authority,
                endpoint,
            }))
        }
        (None, None, None, None, None) => Ok(None),
        _ => Err(VaxError::Configuration(
            "speech is partially configured: set AZURE_SPEECH_SERVICE_ID, \
             AZURE_SPEECH_SERVICE_LOCATION, AZURE_TENANT_ID, AZURE_CLIENT_ID \
             and AZURE_CLIENT_SECRET together"
                .into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("BACKEND_MAIN_API_URL", "http://backend"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = VaxConfig::load_with(None, env(&REQUIRED)).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_turns, 20);
        assert_eq!(config.tool_timeout, Duration::from_secs(10));
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert!(config.speech.is_none());
        assert!(config.phoenix.is_none());
        assert!(config.healthhub.is_none());
    }

    #[test]
    fn missing_backend_is_a_configuration_error() {
        let err = VaxConfig::load_with(None, env(&[("OPENAI_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, VaxError::Configuration(ref m) if m.contains("BACKEND_MAIN_API_URL")));
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend_url = \"http://from-file\"\nopenai_api_key = \"file-key\"\nmodel = \"gpt-4o\"\nmax_turns = 8\n\n[phoenix]\napi_key = \"px\""
        )
        .unwrap();
        let config = VaxConfig::load_with(
            Some(file.path()),
            env(&[("BACKEND_MAIN_API_URL", "http://from-env")]),
        )
        .unwrap();
        assert_eq!(config.backend_url, "http://from-env");
        assert_eq!(config.openai_api_key, "file-key");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_turns, 8);
        let phoenix = config.phoenix.unwrap();
        assert_eq!(phoenix.project, DEFAULT_PROJECT);
        assert_eq!(phoenix.endpoint, DEFAULT_PHOENIX_ENDPOINT);
    }

    #[test]
    fn partial_speech_group_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AZURE_SPEECH_SERVICE_ID", "res"));
        let err = VaxConfig::load_with(None, env(&pairs)).unwrap_err();
        assert!(matches!(err, VaxError::Configuration(_)));
    }

    #[test]
    fn complete_speech_group_defaults_voice() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("AZURE_SPEECH_SERVICE_ID", "res"),
            ("AZURE_SPEECH_SERVICE_LOCATION", "southeastasia"),
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_CLIENT_SECRET", "s"),
        ]);
        let speech = VaxConfig::load_with(None, env(&pairs)).unwrap().speech.unwrap();
        assert_eq!(speech.voice, DEFAULT_VOICE);
        assert_eq!(speech.region, "southeastasia");
    }

    #[test]
    fn bad_numbers_are_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("VAXBOT_MAX_TURNS", "lots"));
        let err = VaxConfig::load_with(None, env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("VAXBOT_MAX_TURNS"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"typo\"").unwrap();
        let err = VaxConfig::load_with(Some(file.path()), env(&REQUIRED)).unwrap_err();
        assert!(matches!(err, VaxError::Configuration(_)));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = VaxConfig::load_with(None, env(&REQUIRED)).unwrap();
        assert!(!format!("{config:?}").contains("sk-test"));
    }
}
