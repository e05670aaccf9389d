//! Per-conversation state threaded through every agent and tool invocation.
//!
//! A [`ConversationContext`] is built fresh for each request and owned by
//! exactly one run. The engine and the event translator share it through a
//! [`SharedContext`]; everything that only needs to *read* it (instruction
//! templates, tools) works from an immutable [`ContextSnapshot`].

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::Mutex;

use crate::error::{Result, VaxError};

/// Context handle shared by the engine and the translator of a single run.
pub type SharedContext = Arc<Mutex<ConversationContext>>;

/// Classification of the last structured tool payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PayloadKind {
    #[serde(rename = "booking_details")]
    #[strum(serialize = "booking_details")]
    Booking,
    #[serde(rename = "cancel_details")]
    #[strum(serialize = "cancel_details")]
    Cancellation,
    #[serde(rename = "reschedule_details")]
    #[strum(serialize = "reschedule_details")]
    Reschedule,
}

/// Opaque credential bag forwarded to backend calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    token: String,
}

impl AuthHeader {
    /// Wrap a bearer token. Empty tokens are rejected.
    pub fn bearer(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(VaxError::InvalidArgument(
                "auth token cannot be empty".to_string(),
            ));
        }
        Ok(Self { token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Headers for a JSON backend request.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            headers.insert(AUTHORIZATION, val);
        }
        headers
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader").field("token", &"..").finish()
    }
}

/// Mutable per-run state.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub auth: AuthHeader,
    /// "Today" for every date computation in the run.
    pub reference_date: NaiveDate,
    pub user_input_language: Option<String>,
    /// Written whenever a handoff completes.
    pub current_agent: Option<String>,
    /// Written only when a handoff into the interrupt handler occurs.
    pub interrupted_agent: Option<String>,
    /// Set to force the next turn back to the entry agent.
    pub restart: bool,
    pub data: Option<serde_json::Value>,
    pub data_type: Option<PayloadKind>,
    /// Edges the interrupt handler may take, recomputed on every interrupt handoff.
    pub resume_targets: Vec<String>,
}

impl ConversationContext {
    /// Create a context for one request. The reference date defaults to today.
    pub fn new(auth_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            auth: AuthHeader::bearer(auth_token)?,
            reference_date: Local::now().date_naive(),
            user_input_language: None,
            current_agent: None,
            interrupted_agent: None,
            restart: false,
            data: None,
            data_type: None,
            resume_targets: Vec::new(),
        })
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    pub fn with_input_language(mut self, language: impl Into<String>) -> Self {
        self.user_input_language = Some(language.into());
        self
    }

    /// Wrap into a [`SharedContext`].
    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Immutable view of the user-relevant fields (no credentials, no payload).
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            date: self.reference_date,
            user_input_language: self.user_input_language.clone(),
            current_agent: self.current_agent.clone(),
            interrupted_agent: self.interrupted_agent.clone(),
            restart: self.restart,
            data_type: self.data_type,
            resume_targets: self.resume_targets.clone(),
        }
    }
}

/// Serializable view of a [`ConversationContext`], attached to every response chunk
/// and handed to instruction templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub date: NaiveDate,
    pub user_input_language: Option<String>,
    pub current_agent: Option<String>,
    pub interrupted_agent: Option<String>,
    pub restart: bool,
    pub data_type: Option<PayloadKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resume_targets: Vec<String>,
}
