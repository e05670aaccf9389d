//! Session metrics computed from recorded trace spans.

pub mod phoenix;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use phoenix::PhoenixSpanSource;

use crate::error::{Result, VaxError};

/// Singapore local time, in which window bounds are given.
const LOCAL_OFFSET_SECS: i32 = 8 * 3600;

/// One recorded span with OpenInference attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SpanRecord {
    fn attribute(&self, key: &str) -> Option<&Value> {
        lookup(&self.attributes, key)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.attribute("session.id").and_then(Value::as_str)
    }

    /// Name of the first tool call in the first output message.
    pub fn first_tool_call(&self) -> Option<&str> {
        self.attribute("llm.output_messages.0.message.tool_calls.0.tool_call.function.name")
            .and_then(Value::as_str)
    }

    pub fn total_tokens(&self) -> u64 {
        self.attribute("llm.token_count.total")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// Resolve a dotted attribute key against attributes stored flat
/// (`"llm.token_count.total": 5`), nested, or any mix of the two.
fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    key.match_indices('.').find_map(|(i, _)| {
        map.get(&key[..i])
            .and_then(|child| lookup_value(child, &key[i + 1..]))
    })
}

fn lookup_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => lookup(map, key),
        Value::Array(items) => {
            let (index, rest) = match key.split_once('.') {
                Some((index, rest)) => (index, Some(rest)),
                None => (key, None),
            };
            let item = items.get(index.parse::<usize>().ok()?)?;
            match rest {
                Some(rest) => lookup_value(item, rest),
                None => Some(item),
            }
        }
        _ => None,
    }
}

/// Agent, tool and token counts for a set of spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TracingSummary {
    pub agent_count: u64,
    pub tool_count: u64,
    pub token_usage: u64,
}

impl TracingSummary {
    /// A first tool call named `transfer*` is a handoff; any other is a tool
    /// call. The conversation's first agent counts once more.
    pub fn from_spans<'a>(spans: impl IntoIterator<Item = &'a SpanRecord>) -> Self {
        let mut handoffs = 0;
        let mut tool_count = 0;
        let mut token_usage = 0;
        for span in spans {
            token_usage += span.total_tokens();
            match span.first_tool_call() {
                Some(name) if name.starts_with("transfer") => handoffs += 1,
                Some(_) => tool_count += 1,
                None => {}
            }
        }
        Self {
            agent_count: handoffs + 1,
            tool_count,
            token_usage,
        }
    }
}

pub fn filter_by_session<'a>(spans: &'a [SpanRecord], session_id: &str) -> Vec<&'a SpanRecord> {
    spans
        .iter()
        .filter(|s| s.session_id() == Some(session_id))
        .collect()
}

/// Spans fully inside `[start, end]` given in Singapore local time, widened
/// by one second on each side.
pub fn filter_by_window(
    spans: &[SpanRecord],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<&SpanRecord>> {
    let start = to_utc(start)? - Duration::seconds(1);
    let end = to_utc(end)? + Duration::seconds(1);
    Ok(spans
        .iter()
        .filter(|s| s.start_time >= start && s.end_time <= end)
        .collect())
}

fn to_utc(local: NaiveDateTime) -> Result<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(LOCAL_OFFSET_SECS)
        .ok_or_else(|| VaxError::InvalidState("invalid local offset".into()))?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| VaxError::InvalidArgument(format!("ambiguous local time {local}")))
}

/// Where spans come from.
#[async_trait]
pub trait SpanSource: Send + Sync {
    async fn spans(&self) -> Result<Vec<SpanRecord>>;
}

/// Computes [`TracingSummary`] values on demand.
#[derive(Clone)]
pub struct MetricsService {
    source: Arc<dyn SpanSource>,
}

impl MetricsService {
    pub fn new(source: Arc<dyn SpanSource>) -> Self {
        Self { source }
    }

    pub async fn tracing_info_by_session(&self, session_id: &str) -> Result<TracingSummary> {
        let spans = self.source.spans().await?;
        let summary = TracingSummary::from_spans(filter_by_session(&spans, session_id));
        debug!(session_id, spans = spans.len(), ?summary, "session metrics");
        Ok(summary)
    }

    pub async fn tracing_info_in_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TracingSummary> {
        let spans = self.source.spans().await?;
        Ok(TracingSummary::from_spans(filter_by_window(&spans, start, end)?))
    }
}
