//! Vaccination record lookups: history, latest dose, upcoming appointments, recommendations.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::backend::BackendClient;
use super::tool::AgentTool;
use super::types::{AgentToolParameters, ToolOutput};
use crate::context::AuthHeader;
use crate::error::{Result, VaxError};

pub const NO_RECORDS: &str = "No records found.";
pub const MISSING_SLOT: &str = "Missing booking slot.";
pub const NO_RECOMMENDATIONS: &str = "Unable to get recommendations for user.";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Named {
    pub name: String,
}

/// A bookable slot as returned by `GET /bookings/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BookingSlot {
    pub datetime: String,
    pub vaccine: Named,
    pub polyclinic: Named,
}

impl BookingSlot {
    pub async fn fetch(
        backend: &BackendClient,
        auth: &AuthHeader,
        slot_id: &str,
    ) -> Result<Option<Self>> {
        match backend.get_json(auth, &format!("/bookings/{slot_id}"), &[]).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn starts_at(&self) -> Result<NaiveDateTime> {
        parse_slot_datetime(&self.datetime)
    }
}

/// Parse a backend timestamp. Offsets are normalised to UTC; naive stamps are taken as UTC.
pub(crate) fn parse_slot_datetime(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|e| VaxError::api(200, format!("unparseable slot datetime {raw:?}: {e}")))
}

/// A user record enriched with its slot's vaccine, date, and clinic.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AugmentedRecord {
    pub fields: Map<String, Value>,
    pub vaccine_name: String,
    pub slot_at: NaiveDateTime,
}

impl AugmentedRecord {
    fn new(mut fields: Map<String, Value>, slot: &BookingSlot) -> Result<Self> {
        let slot_at = slot.starts_at()?;
        fields.remove("created_at");
        fields.insert("vaccine_name".into(), Value::String(slot.vaccine.name.clone()));
        fields.insert("slot_date".into(), Value::String(slot.datetime.clone()));
        fields.insert("polyclinic".into(), Value::String(slot.polyclinic.name.clone()));
        Ok(Self {
            fields,
            vaccine_name: slot.vaccine.name.clone(),
            slot_at,
        })
    }

    fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

pub(crate) enum RecordLookup {
    Found(Vec<AugmentedRecord>),
    Missing(&'static str),
}

/// Fetch every record of the user and join each with its booking slot.
pub(crate) async fn fetch_augmented_records(
    backend: &BackendClient,
    auth: &AuthHeader,
) -> Result<RecordLookup> {
    let Some(records) = backend.get_json(auth, "/records", &[]).await? else {
        return Ok(RecordLookup::Missing(NO_RECORDS));
    };
    let records: Vec<Map<String, Value>> = serde_json::from_value(records)?;
    let mut augmented = Vec::with_capacity(records.len());
    for record in records {
        let slot_id = match record.get("booking_slot_id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Ok(RecordLookup::Missing(MISSING_SLOT)),
        };
        let Some(slot) = BookingSlot::fetch(backend, auth, &slot_id).await? else {
            return Ok(RecordLookup::Missing(MISSING_SLOT));
        };
        augmented.push(AugmentedRecord::new(record, &slot)?);
    }
    Ok(RecordLookup::Found(augmented))
}

/// Most recent past record per vaccine, in order of first appearance.
pub(crate) fn most_recent_past(
    records: Vec<AugmentedRecord>,
    today: NaiveDate,
    vaccine: Option<&str>,
) -> Vec<Value> {
    let cutoff = today.and_time(chrono::NaiveTime::MIN);
    let mut latest: Vec<AugmentedRecord> = Vec::new();
    for record in records {
        if record.slot_at >= cutoff {
            continue;
        }
        if vaccine.is_some_and(|v| v != record.vaccine_name) {
            continue;
        }
        match latest.iter_mut().find(|r| r.vaccine_name == record.vaccine_name) {
            Some(existing) if record.slot_at > existing.slot_at => *existing = record,
            Some(_) => {}
            None => latest.push(record),
        }
    }
    latest.into_iter().map(AugmentedRecord::into_value).collect()
}

/// Records whose slot falls on or after the reference date.
pub(crate) fn upcoming(records: Vec<AugmentedRecord>, today: NaiveDate) -> Vec<Value> {
    let cutoff = today.and_time(chrono::NaiveTime::MIN);
    records
        .into_iter()
        .filter(|r| r.slot_at >= cutoff)
        .map(AugmentedRecord::into_value)
        .collect()
}

pub fn vaccination_history_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "get_vaccination_history_tool",
        "Gets the user's past vaccinations, the most recent one for each vaccine type.",
        AgentToolParameters::empty(),
        move |_args, ctx| {
            let backend = backend.clone();
            async move {
                Ok(match fetch_augmented_records(&backend, &ctx.auth).await? {
                    RecordLookup::Found(records) => ToolOutput::value(Value::Array(
                        most_recent_past(records, ctx.reference_date, None),
                    )),
                    RecordLookup::Missing(sentinel) => ToolOutput::text(sentinel),
                })
            }
        },
    )
}

pub fn latest_vaccination_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "get_latest_vaccination_tool",
        "Gets the user's most recent vaccination for the requested vaccine type.",
        AgentToolParameters::object()
            .string(
                "requested_vaccine",
                "Vaccine type found in the chat history",
                true,
            )
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let requested = args.get_str("requested_vaccine")?.to_string();
                Ok(match fetch_augmented_records(&backend, &ctx.auth).await? {
                    RecordLookup::Found(records) => ToolOutput::value(Value::Array(
                        most_recent_past(records, ctx.reference_date, Some(&requested)),
                    )),
                    RecordLookup::Missing(sentinel) => ToolOutput::text(sentinel),
                })
            }
        },
    )
}

pub fn upcoming_appointments_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "get_upcoming_appointments_tool",
        "Gets the user's current bookings, used to check for an existing booking of the requested vaccine.",
        AgentToolParameters::empty(),
        move |_args, ctx| {
            let backend = backend.clone();
            async move {
                Ok(match fetch_augmented_records(&backend, &ctx.auth).await? {
                    RecordLookup::Found(records) => {
                        ToolOutput::value(Value::Array(upcoming(records, ctx.reference_date)))
                    }
                    RecordLookup::Missing(sentinel) => ToolOutput::text(sentinel),
                })
            }
        },
    )
}

pub fn recommend_vaccines_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "recommend_vaccines_tool",
        "Gets vaccine recommendations for the user based on their demographic.",
        AgentToolParameters::empty(),
        move |_args, ctx| {
            let backend = backend.clone();
            async move {
                Ok(
                    match backend
                        .get_json(&ctx.auth, "/vaccines/recommendations", &[])
                        .await?
                    {
                        Some(value) => ToolOutput::value(value),
                        None => ToolOutput::text(NO_RECOMMENDATIONS),
                    },
                )
            }
        },
    )
}
