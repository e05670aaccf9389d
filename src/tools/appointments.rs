//! Booking, rescheduling, and cancellation proposals.
//!
//! These tools only *prepare* a proposal for the user to confirm. Nothing here
//! writes to the backend; committing a booking is a separate client action.

use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::backend::BackendClient;
use super::records::BookingSlot;
use super::tool::{AgentTool, ToolExecutionContext};
use super::types::{AgentToolParameters, ToolOutput};
use crate::context::PayloadKind;
use crate::error::{Result, VaxError};

const MAPS_DIRECTIONS_URL: &str = "https://www.google.com/maps/dir/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub booking_slot_id: String,
    pub vaccine: String,
    pub clinic: String,
    pub date: String,
    pub time: String,
    pub google_maps_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleDetails {
    pub record_id: String,
    pub booking_slot_id: String,
    pub vaccine: String,
    pub previous_clinic: String,
    pub previous_date: String,
    pub previous_time: String,
    pub new_clinic: String,
    pub new_date: String,
    pub new_time: String,
    pub google_maps_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub record_id: String,
    pub vaccine: String,
    pub clinic: String,
    pub date: String,
    pub time: String,
}

/// Directions link from the user's postal code to a clinic by public transport.
pub fn google_maps_url(origin: &str, destination: &str) -> Result<String> {
    let url = Url::parse_with_params(
        MAPS_DIRECTIONS_URL,
        &[
            ("api", "1"),
            ("origin", origin),
            ("destination", destination),
            ("travelmode", "transit"),
        ],
    )
    .map_err(|e| VaxError::InvalidState(format!("maps url: {e}")))?;
    Ok(url.to_string())
}

async fn user_postal_code(backend: &BackendClient, ctx: &ToolExecutionContext) -> Result<String> {
    let profile = backend.get_required(&ctx.auth, "/users", &[]).await?;
    profile
        .pointer("/address/postal_code")
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| VaxError::api(200, "user profile has no postal code"))
}

async fn require_slot(
    backend: &BackendClient,
    ctx: &ToolExecutionContext,
    slot_id: &str,
) -> Result<BookingSlot> {
    BookingSlot::fetch(backend, &ctx.auth, slot_id)
        .await?
        .ok_or_else(|| VaxError::api(404, format!("booking slot {slot_id} not found")))
}

async fn slot_for_record(
    backend: &BackendClient,
    ctx: &ToolExecutionContext,
    record_id: &str,
) -> Result<BookingSlot> {
    let record = backend
        .get_required(&ctx.auth, &format!("/records/{record_id}"), &[])
        .await?;
    let slot_id = match record.get("booking_slot_id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return Err(VaxError::api(200, format!("record {record_id} has no slot"))),
    };
    require_slot(backend, ctx, &slot_id).await
}

fn date_and_time(slot: &BookingSlot) -> Result<(String, String)> {
    let at = slot.starts_at()?;
    Ok((at.date().to_string(), at.time().format("%H:%M:%S").to_string()))
}

/// Convert a backend failure into the inline text the agent relays to the user.
fn inline_failure(tool: &str, result: Result<ToolOutput>) -> Result<ToolOutput> {
    match result {
        Ok(out) => Ok(out),
        Err(e) => {
            warn!(tool, error = %e, "appointment lookup failed");
            Ok(ToolOutput::text(format!("Error making request: {e}")))
        }
    }
}

pub(crate) async fn prepare_booking(
    backend: &BackendClient,
    ctx: &ToolExecutionContext,
    slot_id: &str,
) -> Result<BookingDetails> {
    let slot = require_slot(backend, ctx, slot_id).await?;
    let (date, time) = date_and_time(&slot)?;
    let origin = user_postal_code(backend, ctx).await?;
    Ok(BookingDetails {
        booking_slot_id: slot_id.to_string(),
        google_maps_url: google_maps_url(&origin, &slot.polyclinic.name)?,
        vaccine: slot.vaccine.name,
        clinic: slot.polyclinic.name,
        date,
        time,
    })
}

pub(crate) async fn prepare_reschedule(
    backend: &BackendClient,
    ctx: &ToolExecutionContext,
    record_id: &str,
    new_slot_id: &str,
) -> Result<RescheduleDetails> {
    let old = slot_for_record(backend, ctx, record_id).await?;
    let new = require_slot(backend, ctx, new_slot_id).await?;
    let (previous_date, previous_time) = date_and_time(&old)?;
    let (new_date, new_time) = date_and_time(&new)?;
    let origin = user_postal_code(backend, ctx).await?;
    Ok(RescheduleDetails {
        record_id: record_id.to_string(),
        booking_slot_id: new_slot_id.to_string(),
        google_maps_url: google_maps_url(&origin, &new.polyclinic.name)?,
        vaccine: new.vaccine.name,
        previous_clinic: old.polyclinic.name,
        previous_date,
        previous_time,
        new_clinic: new.polyclinic.name,
        new_date,
        new_time,
    })
}

pub(crate) async fn prepare_cancellation(
    backend: &BackendClient,
    ctx: &ToolExecutionContext,
    record_id: &str,
) -> Result<CancellationDetails> {
    let slot = slot_for_record(backend, ctx, record_id).await?;
    let (date, time) = date_and_time(&slot)?;
    Ok(CancellationDetails {
        record_id: record_id.to_string(),
        vaccine: slot.vaccine.name,
        clinic: slot.polyclinic.name,
        date,
        time,
    })
}

pub fn new_appointment_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "new_appointment_tool",
        "Gets the booking details of a new appointment for the user to confirm.",
        AgentToolParameters::object()
            .string("slot_id", "The 'id' field of the slot to be booked", true)
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let slot_id = args.get_str("slot_id")?.to_string();
                let result = async {
                    let details = prepare_booking(&backend, &ctx, &slot_id).await?;
                    Ok::<_, VaxError>(
                        ToolOutput::value(serde_json::to_value(details)?)
                            .with_kind(PayloadKind::Booking),
                    )
                }
                .await;
                inline_failure("new_appointment_tool", result)
            }
        },
    )
}

pub fn change_appointment_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "change_appointment_tool",
        "Gets the details of an existing appointment and the slot it would be rescheduled to.",
        AgentToolParameters::object()
            .string("record_id", "Id of the vaccination record to move", true)
            .string("new_slot_id", "Id of the slot to reschedule to", true)
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let record_id = args.get_str("record_id")?.to_string();
                let new_slot_id = args.get_str("new_slot_id")?.to_string();
                let result = async {
                    let details =
                        prepare_reschedule(&backend, &ctx, &record_id, &new_slot_id).await?;
                    Ok::<_, VaxError>(
                        ToolOutput::value(serde_json::to_value(details)?)
                            .with_kind(PayloadKind::Reschedule),
                    )
                }
                .await;
                inline_failure("change_appointment_tool", result)
            }
        },
    )
}

pub fn cancel_appointment_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "cancel_appointment_tool",
        "Gets the details of an existing appointment to be cancelled.",
        AgentToolParameters::object()
            .string("record_id", "Id of the vaccination record to cancel", true)
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let record_id = args.get_str("record_id")?.to_string();
                let result = async {
                    let details = prepare_cancellation(&backend, &ctx, &record_id).await?;
                    Ok::<_, VaxError>(
                        ToolOutput::value(serde_json::to_value(details)?)
                            .with_kind(PayloadKind::Cancellation),
                    )
                }
                .await;
                inline_failure("cancel_appointment_tool", result)
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_url_encodes_destination() {
        let url = google_maps_url("650123", "Bukit Batok Polyclinic").unwrap();
        assert!(url.starts_with("https://www.google.com/maps/dir/?api=1"));
        assert!(url.contains("origin=650123"));
        assert!(url.contains("destination=Bukit+Batok+Polyclinic"));
        assert!(url.ends_with("travelmode=transit"));
    }
}
