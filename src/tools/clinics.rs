//! Clinic discovery and slot search.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde_json::json;

use super::backend::BackendClient;
use super::records::parse_slot_datetime;
use super::tool::AgentTool;
use super::types::{AgentToolParameters, ToolOutput};
use crate::error::{Result, VaxError};

pub const NO_SLOTS: &str = "No available slots for current date range or clinic.";
const CLINIC_LIMIT: &str = "3";
const TIMESLOT_LIMIT: &str = "3";
const DEFAULT_WINDOW_DAYS: i64 = 3;

/// End of the default search window: three days after `start`, in the same format.
pub(crate) fn default_window_end(start: &str) -> Result<String> {
    if let Ok(date) = NaiveDate::parse_from_str(start, "%Y-%m-%d") {
        return Ok((date + Duration::days(DEFAULT_WINDOW_DAYS)).to_string());
    }
    let at = parse_slot_datetime(start)
        .map_err(|_| VaxError::InvalidArgument(format!("start_date is not an ISO date: {start}")))?;
    Ok((at + Duration::days(DEFAULT_WINDOW_DAYS))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string())
}

pub fn clinics_near_location_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "get_clinics_near_location_tool",
        "Returns the polyclinics closest to a location named by the user.",
        AgentToolParameters::object()
            .string("location_name", "The location specified by the user", true)
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let location_name = args.get_str("location_name")?.to_string();
                let Some(location) = backend.geocode(&location_name).await? else {
                    return Ok(ToolOutput::text(format!("Location not found: {location_name}")));
                };
                let clinics = backend
                    .get_required(
                        &ctx.auth,
                        "/clinics/nearest-by-location",
                        &[
                            ("latitude", location.latitude.to_string()),
                            ("longitude", location.longitude.to_string()),
                            ("clinic_type", "polyclinic".to_string()),
                            ("clinic_limit", CLINIC_LIMIT.to_string()),
                        ],
                    )
                    .await?;
                Ok(ToolOutput::value(clinics))
            }
        },
    )
}

pub fn clinic_name_helper_tool() -> AgentTool {
    AgentTool::new(
        "get_clinic_name_response_helper_tool",
        "Use when a polyclinic name is found in the chat history.",
        AgentToolParameters::object()
            .string(
                "clinic_name",
                "Clinic name found in the chat history (e.g. \"Toa Payoh Polyclinic\")",
                true,
            )
            .build(),
        |args, _ctx| async move {
            let clinic = args.get_str("clinic_name")?.to_string();
            Ok(ToolOutput::value(json!({ "clinic": clinic })))
        },
    )
}

fn nearest_by_home_tool(
    backend: Arc<BackendClient>,
    name: &'static str,
    description: &'static str,
    clinic_type: &'static str,
) -> AgentTool {
    AgentTool::new(
        name,
        description,
        AgentToolParameters::empty(),
        move |_args, ctx| {
            let backend = backend.clone();
            async move {
                let clinics = backend
                    .get_required(
                        &ctx.auth,
                        "/clinics/nearest-by-home",
                        &[
                            ("clinic_type", clinic_type.to_string()),
                            ("clinic_limit", CLINIC_LIMIT.to_string()),
                        ],
                    )
                    .await?;
                Ok(ToolOutput::value(clinics))
            }
        },
    )
}

pub fn clinics_near_home_tool(backend: Arc<BackendClient>) -> AgentTool {
    nearest_by_home_tool(
        backend,
        "get_clinics_near_home_tool",
        "Use when no polyclinic name is in the chat history and the user gave no location. \
         Returns the polyclinics closest to the user's home address.",
        "polyclinic",
    )
}

pub fn recommend_gps_tool(backend: Arc<BackendClient>) -> AgentTool {
    nearest_by_home_tool(
        backend,
        "recommend_gps_tool",
        "Gets the GPs nearest to the user's home when the selected polyclinic has no slots.",
        "gp",
    )
}

pub fn available_slots_tool(backend: Arc<BackendClient>) -> AgentTool {
    AgentTool::new(
        "get_available_slots_tool",
        "Gets available slots for a vaccine at a clinic, over a date range if specified.",
        AgentToolParameters::object()
            .string("vaccine_name", "Official name of the vaccine", true)
            .string("clinic", "Name of the clinic", true)
            .string(
                "start_date",
                "Only if the user gave a start date (ISO format)",
                false,
            )
            .string("end_date", "Only if the user gave an end date (ISO format)", false)
            .build(),
        move |args, ctx| {
            let backend = backend.clone();
            async move {
                let vaccine_name = args.get_str("vaccine_name")?.to_string();
                let clinic = args.get_str("clinic")?.to_string();
                let start = args
                    .get_str_opt("start_date")
                    .map(str::to_string)
                    .unwrap_or_else(|| ctx.reference_date.to_string());
                let end = match args.get_str_opt("end_date") {
                    Some(end) => end.to_string(),
                    None => default_window_end(&start)?,
                };
                let slots = backend
                    .get_json(
                        &ctx.auth,
                        "/bookings/available",
                        &[
                            ("vaccine_name", vaccine_name),
                            ("polyclinic_name", clinic),
                            ("start_datetime", start),
                            ("end_datetime", end),
                            ("timeslot_limit", TIMESLOT_LIMIT.to_string()),
                        ],
                    )
                    .await?;
                Ok(match slots {
                    Some(slots) => ToolOutput::value(slots),
                    None => ToolOutput::text(NO_SLOTS),
                })
            }
        },
    )
}
