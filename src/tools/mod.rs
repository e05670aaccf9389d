//! Tool system: the tool trait, argument access, and the vaccination domain tools.

pub mod appointments;
pub mod arguments;
pub mod backend;
pub mod clinics;
pub mod knowledge;
pub mod records;
pub mod tool;
pub mod types;

use std::sync::Arc;

pub use arguments::ToolArguments;
pub use backend::BackendClient;
pub use knowledge::HealthHubClient;
pub use tool::{AgentTool, Tool, ToolExecutionContext, ToolRegistry};
pub use types::{AgentToolParameters, ToolOutput};

use crate::provider::ModelProvider;

/// Every tool the vaccination agents are bound to.
pub fn vaccination_toolset(
    backend: Arc<BackendClient>,
    provider: Arc<dyn ModelProvider>,
    healthhub: Option<Arc<HealthHubClient>>,
) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(records::vaccination_history_tool(backend.clone()))
        .with_tool(records::latest_vaccination_tool(backend.clone()))
        .with_tool(records::upcoming_appointments_tool(backend.clone()))
        .with_tool(records::recommend_vaccines_tool(backend.clone()))
        .with_tool(knowledge::standardise_vaccine_name_tool(provider))
        .with_tool(clinics::clinics_near_location_tool(backend.clone()))
        .with_tool(clinics::clinic_name_helper_tool())
        .with_tool(clinics::clinics_near_home_tool(backend.clone()))
        .with_tool(clinics::available_slots_tool(backend.clone()))
        .with_tool(clinics::recommend_gps_tool(backend.clone()))
        .with_tool(appointments::new_appointment_tool(backend.clone()))
        .with_tool(appointments::change_appointment_tool(backend.clone()))
        .with_tool(appointments::cancel_appointment_tool(backend))
        .with_tool(knowledge::healthhub_ai_tool(healthhub))
}
