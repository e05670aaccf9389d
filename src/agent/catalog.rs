//! The vaccination booking agent graph.

use super::agent::{AgentDefinition, Instructions};
use super::prompts;
use super::registry::AgentRegistry;
use crate::error::Result;

pub const TRIAGE: &str = "triage_agent";
pub const APPOINTMENTS: &str = "appointments_agent";
pub const HANDLE_VACCINE_NAMES: &str = "handle_vaccine_names_agent";
pub const DOUBLE_BOOKING_CHECK: &str = "double_booking_check_agent";
pub const RECOMMENDED_VACCINE_CHECK: &str = "recommended_vaccine_check_agent";
pub const VACCINATION_HISTORY_CHECK: &str = "vaccination_history_check_agent";
pub const IDENTIFY_CLINIC: &str = "identify_clinic_agent";
pub const CHECK_AVAILABLE_SLOTS: &str = "check_available_slots_agent";
pub const MODIFY_EXISTING_APPOINTMENT: &str = "modify_existing_appointment_agent";
pub const MANAGE_APPOINTMENT: &str = "manage_appointment_agent";
pub const GENERAL_QUESTIONS: &str = "general_questions_agent";
pub const VACCINATION_RECORDS: &str = "vaccination_records_agent";
pub const RECOMMENDER: &str = "recommender_agent";
pub const INTERRUPT_HANDLER: &str = "interrupt_handler_agent";

/// Build the registry of all fourteen agents.
pub fn vaccination_registry() -> Result<AgentRegistry> {
    AgentRegistry::builder(TRIAGE)
        .interrupt_handler(INTERRUPT_HANDLER)
        .agent(
            AgentDefinition::new(TRIAGE, prompts::TRIAGE).with_handoffs([
                APPOINTMENTS,
                RECOMMENDER,
                VACCINATION_RECORDS,
                GENERAL_QUESTIONS,
            ]),
        )
        .agent(
            AgentDefinition::new(APPOINTMENTS, prompts::APPOINTMENTS)
                .with_handoffs([HANDLE_VACCINE_NAMES, MODIFY_EXISTING_APPOINTMENT]),
        )
        .agent(
            AgentDefinition::new(HANDLE_VACCINE_NAMES, prompts::HANDLE_VACCINE_NAMES)
                .with_tool("standardise_vaccine_name_tool")
                .with_forced_tool("standardise_vaccine_name_tool")
                .with_handoffs([DOUBLE_BOOKING_CHECK, RECOMMENDER]),
        )
        .agent(
            AgentDefinition::new(DOUBLE_BOOKING_CHECK, prompts::DOUBLE_BOOKING_CHECK)
                .with_tool("get_upcoming_appointments_tool")
                .with_handoffs([
                    RECOMMENDED_VACCINE_CHECK,
                    IDENTIFY_CLINIC,
                    MANAGE_APPOINTMENT,
                    TRIAGE,
                    INTERRUPT_HANDLER,
                ]),
        )
        .agent(
            AgentDefinition::new(RECOMMENDED_VACCINE_CHECK, prompts::RECOMMENDED_VACCINE_CHECK)
                .with_tool("recommend_vaccines_tool")
                .with_handoffs([VACCINATION_HISTORY_CHECK, INTERRUPT_HANDLER]),
        )
        .agent(
            AgentDefinition::new(
                VACCINATION_HISTORY_CHECK,
                Instructions::dynamic(prompts::vaccination_history_check),
            )
            .with_tool("get_latest_vaccination_tool")
            .with_handoffs([IDENTIFY_CLINIC, TRIAGE, INTERRUPT_HANDLER]),
        )
        .agent(
            AgentDefinition::new(IDENTIFY_CLINIC, prompts::IDENTIFY_CLINIC)
                .with_tools([
                    "get_clinic_name_response_helper_tool",
                    "get_clinics_near_location_tool",
                    "get_clinics_near_home_tool",
                ])
                .with_handoffs([CHECK_AVAILABLE_SLOTS, INTERRUPT_HANDLER]),
        )
        .agent(
            AgentDefinition::new(
                CHECK_AVAILABLE_SLOTS,
                Instructions::dynamic(prompts::check_available_slots),
            )
            .with_tools(["get_available_slots_tool", "recommend_gps_tool"])
            .with_handoffs([MANAGE_APPOINTMENT, TRIAGE, INTERRUPT_HANDLER]),
        )
        .agent(
            AgentDefinition::new(MODIFY_EXISTING_APPOINTMENT, prompts::MODIFY_EXISTING_APPOINTMENT)
                .with_tool("get_upcoming_appointments_tool")
                .with_forced_tool("get_upcoming_appointments_tool")
                .with_handoffs([IDENTIFY_CLINIC, MANAGE_APPOINTMENT, INTERRUPT_HANDLER]),
        )
        .agent(
            AgentDefinition::new(MANAGE_APPOINTMENT, prompts::MANAGE_APPOINTMENT)
                .with_tools([
                    "new_appointment_tool",
                    "change_appointment_tool",
                    "cancel_appointment_tool",
                ])
                .terminal()
                .publishing_tool_output(),
        )
        .agent(
            AgentDefinition::new(GENERAL_QUESTIONS, prompts::GENERAL_QUESTIONS)
                .with_tool("healthhub_ai_tool")
                .with_forced_tool("healthhub_ai_tool")
                .terminal(),
        )
        .agent(
            AgentDefinition::new(VACCINATION_RECORDS, prompts::VACCINATION_RECORDS)
                .with_tool("get_vaccination_history_tool")
                .with_forced_tool("get_vaccination_history_tool")
                .terminal(),
        )
        .agent(
            AgentDefinition::new(RECOMMENDER, Instructions::dynamic(prompts::recommender))
                .with_tools([
                    "get_upcoming_appointments_tool",
                    "get_vaccination_history_tool",
                    "recommend_vaccines_tool",
                ])
                .terminal(),
        )
        .agent(
            AgentDefinition::new(
                INTERRUPT_HANDLER,
                Instructions::dynamic(prompts::interrupt_handler),
            )
            .with_handoff_description(
                "Hand off here when the user is not answering your question.",
            )
            .with_agent_tool(
                "recommend_vaccines_tool",
                "Gets recommended vaccines for the user.",
                RECOMMENDER,
            )
            .with_agent_tool(
                "vaccine_records_tool",
                "Gets the user's vaccination records.",
                VACCINATION_RECORDS,
            )
            .with_agent_tool(
                "general_questions_tool",
                "Answers all general questions.",
                GENERAL_QUESTIONS,
            )
            .with_resume_targets(),
        )
        .build()
}
