//! Run engine tests over a small agent graph with in-process tools.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{drain_run, reference_date, ScriptedProvider};
use vaxbot::agent::{AgentDefinition, AgentRegistry};
use vaxbot::agent_loop::{
    LoopRunner, RawResponse, RunEngine, RunEvent, RunItem, RunRequest, TOOL_FAILURE_PREFIX,
};
use vaxbot::context::{ConversationContext, PayloadKind, SharedContext};
use vaxbot::error::VaxError;
use vaxbot::provider::ToolChoice;
use vaxbot::tools::{AgentTool, AgentToolParameters, ToolOutput, ToolRegistry};
use vaxbot::types::{ModelMessage, Role};

const TRIAGE: &str = "triage_agent";
const CLINIC: &str = "clinic_agent";
const BOOKING: &str = "booking_agent";
const RECORDS: &str = "records_agent";
const INTERRUPT: &str = "interrupt_handler_agent";

fn graph() -> AgentRegistry {
    AgentRegistry::builder(TRIAGE)
        .interrupt_handler(INTERRUPT)
        .agent(AgentDefinition::new(TRIAGE, "Route the user.").with_handoffs([CLINIC, BOOKING]))
        .agent(
            AgentDefinition::new(CLINIC, "Find a clinic.")
                .with_tool("find_clinic_tool")
                .with_forced_tool("find_clinic_tool")
                .with_handoffs([BOOKING, INTERRUPT]),
        )
        .agent(
            AgentDefinition::new(BOOKING, "Prepare the booking.")
                .with_tools(["book_tool", "start_over_tool", "slow_tool"])
                .terminal()
                .publishing_tool_output(),
        )
        .agent(
            AgentDefinition::new(RECORDS, "Answer from the records.")
                .with_tool("records_tool")
                .terminal(),
        )
        .agent(
            AgentDefinition::new(INTERRUPT, "Answer side questions.")
                .with_agent_tool("records_lookup_tool", "Looks up records.", RECORDS)
                .with_resume_targets(),
        )
        .build()
        .unwrap()
}

fn tools() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(AgentTool::new(
            "find_clinic_tool",
            "Finds the nearest clinic.",
            AgentToolParameters::empty(),
            |_args, _ctx| async move { Ok(ToolOutput::value(json!({"clinic": "Bedok Polyclinic"}))) },
        ))
        .with_tool(AgentTool::new(
            "book_tool",
            "Prepares a booking.",
            AgentToolParameters::object()
                .string("slot_id", "Slot to book", true)
                .build(),
            |args, _ctx| async move {
                let slot = args.get_str("slot_id")?.to_string();
                Ok(ToolOutput::value(json!({"booking_slot_id": slot})).with_kind(PayloadKind::Booking))
            },
        ))
        .with_tool(AgentTool::new(
            "start_over_tool",
            "Starts the conversation over.",
            AgentToolParameters::empty(),
            |_args, _ctx| async move { Ok(ToolOutput::text("restarting").with_restart()) },
        ))
        .with_tool(AgentTool::new(
            "slow_tool",
            "Never answers in time.",
            AgentToolParameters::empty(),
            |_args, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(ToolOutput::text("late"))
            },
        ))
        .with_tool(AgentTool::new(
            "records_tool",
            "Lists vaccination records.",
            AgentToolParameters::empty(),
            |_args, _ctx| async move { Ok(ToolOutput::value(json!([{"vaccine_name": "Influenza (INF)"}]))) },
        ))
}

fn runner(provider: &Arc<ScriptedProvider>) -> LoopRunner {
    LoopRunner::new(Arc::new(graph()), Arc::new(tools()), provider.clone()).unwrap()
}

fn context() -> SharedContext {
    ConversationContext::new("token")
        .unwrap()
        .with_reference_date(reference_date())
        .into_shared()
}

fn request(agent: &str, message: &str, ctx: &SharedContext) -> RunRequest {
    RunRequest::new(agent, vec![ModelMessage::user(message)], ctx.clone())
}

/// Compact event trace with consecutive text deltas collapsed.
fn trace(events: &[RunEvent]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for event in events {
        let line = match event {
            RunEvent::RawResponse(RawResponse::TextDelta { .. }) => "delta".to_string(),
            RunEvent::RawResponse(RawResponse::ContentPartDone) => "part_done".to_string(),
            RunEvent::RawResponse(RawResponse::Other) => "other".to_string(),
            RunEvent::AgentUpdated { new_agent } => format!("agent:{new_agent}"),
            RunEvent::RunItem(RunItem::MessageOutput { agent, .. }) => format!("message:{agent}"),
            RunEvent::RunItem(RunItem::ToolCall { call, .. }) => format!("tool_call:{}", call.name),
            RunEvent::RunItem(RunItem::ToolCallOutput { agent, .. }) => format!("tool_output:{agent}"),
            RunEvent::RunItem(RunItem::HandoffCall { call, .. }) => format!("handoff_call:{}", call.name),
            RunEvent::RunItem(RunItem::HandoffOutput { source, target }) => {
                format!("handoff:{source}->{target}")
            }
        };
        if line == "delta" && out.last().is_some_and(|l| l == "delta") {
            continue;
        }
        out.push(line);
    }
    out
}

fn tool_names(request: &vaxbot::provider::ProviderRequest) -> Vec<String> {
    request.tools.iter().map(|t| t.name.clone()).collect()
}

#[tokio::test]
async fn handoff_then_forced_tool_then_text() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_handoff("call_1", CLINIC);
    provider.queue_tool_call("call_2", "find_clinic_tool", json!({}));
    provider.queue_text("Bedok Polyclinic is nearest.");

    let ctx = context();
    let mut run = runner(&provider).run_streamed(request(TRIAGE, "I want a flu shot", &ctx));
    let (events, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    assert_eq!(
        trace(&events),
        vec![
            "agent:triage_agent",
            "handoff_call:transfer_to_clinic_agent",
            "handoff:triage_agent->clinic_agent",
            "agent:clinic_agent",
            "tool_call:find_clinic_tool",
            "tool_output:clinic_agent",
            "delta",
            "part_done",
            "message:clinic_agent",
        ]
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        tool_names(&requests[0]),
        vec!["transfer_to_clinic_agent", "transfer_to_booking_agent"]
    );
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[0].text(), "Route the user.");
    assert_eq!(requests[0].tool_choice, None);
    assert_eq!(
        requests[1].tool_choice,
        Some(ToolChoice::Function("find_clinic_tool".into()))
    );
    assert_eq!(requests[2].tool_choice, None);

    assert_eq!(run.current_agent(), CLINIC);
    let transcript = run.to_input_list();
    assert_eq!(transcript.len(), 6);
    assert_eq!(transcript[1].name.as_deref(), Some(TRIAGE));
    assert_eq!(
        transcript[2].tool_result_part().unwrap().result,
        json!({"assistant": CLINIC}).to_string()
    );
    assert_eq!(transcript[5].text(), "Bedok Polyclinic is nearest.");
    assert_eq!(transcript[5].name.as_deref(), Some(CLINIC));
    assert_eq!(ctx.lock().await.current_agent.as_deref(), Some(CLINIC));
}

#[tokio::test]
async fn interrupt_handoff_records_resume_edges() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_handoff("call_1", INTERRUPT);
    provider.queue_text("The clinic opens at 8am.");

    let ctx = context();
    let mut run = runner(&provider).run_streamed(request(CLINIC, "when do you open?", &ctx));
    let (_, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    {
        let ctx = ctx.lock().await;
        assert_eq!(ctx.interrupted_agent.as_deref(), Some(CLINIC));
        assert_eq!(ctx.resume_targets, vec![TRIAGE.to_string(), CLINIC.to_string()]);
        assert_eq!(ctx.current_agent.as_deref(), Some(INTERRUPT));
    }

    let requests = provider.requests();
    assert_eq!(
        tool_names(&requests[1]),
        vec![
            "records_lookup_tool",
            "transfer_to_triage_agent",
            "transfer_to_clinic_agent"
        ]
    );
    assert_eq!(run.current_agent(), INTERRUPT);
}

#[tokio::test]
async fn only_the_first_handoff_of_a_turn_is_taken() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_calls(&[
        ("call_a", "transfer_to_clinic_agent", json!({})),
        ("call_b", "transfer_to_booking_agent", json!({})),
    ]);
    provider.queue_text("Which area are you in?");

    let ctx = context();
    let mut run = runner(&provider).run_streamed(request(TRIAGE, "book me in", &ctx));
    let (events, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    let handoffs = trace(&events)
        .into_iter()
        .filter(|l| l.starts_with("handoff:"))
        .collect::<Vec<_>>();
    assert_eq!(handoffs, vec!["handoff:triage_agent->clinic_agent"]);
    assert_eq!(run.current_agent(), CLINIC);

    let ignored = run
        .to_input_list()
        .iter()
        .filter_map(|m| m.tool_result_part().cloned())
        .find(|r| r.tool_call_id == "call_b")
        .unwrap();
    assert_eq!(ignored.result, "Multiple handoffs detected, ignoring this one.");
}

#[tokio::test]
async fn handoff_outside_the_graph_fails_the_run() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_handoff("call_1", RECORDS);

    let mut run = runner(&provider).run_streamed(request(TRIAGE, "hi", &context()));
    let (_, error) = drain_run(&mut run).await;
    match error {
        Some(VaxError::InvalidHandoff { from, to }) => {
            assert_eq!(from, TRIAGE);
            assert_eq!(to, RECORDS);
        }
        other => panic!("expected invalid handoff, got {other:?}"),
    }
}

#[tokio::test]
async fn unbound_tool_fails_the_run() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("call_1", "book_tool", json!({"slot_id": "s-1"}));

    let mut run = runner(&provider).run_streamed(request(TRIAGE, "hi", &context()));
    let (_, error) = drain_run(&mut run).await;
    assert!(
        matches!(error, Some(VaxError::ToolExecution { ref tool_name, .. }) if tool_name == "book_tool"),
        "{error:?}"
    );
}

#[tokio::test]
async fn tool_failure_is_returned_to_the_model() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("call_1", "book_tool", json!({}));
    provider.queue_text("Which slot would you like?");

    let mut run = runner(&provider).run_streamed(request(BOOKING, "book it", &context()));
    let (events, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    let output = events
        .iter()
        .find_map(|e| match e {
            RunEvent::RunItem(RunItem::ToolCallOutput { output, .. }) => output.as_str(),
            _ => None,
        })
        .unwrap();
    assert!(output.starts_with(TOOL_FAILURE_PREFIX), "{output}");
    assert!(output.contains("slot_id"), "{output}");
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::RunItem(RunItem::MessageOutput { .. }))));
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn unknown_start_agent_is_the_first_item() {
    let provider = Arc::new(ScriptedProvider::new());
    let mut run = runner(&provider).run_streamed(request("nope_agent", "hi", &context()));
    let (events, error) = drain_run(&mut run).await;
    assert!(events.is_empty());
    assert!(matches!(error, Some(VaxError::UnknownAgent(ref n)) if n == "nope_agent"));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn turn_limit_is_enforced() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_handoff("call_1", CLINIC);
    provider.queue_tool_call("call_2", "find_clinic_tool", json!({}));
    provider.queue_text("never reached");

    let mut run = runner(&provider)
        .run_streamed(request(TRIAGE, "hi", &context()).with_max_turns(2));
    let (_, error) = drain_run(&mut run).await;
    assert!(matches!(error, Some(VaxError::MaxTurnsExceeded(2))), "{error:?}");
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn tool_payload_kind_and_restart_reach_the_context() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_calls(&[
        ("call_1", "book_tool", json!({"slot_id": "slot-9"})),
        ("call_2", "start_over_tool", json!({})),
    ]);
    provider.queue_text("Please confirm the booking.");

    let ctx = context();
    let mut run = runner(&provider).run_streamed(request(BOOKING, "book slot 9", &ctx));
    let (events, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    let outputs: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::RunItem(RunItem::ToolCallOutput { call_id, output, .. }) => {
                Some((call_id.clone(), output.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        outputs,
        vec![
            ("call_1".to_string(), json!({"booking_slot_id": "slot-9"})),
            ("call_2".to_string(), json!("restarting")),
        ]
    );

    let ctx = ctx.lock().await;
    assert_eq!(ctx.data_type, Some(PayloadKind::Booking));
    assert!(ctx.restart);
    // The translator, not the engine, publishes payloads.
    assert!(ctx.data.is_none());
}

#[tokio::test]
async fn slow_tool_times_out() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("call_1", "slow_tool", json!({}));

    let runner = runner(&provider).with_tool_timeout(Duration::from_millis(50));
    let mut run = runner.run_streamed(request(BOOKING, "hi", &context()));
    let (_, error) = drain_run(&mut run).await;
    assert!(matches!(error, Some(VaxError::Timeout(_))), "{error:?}");
}

#[tokio::test]
async fn agent_tool_runs_the_sub_agent_without_a_handoff() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call(
        "call_1",
        "records_lookup_tool",
        json!({"input": "what did I take last year?"}),
    );
    provider.queue_completion_tool_call("inner_1", "records_tool", json!({}));
    provider.queue_completion("You had Influenza (INF).");
    provider.queue_text("You had the flu vaccine.");

    let ctx = context();
    let mut run = runner(&provider).run_streamed(request(INTERRUPT, "what did I take?", &ctx));
    let (events, error) = drain_run(&mut run).await;
    assert!(error.is_none(), "{error:?}");

    let agents: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::AgentUpdated { new_agent } => Some(new_agent.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(agents, vec![INTERRUPT]);

    let output = events.iter().find_map(|e| match e {
        RunEvent::RunItem(RunItem::ToolCallOutput { output, .. }) => Some(output.clone()),
        _ => None,
    });
    assert_eq!(output, Some(json!("You had Influenza (INF).")));

    let inner = provider.completion_requests();
    assert_eq!(inner.len(), 2);
    assert_eq!(inner[0].messages[0].text(), "Answer from the records.");
    assert_eq!(inner[0].messages[1].text(), "what did I take last year?");
    assert_eq!(tool_names(&inner[0]), vec!["records_tool"]);
    assert_eq!(inner[1].messages.len(), 4);

    assert_eq!(run.current_agent(), INTERRUPT);
    assert_eq!(ctx.lock().await.current_agent.as_deref(), Some(INTERRUPT));
}

#[tokio::test]
async fn stream_error_delta_aborts_the_run() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_deltas(vec![vaxbot::types::TextStreamDelta {
        text: "overloaded".into(),
        event_type: vaxbot::types::StreamEventType::Error,
        tool_call: None,
        finish_reason: None,
    }]);

    let mut run = runner(&provider).run_streamed(request(TRIAGE, "hi", &context()));
    let (_, error) = drain_run(&mut run).await;
    assert!(matches!(error, Some(VaxError::Stream(ref m)) if m == "overloaded"), "{error:?}");
}

#[tokio::test]
async fn provider_failure_propagates() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_failure("upstream down");

    let mut run = runner(&provider).run_streamed(request(TRIAGE, "hi", &context()));
    let (events, error) = drain_run(&mut run).await;
    assert_eq!(trace(&events), vec!["agent:triage_agent"]);
    assert!(matches!(error, Some(VaxError::Api { status: 500, .. })), "{error:?}");
}
