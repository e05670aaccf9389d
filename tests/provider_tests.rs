//! OpenAI-compatible provider against a mock Chat Completions endpoint.

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vaxbot::error::VaxError;
use vaxbot::provider::{
    ModelProvider, OpenAiProvider, ProviderRequest, ToolChoice, ToolDefinition,
};
use vaxbot::types::{FinishReason, ModelMessage, StreamEventType, TextStreamDelta};

fn sse(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new("gpt-4o-mini", "sk-test", Some(format!("{}/v1/", server.uri())))
}

async fn collect(provider: &OpenAiProvider, request: &ProviderRequest) -> Vec<TextStreamDelta> {
    provider
        .stream_text(request)
        .await
        .unwrap()
        .map(|d| d.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn streamed_text_and_tool_fragments_are_decoded() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"delta": {"content": "Let me "}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {"content": "check."}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0, "id": "call_1",
            "function": {"name": "get_available_slots_tool", "arguments": "{\"clinic\":"}
        }]}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0, "function": {"arguments": "\"Bedok\"}"}
        }]}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "tool_choice": {"type": "function", "function": {"name": "get_available_slots_tool"}}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let request = ProviderRequest::new(vec![ModelMessage::user("any slots at Bedok?")])
        .with_tools(vec![ToolDefinition {
            name: "get_available_slots_tool".into(),
            description: "Gets slots.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }])
        .with_tool_choice(ToolChoice::Function("get_available_slots_tool".into()));
    let deltas = collect(&provider(&server), &request).await;

    let kinds: Vec<_> = deltas.iter().map(|d| d.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            StreamEventType::TextDelta,
            StreamEventType::TextDelta,
            StreamEventType::ToolCallDelta,
            StreamEventType::ToolCallDelta,
            StreamEventType::Done,
        ]
    );
    assert_eq!(deltas[0].text, "Let me ");
    let first = deltas[2].tool_call.as_ref().unwrap();
    assert_eq!(first.id.as_deref(), Some("call_1"));
    assert_eq!(first.name.as_deref(), Some("get_available_slots_tool"));
    assert_eq!(deltas[3].tool_call.as_ref().unwrap().arguments, "\"Bedok\"}");
    assert_eq!(deltas[4].finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn completion_parses_tool_call_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": false, "temperature": 0.0, "seed": 1234})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "records_tool", "arguments": "{\"limit\":2}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let request = ProviderRequest::new(vec![ModelMessage::user("records")]).with_settings(
        vaxbot::types::GenerationSettings::builder()
            .temperature(0.0)
            .seed(1234)
            .build(),
    );
    let response = provider(&server).generate_text(&request).await.unwrap();
    assert_eq!(response.text, "");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_9");
    assert_eq!(response.tool_calls[0].arguments, json!({"limit": 2}));
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn error_statuses_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let request = ProviderRequest::new(vec![ModelMessage::user("hi")]);
    let p = provider(&server);
    let err = p.generate_text(&request).await.unwrap_err();
    assert!(matches!(err, VaxError::Authentication(_)), "{err}");
    let err = match p.stream_text(&request).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(err, VaxError::Api { status: 429, .. }), "{err}");
}

/// Serve one request, writing the SSE body in the given pieces.
async fn serve_in_pieces(pieces: Vec<Vec<u8>>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let body_start = loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if let Some(i) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break i + 4;
            }
        };
        let head = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);
        while request.len() < body_start + length {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
        }

        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        for piece in pieces {
            socket.write_all(&piece).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}/v1/")
}

#[tokio::test]
async fn characters_split_across_reads_are_decoded_whole() {
    let body = sse(&[
        json!({"choices": [{"delta": {"content": "疫苗"}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
    ])
    .into_bytes();
    // Cut inside the three-byte encoding of the first character.
    let cut = body.windows(3).position(|w| w == "疫".as_bytes()).unwrap() + 1;
    let base_url = serve_in_pieces(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;

    let provider = OpenAiProvider::new("gpt-4o-mini", "sk-test", Some(base_url));
    let request = ProviderRequest::new(vec![ModelMessage::user("我想打疫苗")]);
    let deltas = collect(&provider, &request).await;

    assert_eq!(deltas[0].event_type, StreamEventType::TextDelta);
    assert_eq!(deltas[0].text, "疫苗");
    assert_eq!(deltas[1].finish_reason, Some(FinishReason::Stop));
}
