use futures::StreamExt;
use gemini_chat::core::{ApiKey, ChatError, ChatLoop, Config, Level, Logger, MemorySink, Termination};
use gemini_chat::providers::{ChatClient, GeminiClient, GeminiConnector, Message};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";
const STREAM_PATH: &str = "/v1beta/models/gemini-2.0-flash:streamGenerateContent";

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api_base = format!("{}/v1beta", server.uri());
    config.api_key = Some(ApiKey::new("test-key").unwrap());
    config
}

fn get_client(server: &MockServer) -> GeminiClient {
    let config = test_config(server);
    let api_key = config.api_key.clone().unwrap();
    GeminiClient::new(&api_key, config).unwrap()
}

fn reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}
    })
}

fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\r\n\r\n"))
        .collect()
}

#[tokio::test]
async fn test_gemini_send_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]},
                {"role": "user", "parts": [{"text": "how are you?"}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("Doing well.")))
        .expect(1)
        .mount(&server)
        .await;

    let messages = vec![
        Message::user("hi"),
        Message::model("hello"),
        Message::user("how are you?"),
    ];
    let response = get_client(&server).send(&messages).await;

    assert_eq!(response.unwrap(), "Doing well.");
}

#[tokio::test]
async fn test_gemini_sends_system_instruction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Answer in French."}]},
            "generationConfig": {"maxOutputTokens": 64}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("Bonjour")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.system_prompt = Some("Answer in French.".into());
    config.max_output_tokens = Some(64);
    let client = GeminiClient::new(&ApiKey::new("test-key").unwrap(), config).unwrap();

    let response = client.send(&[Message::user("hello")]).await;
    assert_eq!(response.unwrap(), "Bonjour");
}

#[tokio::test]
async fn test_gemini_send_message_invalid_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"reason": "API_KEY_INVALID", "domain": "googleapis.com"}]
            }
        })))
        .mount(&server)
        .await;

    let response = get_client(&server).send(&[Message::user("hello")]).await;

    match response {
        Err(ChatError::Unrecoverable(ref error_msg)) => {
            assert!(
                error_msg.contains("API key not valid"),
                "Expected error message to indicate invalid key, got: {error_msg}"
            );
        }
        other => panic!("Expected an unrecoverable error for an invalid key, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_gemini_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let response = get_client(&server).send(&[Message::user("hello")]).await;

    assert!(matches!(response, Err(ChatError::Transient(msg)) if msg.contains("Resource has been exhausted")));
}

#[tokio::test]
async fn test_gemini_malformed_response_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let response = get_client(&server).send(&[Message::user("hello")]).await;

    assert!(matches!(response, Err(ChatError::Transient(_))));
}

#[tokio::test]
async fn test_gemini_send_message_streaming() {
    let server = MockServer::start().await;
    let body = sse_body(&[reply("Hel"), reply("lo"), json!({"usageMetadata": {"totalTokenCount": 6}})]);
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut stream = get_client(&server)
        .send_streaming(&[Message::user("hello")])
        .await
        .expect("Stream should be ok");

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.expect("Chunk should be ok"));
    }
    assert_eq!(chunks, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_gemini_streaming_error_event() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        reply("partial"),
        json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}}),
    ]);
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = get_client(&server)
        .send_streaming(&[Message::user("hello")])
        .await
        .expect("Stream should be ok");
    let chunks: Vec<Result<String, ChatError>> = stream.collect().await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].as_deref().ok(), Some("partial"));
    assert!(matches!(&chunks[1], Err(ChatError::Transient(msg)) if msg.contains("overloaded")));
}

#[tokio::test]
async fn test_gemini_streaming_blocked_prompt() {
    let server = MockServer::start().await;
    let body = sse_body(&[json!({"promptFeedback": {"blockReason": "SAFETY"}})]);
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = get_client(&server)
        .send_streaming(&[Message::user("hello")])
        .await
        .expect("Stream should be ok");
    let chunks: Vec<Result<String, ChatError>> = stream.collect().await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].as_deref().ok(),
        Some("No response received (blocked: SAFETY).")
    );
}

#[tokio::test]
async fn test_chat_session_against_gemini_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hi there!")))
        .expect(1)
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let logger = Logger::new().with_sink(sink.clone());
    let mut config = test_config(&server);
    config.stream = false;

    let mut chat = ChatLoop::start(config, &GeminiConnector, &logger).unwrap();
    let mut input: &[u8] = b"hello\nexit\n";
    let mut output = Vec::new();
    let termination = chat.run(&mut input, &mut output, std::future::pending()).await;

    let output = strip_ansi_escapes::strip_str(String::from_utf8(output).unwrap());
    assert!(matches!(termination, Termination::UserExit));
    assert!(output.contains("Gemini: Hi there!"));
    assert_eq!(sink.count(Level::Error), 0);
    assert_eq!(sink.count(Level::Critical), 0);
}

#[tokio::test]
async fn test_chat_session_stops_on_rejected_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Method doesn't allow unregistered callers.", "status": "PERMISSION_DENIED"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let logger = Logger::new().with_sink(sink.clone());

    let mut chat = ChatLoop::start(test_config(&server), &GeminiConnector, &logger).unwrap();
    let mut input: &[u8] = b"hello\nhello again\n";
    let mut output = Vec::new();
    let termination = chat.run(&mut input, &mut output, std::future::pending()).await;

    assert!(matches!(termination, Termination::Unrecoverable(_)));
    assert_eq!(sink.count(Level::Critical), 1);
    assert_eq!(input, b"hello again\n");
}
