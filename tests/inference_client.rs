//! The OpenAI-compatible client against an in-process fake endpoint.

mod common;

use axum::http::StatusCode;
use common::{completion, fake_openai, prompt_of};
use serde_json::json;
use typhoon_ocr::pipeline::encode::ImagePayload;
use typhoon_ocr::{
    ChatRequest, EndpointConfig, InferenceClient, InferenceError, OcrOptions,
    OpenAiCompatibleClient,
};

fn request() -> ChatRequest {
    let options = OcrOptions::builder()
        .model("typhoon-ocr-preview")
        .temperature(0.2)
        .max_tokens(1024)
        .build()
        .unwrap();
    ChatRequest::new(
        &options,
        "Read the page".to_string(),
        ImagePayload {
            base64: "iVBORw0KGgo=".to_string(),
            mime_type: "image/png",
        },
    )
}

fn client(base_url: &str) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(EndpointConfig::new(base_url, "sk-test", "typhoon-ocr"), 10)
        .unwrap()
}

#[tokio::test]
async fn sends_openai_request_and_parses_reply() {
    let (base, requests) =
        fake_openai(|_, _| (StatusCode::OK, completion(r#"{"natural_text": "hi"}"#, 42))).await;

    let reply = client(&base).complete(&request()).await.unwrap();
    assert_eq!(reply.content, r#"{"natural_text": "hi"}"#);
    assert_eq!(reply.tokens(), 42);

    let captured = requests.lock().unwrap()[0].clone();
    assert_eq!(captured.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(captured.body["model"], "typhoon-ocr-preview");
    assert_eq!(captured.body["max_tokens"], 1024);
    assert_eq!(prompt_of(&captured.body), "Read the page");
    assert_eq!(
        captured.body["messages"][0]["content"][1]["image_url"]["url"],
        "data:image/png;base64,iVBORw0KGgo="
    );
    assert!(captured.body.get("repetition_penalty").is_some());
}

#[tokio::test]
async fn server_errors_are_transient() {
    let (base, _) = fake_openai(|_, _| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": {"message": "overloaded"}}),
        )
    })
    .await;

    let err = client(&base).complete(&request()).await.unwrap_err();
    match &err {
        InferenceError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn auth_errors_are_permanent() {
    let (base, _) = fake_openai(|_, _| {
        (
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "bad key"}}),
        )
    })
    .await;

    let err = client(&base).complete(&request()).await.unwrap_err();
    assert!(matches!(err, InferenceError::Status { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    // Bind then drop a listener so the port is closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/v1"))
        .complete(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::Transport(_)), "got {err:?}");
    assert!(err.is_transient());
}
