//! Shared fixtures: in-process HTTP servers and small documents.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Serve `router` on an ephemeral local port; returns `http://127.0.0.1:PORT`.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

/// A small white PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// One request received by the fake chat endpoint.
#[derive(Debug, Clone)]
pub struct Captured {
    pub authorization: Option<String>,
    pub body: Value,
}

type Reply = Arc<dyn Fn(usize, &Value) -> (StatusCode, Value) + Send + Sync>;

#[derive(Clone)]
struct FakeState {
    requests: Arc<Mutex<Vec<Captured>>>,
    reply: Reply,
}

/// A fake OpenAI-compatible endpoint. `reply` gets the 0-based call index
/// and the request body. Returns the base URL (with `/v1`) and the log of
/// received requests.
pub async fn fake_openai(
    reply: impl Fn(usize, &Value) -> (StatusCode, Value) + Send + Sync + 'static,
) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = FakeState {
        requests: Arc::clone(&requests),
        reply: Arc::new(reply),
    };
    let router = Router::new()
        .route("/v1/chat/completions", post(chat))
        .with_state(state);
    let base = spawn(router).await;
    (format!("{base}/v1"), requests)
}

async fn chat(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let index = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(Captured {
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: body.clone(),
        });
        requests.len() - 1
    };
    let (status, value) = (state.reply)(index, &body);
    (status, Json(value))
}

/// A chat-completion body answering `content` with `total_tokens` usage.
pub fn completion(content: &str, total_tokens: u64) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": total_tokens / 2,
            "completion_tokens": total_tokens - total_tokens / 2,
            "total_tokens": total_tokens
        }
    })
}

/// The text part of the first message of a captured request.
pub fn prompt_of(body: &Value) -> &str {
    body["messages"][0]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
}
