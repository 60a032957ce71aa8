//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_engine::ChatChannel;
use parley_providers::{CompletionClient, RetryConfig};
use parley_types::{ApiKey, InboundMessage};

pub const CHAT_MODEL: &str = "chat-test-model";
pub const LIBRARIAN_MODEL: &str = "librarian-test-model";
pub const CHANNEL: &str = "placeholder-gpt";
pub const BOT_ID: &str = "bot";

/// Start a mock server that simulates the chat completions API
pub async fn start_openai_mock() -> MockServer {
    MockServer::start().await
}

pub fn completion_body(content: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_680_000_000,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

pub fn server_error_body() -> Value {
    serde_json::json!({
        "error": {"message": "The server had an error", "type": "server_error"}
    })
}

/// Mount a successful completion for requests naming `model`.
pub async fn mount_completion(server: &MockServer, model: &str, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": model})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .mount(server)
        .await;
}

/// Mount a fixed JSON body for requests naming `model`, at most `times` times.
pub async fn mount_payload(server: &MockServer, model: &str, status: u16, body: Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": model})))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Client against the mock server with a short retry delay.
pub fn fast_client(server: &MockServer) -> CompletionClient {
    CompletionClient::new(
        ApiKey::new("sk-test"),
        &format!("{}/v1", server.uri()),
        Duration::from_secs(5),
    )
    .expect("client builds")
    .with_retry(RetryConfig {
        max_attempts: 3,
        delay: Duration::from_millis(10),
    })
}

/// Request bodies received for `model`, oldest first.
pub async fn requests_for(server: &MockServer, model: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| request.body_json::<Value>().ok())
        .filter(|body| body["model"] == model)
        .collect()
}

/// Message contents of a chat completions request body.
pub fn message_contents(body: &Value) -> Vec<String> {
    body["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m["content"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn inbound(author: &str, content: &str) -> InboundMessage {
    InboundMessage {
        author_id: format!("user-{author}"),
        author_name: author.to_string(),
        channel: CHANNEL.to_string(),
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

/// Channel that records everything sent to it.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatChannel for RecordingChannel {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn typing(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Poll `condition` every 10ms, failing the test after 5s.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
