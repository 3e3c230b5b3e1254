//! Test utilities for pulse-core
//!
//! A mock LLM server speaking both the Ollama and the OpenAI chat dialects. It
//! echoes the DATA section of the prompt so tests can check that rendered
//! answers carry the engine's facts.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Mock LLM server for testing and development
pub struct MockLlmServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[derive(Clone, Copy)]
struct ServerState {
    delay: Duration,
}

impl MockLlmServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_slow(Duration::ZERO).await
    }

    /// Start a server that waits `delay` before answering completions
    pub async fn start_slow(delay: Duration) -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(ServerState { delay });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLlmServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pull the data block out of a renderer prompt
fn echo_data(prompt: &str) -> String {
    let data = match prompt.rfind("DATA:") {
        Some(start) => {
            let rest = &prompt[start + 5..];
            rest.split("QUESTION:").next().unwrap_or(rest)
        }
        None => prompt,
    };
    format!("Here is what I found:\n{}", data.trim())
}

async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2025-01-01T00:00:00Z".to_string(),
            size: 2_000_000_000,
        }],
    })
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({"object": "list", "data": [{"id": "mock-model", "object": "model"}]}))
}

async fn handle_generate(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerateResponse> {
    tokio::time::sleep(state.delay).await;
    Json(GenerateResponse {
        response: echo_data(&request.prompt),
        model: request.model,
        done: true,
    })
}

async fn handle_chat(
    State(state): State<ServerState>,
    Json(request): Json<ChatRequest>,
) -> Json<serde_json::Value> {
    tokio::time::sleep(state.delay).await;
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    Json(serde_json::json!({
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": echo_data(last_user)},
            "finish_reason": "stop"
        }]
    }))
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}
