//! Local stand-ins for the LLM, SerpApi and Twilio endpoints used by unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::{LlmConfig, LlmProvider, TwilioConfig};

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn llm_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::Openai,
        model: "test-model".to_string(),
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        max_tokens: 256,
    }
}

pub fn twilio_config(api_base: &str) -> TwilioConfig {
    TwilioConfig {
        account_sid: "AC_test".to_string(),
        auth_token: "token".to_string(),
        api_base: api_base.to_string(),
        ..TwilioConfig::default()
    }
}

/// Chat-completion mock that answers by matching substrings of the prompt.
#[derive(Default)]
pub struct MockLlm {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
}

#[derive(Clone)]
pub struct MockLlmServer {
    pub base_url: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlmServer {
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

struct MockLlmState {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(reply: &str) -> Self {
        Self::new().otherwise(reply)
    }

    /// Every request gets a 500.
    pub fn failing() -> Self {
        Self::new()
    }

    pub fn when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    pub async fn spawn(self) -> MockLlmServer {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(MockLlmState {
            rules: self.rules,
            fallback: self.fallback,
            prompts: prompts.clone(),
        });
        let app = Router::new()
            .route("/chat/completions", post(chat_completions))
            .with_state(state);
        MockLlmServer {
            base_url: serve(app).await,
            prompts,
        }
    }
}

async fn chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let prompt = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();
    state.prompts.lock().await.push(prompt.clone());

    let reply = state
        .rules
        .iter()
        .find(|(needle, _)| prompt.contains(needle.as_str()))
        .map(|(_, reply)| reply.clone())
        .or_else(|| state.fallback.clone())
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": reply } }]
    })))
}

/// Records every message "sent" through the Twilio Messages API.
#[derive(Clone)]
pub struct MockTwilioServer {
    pub base_url: String,
    sent: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockTwilioServer {
    pub async fn spawn() -> Self {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/{sid}/Messages.json",
                post(create_message),
            )
            .with_state(sent.clone());
        Self {
            base_url: serve(app).await,
            sent,
        }
    }

    pub async fn sent(&self) -> Vec<HashMap<String, String>> {
        self.sent.lock().await.clone()
    }

    pub async fn bodies(&self) -> Vec<String> {
        self.sent()
            .await
            .into_iter()
            .filter_map(|mut form| form.remove("Body"))
            .collect()
    }
}

async fn create_message(
    State(sent): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut sent = sent.lock().await;
    sent.push(form);
    (
        StatusCode::CREATED,
        Json(json!({ "sid": format!("SM{:04}", sent.len()) })),
    )
}
