use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending request to {}: {}", self.config.provider, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.config.provider))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.config.provider, status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.config.provider))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .with_context(|| format!("No response from {}", self.config.provider))
    }

    /// Single-turn prompt; returns the trimmed text of the first choice.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let reply = self.chat(&[ChatMessage::user(prompt)]).await?;
        let content = reply.content.unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            anyhow::bail!("Empty completion from {}", self.config.provider);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockLlm};

    #[tokio::test]
    async fn test_complete_returns_trimmed_content() {
        let server = MockLlm::always("  hello there \n").spawn().await;
        let client = LlmClient::new(testing::llm_config(&server.base_url));

        let reply = client.complete("say hello").await.unwrap();
        assert_eq!(reply, "hello there");

        let prompts = server.prompts().await;
        assert_eq!(prompts, vec!["say hello".to_string()]);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockLlm::failing().spawn().await;
        let client = LlmClient::new(testing::llm_config(&server.base_url));

        let err = client.complete("anything").await.unwrap_err();
        assert!(err.to_string().contains("API error"));
    }

    #[tokio::test]
    async fn test_blank_completion_is_an_error() {
        let server = MockLlm::always("   ").spawn().await;
        let client = LlmClient::new(testing::llm_config(&server.base_url));

        assert!(client.complete("anything").await.is_err());
    }
}
