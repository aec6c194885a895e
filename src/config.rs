use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openrouter,
    Ollama,
    Openai,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Openai => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Openai => "https://api.openai.com/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: Option<EmbeddingApiConfig>,
    #[serde(default = "default_knowledge_config")]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingApiConfig {
    pub api_key: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_whatsapp_number")]
    pub whatsapp_number: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
    /// Externally visible webhook URL, needed to check `X-Twilio-Signature`.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub validate_signature: bool,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            whatsapp_number: default_whatsapp_number(),
            api_base: default_twilio_api_base(),
            public_url: None,
            validate_signature: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub serpapi_key: String,
    #[serde(default = "default_serpapi_url")]
    pub endpoint: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serpapi_key: String::new(),
            endpoint: default_serpapi_url(),
        }
    }
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("knowledge_base.db")
}

fn default_knowledge_config() -> KnowledgeConfig {
    KnowledgeConfig {
        database_path: default_db_path(),
    }
}

fn default_embedding_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_embedding_model() -> String {
    "qwen/qwen3-embedding-8b".to_string()
}

fn default_embedding_dimensions() -> usize {
    1536
}

// Twilio sandbox sender
fn default_whatsapp_number() -> String {
    "whatsapp:+14155238886".to_string()
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_serpapi_url() -> String {
    "https://serpapi.com/search".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment variables win over the file: `PORT`, `LLM_API_KEY`,
    /// `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_WHATSAPP_NUMBER`
    /// and `SERPAPI_KEY`. Unset or blank variables leave the file value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        let overrides: [(&mut String, &str); 5] = [
            (&mut self.llm.api_key, "LLM_API_KEY"),
            (&mut self.twilio.account_sid, "TWILIO_ACCOUNT_SID"),
            (&mut self.twilio.auth_token, "TWILIO_AUTH_TOKEN"),
            (&mut self.twilio.whatsapp_number, "TWILIO_WHATSAPP_NUMBER"),
            (&mut self.search.serpapi_key, "SERPAPI_KEY"),
        ];
        for (field, key) in overrides {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
