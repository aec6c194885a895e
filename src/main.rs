mod analyzer;
mod config;
mod forensics;
mod knowledge;
mod llm;
mod message;
mod pipeline;
mod responder;
mod translator;
mod webhook;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::forensics::Tracer;
use crate::knowledge::embeddings::EmbeddingConfig;
use crate::knowledge::ingest::{self, Ingestor};
use crate::knowledge::KnowledgeStore;
use crate::llm::LlmClient;
use crate::pipeline::Pipeline;
use crate::responder::TwilioClient;
use crate::translator::Translator;
use crate::webhook::{AppState, SignatureCheck};

/// Pause between feed requests while ingesting
const FEED_PAUSE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,satyatrace=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let ingest_only = args.iter().any(|a| a == "--ingest");
    let config_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {} ({})", config.llm.model, config.llm.provider);
    info!("  Knowledge base: {}", config.knowledge.database_path.display());
    info!(
        "  Origin tracing: {}",
        if config.search.serpapi_key.is_empty() { "disabled" } else { "enabled" }
    );

    let embedding_config = config.embedding.as_ref().map(EmbeddingConfig::from);

    if ingest_only {
        let store = KnowledgeStore::open(&config.knowledge.database_path, embedding_config)?;
        let ingestor = Ingestor::new(ingest::default_feeds(), FEED_PAUSE)?;
        let chunks = ingestor.run(&store).await?;
        info!(
            "Knowledge base written to {} ({} chunks)",
            config.knowledge.database_path.display(),
            chunks
        );
        return Ok(());
    }

    // The bot still answers without fact-check context
    let knowledge = match KnowledgeStore::open(&config.knowledge.database_path, embedding_config)
    {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Could not open knowledge base: {:#}. Will work without it.", e);
            None
        }
    };

    let llm = Arc::new(LlmClient::new(config.llm.clone()));
    let pipeline = Pipeline::new(
        Translator::new(llm.clone()),
        Analyzer::new(llm, knowledge, Tracer::new(config.search.clone())),
        TwilioClient::new(config.twilio.clone()),
    );

    let signature = match (&config.twilio.public_url, config.twilio.validate_signature) {
        (Some(url), true) => Some(SignatureCheck {
            auth_token: config.twilio.auth_token.clone(),
            public_url: url.clone(),
        }),
        (None, true) => {
            warn!("validate_signature is set but twilio.public_url is missing; not checking signatures");
            None
        }
        _ => None,
    };

    let state = AppState {
        handler: Arc::new(pipeline),
        signature,
    };

    info!("SatyaTrace is starting...");
    webhook::serve(&config.listen_addr(), state).await?;

    Ok(())
}
