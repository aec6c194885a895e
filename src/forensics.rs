use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::SearchConfig;

const MAX_QUERY_CHARS: usize = 100;
const SPREAD_WINDOW: usize = 5;

/// Where a claim was first seen and how it is spreading.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceReport {
    pub first_seen: String,
    pub spread: String,
}

impl TraceReport {
    fn unknown(spread: &str) -> Self {
        Self {
            first_seen: "Unknown".to_string(),
            spread: spread.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    organic_results: Option<Vec<OrganicResult>>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    date: Option<String>,
    link: Option<String>,
}

/// Traces the earliest web mention of a claim through SerpApi's Google engine.
pub struct Tracer {
    client: reqwest::Client,
    config: SearchConfig,
}

impl Tracer {
    pub fn new(config: SearchConfig) -> Self {
        if config.serpapi_key.is_empty() {
            info!("SerpApi key not configured. Origin tracing disabled.");
        }
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn trace(&self, claim: &str) -> TraceReport {
        if self.config.serpapi_key.is_empty() {
            warn!("SerpApi key not found");
            return TraceReport::unknown("Unable to trace origin");
        }

        match self.search(claim).await {
            Ok(Some(response)) => match response.organic_results {
                Some(results) => summarize(&results),
                None => TraceReport::unknown("Unable to trace spread pattern"),
            },
            Ok(None) => TraceReport::unknown("Unable to trace spread pattern"),
            Err(e) => {
                error!("Error searching claim origin: {:#}", e);
                TraceReport::unknown("Search unavailable")
            }
        }
    }

    /// `Ok(None)` when SerpApi answers with a non-success status.
    async fn search(&self, claim: &str) -> Result<Option<SearchResponse>> {
        let query = search_query(claim);
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query.as_str()),
                ("api_key", self.config.serpapi_key.as_str()),
                ("num", "10"),
                ("sort", "date"),
            ])
            .send()
            .await
            .context("Failed to call SerpApi")?;

        let status = response.status();
        if !status.is_success() {
            warn!("SerpApi returned {}", status);
            return Ok(None);
        }

        let parsed = response
            .json()
            .await
            .context("Failed to parse SerpApi response")?;
        Ok(Some(parsed))
    }
}

/// Exact-phrase query over the first 100 characters of the claim.
fn search_query(claim: &str) -> String {
    let truncated: String = claim.chars().take(MAX_QUERY_CHARS).collect();
    format!("\"{}\"", truncated)
}

fn link_host(link: &str) -> &str {
    let after_scheme = link.rsplit("//").next().unwrap_or(link);
    after_scheme.split('/').next().unwrap_or(after_scheme)
}

fn summarize(results: &[OrganicResult]) -> TraceReport {
    let dates: Vec<&str> = results.iter().filter_map(|r| r.date.as_deref()).collect();
    let sources: Vec<&str> = results
        .iter()
        .filter_map(|r| r.link.as_deref())
        .map(link_host)
        .collect();

    let first_seen = dates
        .iter()
        .min()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Recently".to_string());

    let unique: HashSet<&str> = sources.iter().take(SPREAD_WINDOW).copied().collect();
    let spread = match unique.len() {
        n if n > 3 => "Widely shared across multiple platforms",
        n if n > 1 => "Shared on a few platforms",
        _ => "Limited sharing detected",
    };

    TraceReport {
        first_seen,
        spread: spread.to_string(),
    }
}
