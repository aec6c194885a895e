use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::forensics::{TraceReport, Tracer};
use crate::knowledge::KnowledgeStore;
use crate::llm::LlmClient;

const CONTEXT_PER_CLAIM: usize = 3;
const CONTEXT_IN_PROMPT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn emoji(self) -> &'static str {
        match self {
            RiskLevel::High => "🔴",
            RiskLevel::Medium => "🟡",
            RiskLevel::Low => "🟢",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::High => "HIGH RISK",
            RiskLevel::Medium => "MEDIUM RISK",
            RiskLevel::Low => "LOW RISK",
        }
    }

    /// First risk label mentioned in a verdict.
    pub fn detect(verdict: &str) -> Option<Self> {
        let upper = verdict.to_uppercase();
        [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low]
            .into_iter()
            .filter_map(|level| upper.find(level.label()).map(|pos| (pos, level)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, level)| level)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.emoji(), self.label())
    }
}

fn fallback_verdict(gist: &str, reasons: &[&str], action: &str) -> String {
    let why: String = reasons.iter().map(|r| format!("\n• {}", r)).collect();
    format!(
        "{}\n\n**The Gist:** {}\n\n**Why?**{}\n\n**Action:** {}",
        RiskLevel::Medium,
        gist,
        why,
        action
    )
}

/// Verdict used when the synthesis call fails.
pub fn unverified_verdict() -> String {
    fallback_verdict(
        "Unable to fully verify this information.",
        &[
            "Analysis system temporarily unavailable",
            "Recommend checking with trusted sources",
        ],
        "Verify before sharing",
    )
}

/// Verdict used when the message can't be analyzed at all.
pub fn unavailable_verdict() -> String {
    fallback_verdict(
        "Unable to analyze this message due to technical issues.",
        &[
            "System temporarily unavailable",
            "Recommend manual verification",
        ],
        "Check with trusted sources before sharing",
    )
}

fn claims_prompt(text: &str) -> String {
    format!(
        "Extract the main verifiable claims from this text. \
         Focus on factual statements that can be fact-checked.\n\
         Return ONLY a numbered list of claims, nothing else:\n\n\
         Text: \"{text}\"\n\n\
         Claims:"
    )
}

/// Pull claims out of a numbered or bulleted list, dropping the markers.
pub fn parse_claims(list: &str) -> Vec<String> {
    list.lines()
        .map(str::trim)
        .filter(|line| {
            line.chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '-')
        })
        .map(|line| {
            let unnumbered = line.trim_start_matches(|c: char| c.is_ascii_digit());
            let line = match unnumbered.strip_prefix('.') {
                Some(rest) if unnumbered.len() < line.len() => rest.trim_start(),
                _ => line,
            };
            line.strip_prefix('-').map(str::trim_start).unwrap_or(line).trim()
        })
        .filter(|claim| !claim.is_empty())
        .map(str::to_string)
        .collect()
}

fn synthesis_prompt(
    claims: &[String],
    context: &[String],
    trace: &TraceReport,
    original: &str,
) -> String {
    let context_text = if context.is_empty() {
        "No specific fact-check data available".to_string()
    } else {
        context
            .iter()
            .take(CONTEXT_IN_PROMPT)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    };
    let claims_text = claims
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    let first_seen = &trace.first_seen;
    let spread = &trace.spread;
    let (high, medium, low) = (RiskLevel::High, RiskLevel::Medium, RiskLevel::Low);

    format!(
        r#"You are SatyaTrace, a fact-checking assistant. Analyze the following information and provide a structured response.

ORIGINAL MESSAGE: "{original}"

KEY CLAIMS:
{claims_text}

RELEVANT FACT-CHECK CONTEXT:
{context_text}

FORENSICS DATA:
- First seen: {first_seen}
- Spread pattern: {spread}

Create a response with this EXACT structure:

[RISK LEVEL EMOJI] [RISK LEVEL]

**The Gist:** [One sentence summary of the claim's accuracy]

**Why?**
• [Reason 1]
• [Reason 2]
• [Reason 3 if needed]

**🔍 Trace Report:**
📅 First Seen: {first_seen}
📊 How it's Spreading: {spread}

**Action:** [Simple recommendation like "Don't forward this" or "This appears reliable"]

RISK LEVELS:
- {high}: False, misleading, or harmful information
- {medium}: Partially true, needs context, or unverified
- {low}: Appears accurate and from reliable sources

Keep the response concise and clear."#
    )
}

/// Claim extraction, knowledge-base retrieval, origin tracing and verdict
/// synthesis over English text.
pub struct Analyzer {
    llm: Arc<LlmClient>,
    knowledge: Option<KnowledgeStore>,
    tracer: Tracer,
}

impl Analyzer {
    pub fn new(llm: Arc<LlmClient>, knowledge: Option<KnowledgeStore>, tracer: Tracer) -> Self {
        Self {
            llm,
            knowledge,
            tracer,
        }
    }

    pub async fn extract_claims(&self, text: &str) -> Vec<String> {
        match self.llm.complete(&claims_prompt(text)).await {
            Ok(list) => {
                let claims = parse_claims(&list);
                info!("Extracted {} claims", claims.len());
                claims
            }
            Err(e) => {
                error!("Error extracting claims: {:#}", e);
                vec![text.to_string()]
            }
        }
    }

    pub async fn retrieve_context(&self, claims: &[String]) -> Vec<String> {
        let Some(store) = &self.knowledge else {
            warn!("Knowledge base not available");
            return Vec::new();
        };

        match self.search_claims(store, claims).await {
            Ok(context) => {
                info!("Retrieved {} relevant contexts", context.len());
                context
            }
            Err(e) => {
                error!("Error retrieving context: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn search_claims(&self, store: &KnowledgeStore, claims: &[String]) -> Result<Vec<String>> {
        let size = store.count().await?;
        if size == 0 {
            warn!("Knowledge base is empty");
            return Ok(Vec::new());
        }

        let k = CONTEXT_PER_CLAIM.min(size);
        let mut context = Vec::new();
        for claim in claims {
            let hits = store.search(claim, k).await?;
            context.extend(hits.into_iter().map(|chunk| chunk.content));
        }
        Ok(context)
    }

    pub async fn synthesize(
        &self,
        claims: &[String],
        context: &[String],
        trace: &TraceReport,
        original: &str,
    ) -> String {
        let prompt = synthesis_prompt(claims, context, trace, original);
        match self.llm.complete(&prompt).await {
            Ok(verdict) => {
                info!("Response synthesized successfully");
                verdict
            }
            Err(e) => {
                error!("Error synthesizing response: {:#}", e);
                unverified_verdict()
            }
        }
    }

    /// Full analysis of an English message; always yields a verdict.
    pub async fn run(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            warn!("Nothing to analyze");
            return unavailable_verdict();
        }

        info!("Starting analysis");

        let claims = self.extract_claims(text).await;
        let context = self.retrieve_context(&claims).await;

        let primary = claims.first().map(String::as_str).unwrap_or(text);
        let trace = self.tracer.trace(primary).await;

        let verdict = self.synthesize(&claims, &context, &trace, text).await;
        match RiskLevel::detect(&verdict) {
            Some(level) => info!("Analysis completed: {}", level.label()),
            None => info!("Analysis completed without a recognizable risk level"),
        }
        verdict
    }
}
