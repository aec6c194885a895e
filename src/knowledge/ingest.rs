//! One-shot builder for the fact-check knowledge base.
//!
//! Pulls the latest items from trusted fact-checking RSS feeds, adds a small
//! set of curated facts about common misinformation, splits everything into
//! search-sized chunks and rewrites the [`KnowledgeStore`] from scratch.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use super::chunks::NewChunk;
use super::KnowledgeStore;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const FEED_TIMEOUT: Duration = Duration::from_secs(10);
const ITEMS_PER_FEED: usize = 20;
const MAX_CHUNK_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleKind {
    FactCheck,
    CuratedFact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    pub kind: ArticleKind,
}

/// An RSS feed of published fact-checks.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    /// Descriptions carry markup that needs flattening to text
    pub html_description: bool,
}

pub fn default_feeds() -> Vec<FeedSource> {
    vec![
        FeedSource {
            name: "Snopes".to_string(),
            url: "https://www.snopes.com/feed/".to_string(),
            html_description: false,
        },
        FeedSource {
            name: "FactCheck.org".to_string(),
            url: "https://www.factcheck.org/feed/".to_string(),
            html_description: true,
        },
    ]
}

pub fn curated_facts() -> Vec<Article> {
    let fact = |title: &str, content: &str, source: &str, url: &str| Article {
        title: title.to_string(),
        content: content.to_string(),
        source: source.to_string(),
        url: url.to_string(),
        kind: ArticleKind::CuratedFact,
    };

    vec![
        fact(
            "COVID-19 Vaccine Safety",
            "COVID-19 vaccines authorized for use have undergone rigorous testing and continue \
             to be monitored for safety. Serious adverse reactions are rare.",
            "CDC",
            "https://www.cdc.gov/coronavirus/2019-ncov/vaccines/safety/safety-of-vaccines.html",
        ),
        fact(
            "5G and Health Concerns",
            "There is no scientific evidence that 5G networks cause health problems. 5G uses \
             radio frequencies that are non-ionizing and do not damage DNA.",
            "WHO",
            "https://www.who.int/news-room/q-a-detail/radiation-5g-mobile-networks-and-health",
        ),
        fact(
            "Climate Change Scientific Consensus",
            "There is overwhelming scientific consensus that climate change is occurring and is \
             primarily caused by human activities. Over 97% of climate scientists agree on this.",
            "NASA",
            "https://climate.nasa.gov/scientific-consensus/",
        ),
        fact(
            "Government Scheme Verification",
            "Always verify government schemes and benefits through official government websites \
             and helplines. Fake schemes often spread through social media.",
            "Government Advisory",
            "https://www.india.gov.in",
        ),
        fact(
            "WhatsApp Forward Reliability",
            "Information shared through WhatsApp forwards is often unreliable. Always check the \
             original source before believing or sharing such information.",
            "Digital Literacy",
            "https://www.whatsapp.com/safety/",
        ),
    ]
}

fn html_to_text(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), 200).unwrap_or_else(|_| html.to_string());
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn child_text(item: roxmltree::Node<'_, '_>, tag: &str) -> String {
    item.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .unwrap_or_default()
        .to_string()
}

/// Parse the first items of an RSS document. Items without a title or
/// description are skipped.
pub fn parse_feed(xml: &str, feed: &FeedSource) -> Result<Vec<Article>> {
    let doc = roxmltree::Document::parse(xml)
        .with_context(|| format!("Invalid RSS from {}", feed.name))?;

    let articles = doc
        .descendants()
        .filter(|n| n.has_tag_name("item"))
        .take(ITEMS_PER_FEED)
        .filter_map(|item| {
            let title = child_text(item, "title");
            let mut description = child_text(item, "description");
            if feed.html_description && !description.is_empty() {
                description = html_to_text(&description);
            }

            let title = title.trim();
            let description = description.trim();
            if title.is_empty() || description.is_empty() {
                return None;
            }

            Some(Article {
                title: title.to_string(),
                content: description.to_string(),
                source: feed.name.clone(),
                url: child_text(item, "link").trim().to_string(),
                kind: ArticleKind::FactCheck,
            })
        })
        .collect();

    Ok(articles)
}

/// Split an article into chunks. Short articles stay whole; longer ones are
/// packed sentence by sentence into chunks under [`MAX_CHUNK_CHARS`].
pub fn chunk_article(article: &Article) -> Vec<String> {
    let full_text = format!("{}\n\n{}", article.title, article.content);
    if full_text.chars().count() <= MAX_CHUNK_CHARS {
        return vec![full_text];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in full_text.split(". ") {
        if current.chars().count() + sentence.chars().count() < MAX_CHUNK_CHARS {
            current.push_str(sentence);
            current.push_str(". ");
        } else {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
            }
            current = format!("{}. ", sentence);
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

pub struct Ingestor {
    client: reqwest::Client,
    feeds: Vec<FeedSource>,
    pause: Duration,
}

impl Ingestor {
    pub fn new(feeds: Vec<FeedSource>, pause: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FEED_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            feeds,
            pause,
        })
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(&feed.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", feed.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} feed returned {}", feed.name, status);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} feed", feed.name))?;
        parse_feed(&body, feed)
    }

    pub async fn collect(&self) -> Vec<Article> {
        let mut articles = Vec::new();

        for feed in &self.feeds {
            match self.fetch_feed(feed).await {
                Ok(found) => {
                    info!("Scraped {} articles from {}", found.len(), feed.name);
                    articles.extend(found);
                }
                Err(e) => error!("Error scraping {}: {:#}", feed.name, e),
            }
            tokio::time::sleep(self.pause).await;
        }

        let curated = curated_facts();
        info!("Added {} curated facts", curated.len());
        articles.extend(curated);

        articles
    }

    /// Rebuild the knowledge base. Returns the number of stored chunks.
    /// The previous contents are only replaced once the new set is ready.
    pub async fn run(&self, store: &KnowledgeStore) -> Result<usize> {
        info!("Starting knowledge base ingestion...");

        let mut articles = self.collect().await;
        let curated = articles
            .iter()
            .filter(|a| a.kind == ArticleKind::CuratedFact)
            .count();
        info!(
            "Total articles collected: {} ({} fact-checks, {} curated)",
            articles.len(),
            articles.len() - curated,
            curated
        );

        if articles.is_empty() {
            warn!("No articles collected. Creating minimal knowledge base...");
            articles = curated_facts();
        }

        let chunks: Vec<NewChunk> = articles
            .iter()
            .flat_map(|article| {
                chunk_article(article).into_iter().map(|content| NewChunk {
                    source: article.source.clone(),
                    title: article.title.clone(),
                    url: article.url.clone(),
                    content,
                })
            })
            .collect();

        if chunks.is_empty() {
            anyhow::bail!("No texts processed");
        }

        let stored = store.replace_all(&chunks).await?;
        info!("Knowledge base creation completed: {} text chunks", stored);
        Ok(stored)
    }
}
