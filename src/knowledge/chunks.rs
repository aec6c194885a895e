use anyhow::{Context, Result};
use uuid::Uuid;

use super::KnowledgeStore;
use crate::knowledge::embeddings::f32_to_blob;

/// A stored piece of fact-check text
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Turn free text into an FTS5 query of quoted OR-terms so punctuation in
/// user messages can't break the MATCH syntax.
pub(crate) fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// A chunk waiting to be written to the store
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: String,
}

fn insert_chunk(
    tx: &rusqlite::Transaction<'_>,
    chunk: &NewChunk,
    embedding: Option<&[f32]>,
) -> Result<()> {
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO chunks (id, source, title, url, content) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![&id, chunk.source, chunk.title, chunk.url, chunk.content],
    )
    .context("Failed to store knowledge chunk")?;

    if let Some(emb) = embedding {
        let rowid = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO chunk_embeddings (rowid, embedding) VALUES (?1, ?2)",
            rusqlite::params![rowid, f32_to_blob(emb)],
        )
        .context("Failed to store chunk embedding")?;
    }

    Ok(())
}

impl KnowledgeStore {
    /// Swap the whole knowledge base for `chunks` in one transaction.
    /// On any error the previous contents are left untouched.
    pub async fn replace_all(&self, chunks: &[NewChunk]) -> Result<usize> {
        // Generate embeddings before DB lock (async HTTP calls)
        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            embeddings.push(self.embeddings.try_embed_one(&chunk.content).await);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to start transaction")?;

        tx.execute_batch(
            "DELETE FROM chunk_embeddings;
             DELETE FROM chunks;",
        )
        .context("Failed to clear knowledge base")?;

        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            insert_chunk(&tx, chunk, embedding.as_deref())?;
        }

        tx.commit().context("Failed to commit knowledge base")?;
        Ok(chunks.len())
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))
            .context("Failed to count knowledge chunks")?;
        Ok(n as usize)
    }

    /// Hybrid search using Reciprocal Rank Fusion (vector + FTS5).
    /// Falls back to FTS5-only if embeddings are not available.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeChunk>> {
        let match_expr = match fts_query(query) {
            Some(expr) if limit > 0 => expr,
            _ => return Ok(Vec::new()),
        };

        let query_embedding = self.embeddings.try_embed_one(query).await;

        let conn = self.conn.lock().await;

        if let Some(ref qe) = query_embedding {
            let sql = "
                WITH vec_matches AS (
                    SELECT rowid,
                           row_number() OVER (ORDER BY distance) as rank_number
                    FROM (
                        SELECT rowid, distance
                        FROM chunk_embeddings
                        WHERE embedding MATCH ?1 AND k = ?2
                    )
                ),
                fts_matches AS (
                    SELECT rowid,
                           row_number() OVER (ORDER BY rank) as rank_number
                    FROM chunks_fts
                    WHERE chunks_fts MATCH ?3
                    LIMIT ?2
                )
                SELECT c.id, c.source, c.title, c.url, c.content,
                       coalesce(1.0 / (60 + fts.rank_number), 0.0) * 0.5
                       + coalesce(1.0 / (60 + vec.rank_number), 0.0) * 0.5 as combined_rank
                FROM chunks c
                LEFT JOIN vec_matches vec ON c.rowid = vec.rowid
                LEFT JOIN fts_matches fts ON c.rowid = fts.rowid
                WHERE vec.rowid IS NOT NULL OR fts.rowid IS NOT NULL
                ORDER BY combined_rank DESC
                LIMIT ?2
            ";

            let search_limit = (limit * 3) as i64;
            let mut stmt = conn.prepare(sql)?;
            let chunks = stmt
                .query_map(
                    rusqlite::params![f32_to_blob(qe), search_limit, match_expr],
                    parse_chunk_row,
                )?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to hybrid-search knowledge")?;

            Ok(chunks.into_iter().take(limit).collect())
        } else {
            let sql = "
                SELECT c.id, c.source, c.title, c.url, c.content
                FROM chunks c
                JOIN chunks_fts fts ON c.rowid = fts.rowid
                WHERE chunks_fts MATCH ?1
                ORDER BY fts.rank
                LIMIT ?2
            ";
            let mut stmt = conn.prepare(sql)?;
            let chunks = stmt
                .query_map(rusqlite::params![match_expr, limit as i64], parse_chunk_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to FTS-search knowledge")?;

            Ok(chunks)
        }
    }
}

fn parse_chunk_row(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeChunk> {
    Ok(KnowledgeChunk {
        id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        content: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::embeddings::EmbeddingConfig;
    use crate::testing;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    fn chunk(source: &str, title: &str, content: &str) -> NewChunk {
        NewChunk {
            source: source.to_string(),
            title: title.to_string(),
            url: String::new(),
            content: content.to_string(),
        }
    }

    fn sample_chunks() -> Vec<NewChunk> {
        vec![
            chunk(
                "WHO",
                "5G and Health Concerns",
                "There is no scientific evidence that 5G networks cause health problems.",
            ),
            chunk(
                "NASA",
                "Climate Change Scientific Consensus",
                "Climate change is primarily caused by human activities.",
            ),
        ]
    }

    async fn seeded() -> KnowledgeStore {
        let store = KnowledgeStore::open_in_memory(None).unwrap();
        store.replace_all(&sample_chunks()).await.unwrap();
        store
    }

    /// Three-dimensional embeddings keyed on topic words.
    async fn embedding_server() -> String {
        let app = Router::new().route(
            "/embeddings",
            post(|Json(req): Json<Value>| async move {
                let text = req["input"][0].as_str().unwrap_or_default().to_lowercase();
                let telecom = if text.contains("5g") || text.contains("radiation") {
                    1.0
                } else {
                    0.0
                };
                let climate = if text.contains("climate") { 1.0 } else { 0.0 };
                Json(json!({ "data": [{ "embedding": [telecom, climate, 0.1] }] }))
            }),
        );
        testing::serve(app).await
    }

    async fn seeded_with_embeddings() -> KnowledgeStore {
        let base = embedding_server().await;
        let store = KnowledgeStore::open_in_memory(Some(EmbeddingConfig {
            api_key: "k".to_string(),
            base_url: base,
            model: "embed".to_string(),
            dimensions: 3,
        }))
        .unwrap();
        store.replace_all(&sample_chunks()).await.unwrap();
        store
    }

    #[test]
    fn test_fts_query_sanitizes_input() {
        assert_eq!(
            fts_query("5G causes COVID-19!").as_deref(),
            Some("\"5g\" OR \"causes\" OR \"covid\" OR \"19\"")
        );
        assert_eq!(fts_query("\"*) OR (").as_deref(), Some("\"or\""));
        assert!(fts_query("?! a").is_none());
    }

    #[tokio::test]
    async fn test_replace_all_and_count() {
        let store = seeded().await;
        assert_eq!(store.count().await.unwrap(), 2);

        let stored = store
            .replace_all(&[chunk("CDC", "Vaccines", "Vaccines are monitored for safety.")])
            .await
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.search("climate", 3).await.unwrap().is_empty());
        assert_eq!(store.search("vaccines", 3).await.unwrap()[0].source, "CDC");
    }

    #[tokio::test]
    async fn test_search_finds_relevant_chunk() {
        let store = seeded().await;
        let hits = store.search("Do 5G towers cause health problems?", 3).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].source, "WHO");
        assert_eq!(hits[0].title, "5G and Health Concerns");
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_handles_punctuation() {
        let store = seeded().await;
        let hits = store.search("caused by 5G? (health) \"climate\"", 1).await.unwrap();
        assert_eq!(hits.len(), 1);

        assert!(store.search("!!!", 3).await.unwrap().is_empty());
        assert!(store.search("climate", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_search_with_embeddings() {
        let store = seeded_with_embeddings().await;

        let hits = store.search("5G health", 3).await.unwrap();
        assert_eq!(hits[0].source, "WHO");

        // No keyword overlap; only the vector side can rank this
        let hits = store.search("radiation fears", 3).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].source, "WHO");

        let hits = store.search("climate", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "NASA");
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_contents() {
        let store = seeded_with_embeddings().await;
        store
            .conn
            .lock()
            .await
            .execute_batch("DROP TABLE chunk_embeddings;")
            .unwrap();

        let result = store
            .replace_all(&[chunk("CDC", "Vaccines", "Vaccines are monitored for safety.")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
