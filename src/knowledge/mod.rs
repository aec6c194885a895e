pub mod chunks;
pub mod embeddings;
pub mod ingest;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Once};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::knowledge::embeddings::{EmbeddingConfig, EmbeddingEngine};

static REGISTER_VEC: Once = Once::new();

/// Register sqlite-vec for every connection opened after this call.
fn register_sqlite_vec() {
    REGISTER_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Fact-check knowledge base: text chunks in SQLite with hybrid vector+FTS5 search
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    pub embeddings: Arc<EmbeddingEngine>,
}

impl KnowledgeStore {
    /// Open or create the knowledge base at the given path.
    /// If `embedding_config` is provided, vector search is enabled alongside FTS5.
    pub fn open(path: &Path, embedding_config: Option<EmbeddingConfig>) -> Result<Self> {
        register_sqlite_vec();

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        let embeddings = EmbeddingEngine::new(embedding_config);

        // Migrate on the raw connection before wrapping it in the async Mutex.
        Self::run_migrations(&conn, embeddings.dimensions())?;

        info!("Knowledge base opened at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embeddings: Arc::new(embeddings),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(embedding_config: Option<EmbeddingConfig>) -> Result<Self> {
        register_sqlite_vec();

        let conn = Connection::open_in_memory()?;
        let embeddings = EmbeddingEngine::new(embedding_config);

        Self::run_migrations(&conn, embeddings.dimensions())?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embeddings: Arc::new(embeddings),
        })
    }

    fn run_migrations(conn: &Connection, dims: usize) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                content=chunks,
                content_rowid=rowid
            );

            CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_fts_delete AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content)
                    VALUES('delete', OLD.rowid, OLD.content);
            END;
            ",
        )
        .context("Failed to create knowledge tables")?;

        // vec0 doesn't support IF NOT EXISTS, so check first
        let existing: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name='chunk_embeddings'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to inspect vector table")?;

        match existing.as_deref().map(vector_dimensions) {
            Some(Some(found)) if found == dims => return Ok(()),
            Some(found) => {
                // vec0 rejects vectors of any other width
                warn!(
                    "Vector table has {} dimensions, embeddings produce {}. \
                     Recreating it; run --ingest to rebuild vector search.",
                    found.map_or_else(|| "unknown".to_string(), |d| d.to_string()),
                    dims
                );
                conn.execute_batch("DROP TABLE chunk_embeddings;")
                    .context("Failed to drop stale vector table")?;
            }
            None => {}
        }

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE chunk_embeddings USING vec0(embedding float[{}]);",
            dims
        ))
        .context("Failed to create vector table")?;

        Ok(())
    }
}

/// Width of the `float[N]` column in a vec0 table definition.
fn vector_dimensions(create_sql: &str) -> Option<usize> {
    let start = create_sql.find("float[")? + "float[".len();
    let len = create_sql[start..].find(']')?;
    create_sql[start..start + len].trim().parse().ok()
}
