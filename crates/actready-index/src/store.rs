//! Regulation chunk store with `SQLite` BLOB embeddings and brute-force KNN search.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use actready_core::retrieval::{RetrievalError, RetrievalIndex, RetrievedChunk};

use crate::embedder::Embedder;
use crate::errors::{IndexError, Result};
use crate::normalize::{blob_to_f32_vec, cosine_similarity, f32_slice_to_blob};

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// A chunk waiting to be embedded and stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChunk {
    /// Where the chunk came from, e.g. the ingested file name.
    pub source: String,
    /// 0-based position of the chunk within its source.
    pub position: usize,
    pub text: String,
}

/// Persistent retrieval index over regulation chunks.
///
/// The connection lives behind a `parking_lot::Mutex`, so one index can be
/// shared (`Arc`) by concurrent scans.
pub struct SqliteVectorIndex {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
}

impl SqliteVectorIndex {
    /// Open or create an index at the given path.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        info!(path = %path.display(), "index opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
            path: path.to_owned(),
        })
    }

    /// Open an in-memory index (for testing).
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
            path: PathBuf::from(":memory:"),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| IndexError::Storage(format!("pragmas: {e}")))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| IndexError::Storage(format!("schema: {e}")))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed and store chunks, skipping any whose text is already indexed.
    ///
    /// Returns the number of newly stored chunks.
    pub async fn add_chunks(&self, chunks: Vec<NewChunk>) -> Result<usize> {
        let fresh = {
            let conn = self.conn.lock();
            let mut seen = HashSet::new();
            let mut fresh = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let hash = content_hash(&chunk.text);
                if !seen.insert(hash.clone()) || hash_exists(&conn, &hash)? {
                    debug!(source = %chunk.source, position = chunk.position, "skipping duplicate chunk");
                    continue;
                }
                fresh.push((hash, chunk));
            }
            fresh
        };

        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|(_, c)| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != fresh.len() {
            return Err(IndexError::Embedding(format!(
                "expected {} embeddings, got {}",
                fresh.len(),
                embeddings.len()
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut stored = 0;
        for ((hash, chunk), embedding) in fresh.iter().zip(&embeddings) {
            stored += tx.execute(
                "INSERT OR IGNORE INTO chunks (content_hash, source, position, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    hash,
                    chunk.source,
                    i64::try_from(chunk.position).unwrap_or(i64::MAX),
                    chunk.text,
                    f32_slice_to_blob(embedding)
                ],
            )?;
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Count stored chunks.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let _ = self.conn.lock().execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Rank every stored chunk against `query` and return the top `k`.
    ///
    /// Ties keep insertion order. Vectors whose dimensions differ from the
    /// query are skipped.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let rows: Vec<(String, Vec<u8>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT text, embedding FROM chunks ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<_, _>>()?;
            rows
        };

        let mut mismatched = 0usize;
        let mut scored: Vec<(f32, String)> = rows
            .into_iter()
            .filter_map(|(text, blob)| {
                let score = cosine_similarity(query, &blob_to_f32_vec(&blob));
                if score.is_none() {
                    mismatched += 1;
                }
                score.map(|s| (s, text))
            })
            .collect();
        if mismatched > 0 {
            warn!(mismatched, dims = query.len(), "skipped vectors with mismatched dimensions");
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (score, text))| RetrievedChunk {
                rank: i + 1,
                text,
                score: Some(score),
            })
            .collect())
    }
}

#[async_trait]
impl RetrievalIndex for SqliteVectorIndex {
    async fn search(&self, query: &str, k: usize) -> std::result::Result<Vec<RetrievedChunk>, RetrievalError> {
        if k == 0 || self.count()? == 0 {
            return Ok(vec![]);
        }
        let embedding = self.embedder.embed_single(query).await?;
        let hits = self.search_vector(&embedding, k)?;
        debug!(k, hits = hits.len(), "retrieval search");
        Ok(hits)
    }
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn hash_exists(conn: &Connection, hash: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM chunks WHERE content_hash = ?1",
            params![hash],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One dimension per keyword; a component is 1.0 when the text mentions it.
    struct KeywordEmbedder {
        keywords: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new(keywords: Vec<&'static str>) -> Self {
            Self {
                keywords,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    self.keywords
                        .iter()
                        .map(|k| if t.contains(k) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }

        fn model(&self) -> &str {
            "keywords"
        }
    }

    fn chunk(position: usize, text: &str) -> NewChunk {
        NewChunk {
            source: "act.txt".into(),
            position,
            text: text.into(),
        }
    }

    fn keyword_index() -> (SqliteVectorIndex, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["biometric", "transparency", "penalties"]));
        let index = SqliteVectorIndex::in_memory(embedder.clone()).unwrap();
        (index, embedder)
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let (index, _) = keyword_index();
        let stored = index
            .add_chunks(vec![
                chunk(0, "penalties for infringements"),
                chunk(1, "biometric identification and transparency"),
                chunk(2, "remote biometric identification"),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 3);

        let hits = index.search("biometric systems", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].text, "remote biometric identification");
        assert_eq!(hits[1].rank, 2);
        assert_eq!(hits[1].text, "biometric identification and transparency");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() {
        let (index, _) = keyword_index();
        index
            .add_chunks(vec![chunk(0, "penalties"), chunk(1, "transparency")])
            .await
            .unwrap();
        let hits = index.search("penalties", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "penalties");
    }

    #[tokio::test]
    async fn empty_index_skips_embedding() {
        let (index, embedder) = keyword_index();
        assert!(index.search("anything", 4).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_chunks_are_ignored() {
        let (index, embedder) = keyword_index();
        let stored = index
            .add_chunks(vec![chunk(0, "penalties"), chunk(1, "penalties")])
            .await
            .unwrap();
        assert_eq!(stored, 1);

        let stored = index.add_chunks(vec![chunk(5, "penalties")]).await.unwrap();
        assert_eq!(stored, 0);
        assert_eq!(index.count().unwrap(), 1);
        // Second call never reached the embedder
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mismatched_dimensions_skipped() {
        let index = SqliteVectorIndex::in_memory(Arc::new(HashEmbedder::new(3))).unwrap();
        {
            let conn = index.conn.lock();
            conn.execute(
                "INSERT INTO chunks (content_hash, source, position, text, embedding) VALUES ('h', 's', 0, 'old', ?1)",
                params![f32_slice_to_blob(&[1.0, 0.0])],
            )
            .unwrap();
        }
        assert!(index.search_vector(&[1.0, 0.0, 0.0], 4).unwrap().is_empty());
        assert_eq!(index.search_vector(&[1.0, 0.0], 4).unwrap().len(), 1);
    }

    #[test]
    fn meta_upsert() {
        let index = SqliteVectorIndex::in_memory(Arc::new(HashEmbedder::new(4))).unwrap();
        assert_eq!(index.meta("ingested_at").unwrap(), None);
        index.set_meta("ingested_at", "2026-01-01T00:00:00Z").unwrap();
        index.set_meta("ingested_at", "2026-02-01T00:00:00Z").unwrap();
        assert_eq!(index.meta("ingested_at").unwrap().as_deref(), Some("2026-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn file_index_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(8));

        let index = SqliteVectorIndex::open(&path, embedder.clone()).unwrap();
        index.add_chunks(vec![chunk(0, "Article 50")]).await.unwrap();
        drop(index);

        let reopened = SqliteVectorIndex::open(&path, embedder).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        let hits = reopened.search("Article 50", 4).await.unwrap();
        assert_eq!(hits[0].text, "Article 50");
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = content_hash("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
