//! One-shot ingestion of the regulation text into the vector index.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::errors::Result;
use crate::splitter::split_text;
use crate::store::{NewChunk, SqliteVectorIndex};

pub const META_INGESTED_AT: &str = "ingested_at";
pub const META_EMBEDDING_MODEL: &str = "embedding_model";

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks per embedding request.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            batch_size: 64,
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Chunks produced by the splitter.
    pub chunks_seen: usize,
    /// Chunks newly written to the index (duplicates excluded).
    pub chunks_stored: usize,
}

/// Read a plain-text file, split it, embed the chunks in batches and store them.
#[instrument(skip(index, options), fields(path = %path.display()))]
pub async fn ingest_file(
    index: &SqliteVectorIndex,
    path: &Path,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let text = tokio::fs::read_to_string(path).await?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let chunks: Vec<NewChunk> = split_text(&text, options.chunk_size, options.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(position, text)| NewChunk {
            source: source.clone(),
            position,
            text,
        })
        .collect();

    let mut report = IngestReport {
        chunks_seen: chunks.len(),
        chunks_stored: 0,
    };

    for batch in chunks.chunks(options.batch_size.max(1)) {
        report.chunks_stored += index.add_chunks(batch.to_vec()).await?;
        info!(stored = report.chunks_stored, total = report.chunks_seen, "ingest progress");
    }

    index.set_meta(META_INGESTED_AT, &Utc::now().to_rfc3339())?;
    index.set_meta(META_EMBEDDING_MODEL, index.embedder().model())?;
    info!(
        chunks_seen = report.chunks_seen,
        chunks_stored = report.chunks_stored,
        "ingestion complete"
    );
    Ok(report)
}
