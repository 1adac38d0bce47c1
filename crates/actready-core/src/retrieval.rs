use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A passage of the reference regulation returned by a similarity search.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// 1-based position in the result list (1 = most relevant).
    pub rank: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index storage error: {0}")]
    Storage(String),

    #[error("index not ready: {0}")]
    NotReady(String),
}

/// Read-only similarity search over the regulation.
///
/// Implementations must be safe to query concurrently from several scans.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Fixed-passage index: ignores the query and returns passages in insertion order.
#[derive(Clone, Debug, Default)]
pub struct StaticIndex {
    passages: Vec<String>,
}

impl StaticIndex {
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: passages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RetrievalIndex for StaticIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(self
            .passages
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, text)| RetrievedChunk {
                rank: i + 1,
                text: text.clone(),
                score: None,
            })
            .collect())
    }
}
