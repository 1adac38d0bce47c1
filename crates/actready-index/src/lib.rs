//! # actready-index
//!
//! Retrieval over the reference regulation:
//! - Recursive character splitting into overlapping chunks
//! - Embeddings from an OpenAI-compatible `/embeddings` endpoint
//! - `SQLite` BLOB storage with brute-force cosine KNN
//! - One-shot ingestion of a plain-text regulation file

#![deny(unsafe_code)]

pub mod embedder;
pub mod errors;
pub mod ingest;
pub mod normalize;
pub mod splitter;
pub mod store;

pub use embedder::{Embedder, EmbedderConfig, HashEmbedder, OpenAiEmbedder};
pub use errors::{IndexError, Result};
pub use ingest::{ingest_file, IngestOptions, IngestReport};
pub use splitter::split_text;
pub use store::{NewChunk, SqliteVectorIndex};
