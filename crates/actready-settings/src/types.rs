//! Settings types. Every struct is `#[serde(default)]` so a partial user file
//! only needs to name the values it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub embeddings: EmbeddingSettings,
    pub index: IndexSettings,
    pub scan: ScanSettings,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

/// Chat-completion endpoint used for audits and follow-up chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API (no trailing slash).
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Embedding endpoint used to build and query the regulation index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Texts per embedding request during ingestion.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "text-embedding-3-small".to_string(),
            batch_size: 64,
        }
    }
}

/// Regulation index location and chunking parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    pub db_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            db_path: actready_home().join("index.db"),
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Repository sampling limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub max_files: usize,
    pub max_lines: usize,
    /// Unreadable candidates tolerated before the walk gives up; 0 means no limit.
    pub max_skipped: usize,
    /// File-name suffixes (without the dot) that count as source files.
    pub extensions: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_files: 500,
            max_lines: 300,
            max_skipped: 2000,
            extensions: ["py", "js", "ts", "ipynb"].map(String::from).to_vec(),
        }
    }
}

/// Bounded retry for transient model errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `~/.actready`, falling back to `/tmp/.actready` when `HOME` is unset.
pub fn actready_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".actready")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let s = Settings::default();
        assert_eq!(s.scan.max_files, 500);
        assert_eq!(s.scan.max_lines, 300);
        assert_eq!(s.scan.extensions, vec!["py", "js", "ts", "ipynb"]);
        assert_eq!(s.index.chunk_size, 1000);
        assert_eq!(s.index.chunk_overlap, 100);
        assert_eq!(s.llm.model, "gpt-4o");
        assert!(s.llm.temperature.abs() < f64::EPSILON);
        assert_eq!(s.embeddings.model, "text-embedding-3-small");
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert!(json["scan"].get("maxFiles").is_some());
        assert!(json["llm"].get("baseUrl").is_some());
        assert!(json["llm"].get("maxTokens").is_none());
    }

    #[test]
    fn partial_object_fills_defaults() {
        let s: ScanSettings = serde_json::from_str(r#"{"maxFiles": 10}"#).unwrap();
        assert_eq!(s.max_files, 10);
        assert_eq!(s.max_lines, 300);
    }
}
