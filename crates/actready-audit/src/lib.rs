pub mod chat;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod sampler;
pub mod validator;

pub use chat::{ask, ChatError, ChatSession};
pub use error::ScanError;
pub use orchestrator::{audit_corpus, run_scan, ScanOptions};
pub use prompt::{compose, AuditRequest, AUDIT_QUESTION, RETRIEVAL_K};
pub use sampler::{sample_repository, sample_tree, CodeCorpus, ScanLimits, SourceSnippet};
pub use validator::{parse_report, validate};
