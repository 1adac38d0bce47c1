pub mod audit;
pub mod errors;
pub mod messages;
pub mod provider;
pub mod retrieval;
pub mod stream;

pub use audit::{AuditFailure, AuditOutcome, AuditResult, FailureKind, RiskTier, ValidationError};
pub use errors::GatewayError;
pub use messages::{Message, Role};
pub use provider::{LlmProvider, ProviderStream, StreamOptions};
pub use retrieval::{RetrievalError, RetrievalIndex, RetrievedChunk, StaticIndex};
pub use stream::{FinishReason, StreamEvent};
