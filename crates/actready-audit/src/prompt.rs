//! Prompt composition: retrieved regulation context + format instructions + code corpus.

use tracing::debug;

use actready_core::audit::AuditResult;
use actready_core::messages::Message;
use actready_core::retrieval::{RetrievalError, RetrievalIndex, RetrievedChunk};

use crate::sampler::CodeCorpus;

/// Fixed question used as the retrieval query for every scan.
pub const AUDIT_QUESTION: &str =
    "What are the compliance obligations of this codebase under the EU AI Act?";

/// Regulation chunks retrieved per scan.
pub const RETRIEVAL_K: usize = 4;

pub const CODE_START: &str = "CODE_START";
pub const CODE_END: &str = "CODE_END";

const SYSTEM_FRAMING: &str = "You are an expert EU AI Act compliance auditor. \
Analyze only the code provided between CODE_START and CODE_END and base your \
assessment on the EU AI Act context you are given.";

/// The two messages sent to the model for one scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRequest {
    pub system: String,
    pub user: String,
}

impl AuditRequest {
    pub fn new(chunks: &[RetrievedChunk], corpus: &str) -> Self {
        let user = format!(
            "Context from EU AI Act:\n{}\n\n{}\n\nAnalyze the following repo snapshot and return JSON:\n{CODE_START}\n{corpus}\n{CODE_END}",
            context_block(chunks),
            format_instructions(),
        );
        Self {
            system: SYSTEM_FRAMING.to_string(),
            user,
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(self.user)]
    }
}

/// Retrieve context for [`AUDIT_QUESTION`] and build the request for `corpus`.
pub async fn compose(
    index: &dyn RetrievalIndex,
    corpus: &CodeCorpus,
) -> Result<AuditRequest, RetrievalError> {
    let chunks = index.search(AUDIT_QUESTION, RETRIEVAL_K).await?;
    debug!(chunks = chunks.len(), "retrieved regulation context");
    Ok(AuditRequest::new(&chunks, &corpus.render()))
}

/// Chunks separated by blank lines, each under a `[Source chunk N]` marker.
pub fn context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[Source chunk {}]\n{}", c.rank, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Instructions telling the model to answer with one JSON object matching the report schema.
pub fn format_instructions() -> String {
    let schema = serde_json::to_string(&AuditResult::json_schema()).unwrap_or_default();
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         As an example, for the schema {{\"properties\": {{\"foo\": {{\"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
         the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
         The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\n\
         Here is the output schema:\n```\n{schema}\n```"
    )
}
