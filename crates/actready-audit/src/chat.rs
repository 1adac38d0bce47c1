//! Follow-up question/answer over the regulation, optionally grounded in an audit report.
//!
//! Conversation state lives in a caller-owned [`ChatSession`]; a turn is
//! recorded only once its answer has streamed to completion.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use actready_core::audit::AuditResult;
use actready_core::errors::GatewayError;
use actready_core::messages::Message;
use actready_core::provider::{LlmProvider, StreamOptions};
use actready_core::retrieval::{RetrievalError, RetrievalIndex, RetrievedChunk};
use actready_core::stream::StreamEvent;

use crate::prompt::RETRIEVAL_K;

const GENERAL_PROMPT: &str = "You are an expert on the EU AI Act. Use the **context** below to help \
answer the user's question. If the question is clearly unrelated to the EU AI Act, respond with: \
\"I'm sorry, I'm not qualified to answer that.\" If the context doesn't directly answer the \
question, rely on your own knowledge of the EU AI Act.";

const GROUNDED_PREAMBLE: &str = "You are an EU AI Act compliance expert. \
You have just produced the following audit report for a repository:";

const GROUNDED_SCOPE: &str = "It includes a risk tier, actionable items, and a model card. \
You may answer follow-up questions that:
- Clarify the meaning or reasoning behind the audit
- Explore next steps to implement the recommendations
- Ask for help planning or executing remediations
- Refer to specific content from the EU AI Act or the JSON audit

If the user asks something unrelated to the audit or not relevant to AI compliance, \
politely explain that you're focused only on EU AI Act matters.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("model call failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("cancelled")]
    Cancelled,
}

/// Conversation history plus the optional report the conversation is about.
#[derive(Clone, Debug, Default)]
pub struct ChatSession {
    history: Vec<Message>,
    report: Option<AuditResult>,
}

impl ChatSession {
    /// General questions about the regulation.
    pub fn general() -> Self {
        Self::default()
    }

    /// Questions about a specific audit report.
    pub fn grounded(report: AuditResult) -> Self {
        Self {
            history: Vec::new(),
            report: Some(report),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn report(&self) -> Option<&AuditResult> {
        self.report.as_ref()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// System prompt for this session given the chunks retrieved for the current question.
    pub fn system_prompt(&self, chunks: &[RetrievedChunk]) -> String {
        match &self.report {
            None => {
                let context = chunks
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("{GENERAL_PROMPT}\n\n### Context ###\n{context}")
            }
            Some(report) => {
                let report_json = serde_json::to_string_pretty(report).unwrap_or_default();
                let context = chunks
                    .iter()
                    .map(|c| format!("[Context chunk {}]\n{}", c.rank, c.text))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("{GROUNDED_PREAMBLE}\n{report_json}\n\n{GROUNDED_SCOPE}\n\nRelevant context:\n{context}")
            }
        }
    }
}

/// Answer `question`, streaming each text fragment to `on_fragment` in order.
///
/// On success the question and full answer are appended to the session and
/// the answer is returned. Cancellation stops consuming the stream and
/// leaves the session untouched.
#[instrument(skip_all, fields(grounded = session.report.is_some(), turns = session.history.len() / 2))]
pub async fn ask<F>(
    session: &mut ChatSession,
    question: &str,
    provider: &dyn LlmProvider,
    index: &dyn RetrievalIndex,
    options: &StreamOptions,
    cancel: &CancellationToken,
    mut on_fragment: F,
) -> Result<String, ChatError>
where
    F: FnMut(&str) + Send,
{
    if cancel.is_cancelled() {
        return Err(ChatError::Cancelled);
    }

    let chunks = index.search(question, RETRIEVAL_K).await?;
    debug!(chunks = chunks.len(), "retrieved chat context");

    let mut messages = Vec::with_capacity(session.history.len() + 2);
    messages.push(Message::system(session.system_prompt(&chunks)));
    messages.extend(session.history.iter().cloned());
    messages.push(Message::user(question));

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChatError::Cancelled),
        stream = provider.stream(&messages, options) => stream?,
    };

    let mut answer = String::new();
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            event = stream.next() => event,
        };
        match event {
            Some(StreamEvent::Start) => {}
            Some(StreamEvent::TextDelta { delta }) => {
                on_fragment(&delta);
                answer.push_str(&delta);
            }
            Some(StreamEvent::Done { .. }) => break,
            Some(StreamEvent::Error { error }) => return Err(error.into()),
            None => {
                return Err(GatewayError::StreamInterrupted("stream ended before completion".into()).into())
            }
        }
    }

    session.history.push(Message::user(question));
    session.history.push(Message::assistant(answer.clone()));
    Ok(answer)
}
