use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

/// Events emitted while a generative model streams its answer. Ordering contract:
///
/// Start → TextDelta* → (Done | Error)
///
/// The concatenation of every `TextDelta` equals the non-streamed answer.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    TextDelta { delta: String },
    Done { finish_reason: FinishReason },
    Error { error: GatewayError },
}

/// Why the model stopped producing text.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    /// Map the provider's `finish_reason` string. Unknown values map to `Other`.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
