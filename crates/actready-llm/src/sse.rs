use serde::Deserialize;

use actready_core::errors::GatewayError;
use actready_core::stream::{FinishReason, StreamEvent};

/// Terminal sentinel sent by OpenAI-compatible servers after the last chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Split a block of complete SSE events into their `data` payloads.
///
/// Multiple `data:` lines inside one event are joined with `\n`; comment
/// lines (`:`) and other fields are ignored.
pub fn parse_sse_lines(raw: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            match &mut current {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(data);
                }
                None => current = Some(data.to_string()),
            }
        } else if line.is_empty() {
            if let Some(data) = current.take() {
                payloads.push(data);
            }
        }
    }

    // Handle trailing event without blank line
    if let Some(data) = current {
        payloads.push(data);
    }

    payloads
}

/// State machine for chat-completion chunks.
///
/// Emits `Start` before the first fragment, `TextDelta` for every non-empty
/// content delta, and exactly one terminal event.
#[derive(Debug, Default)]
pub struct ChatCompletionParser {
    started: bool,
    finished: bool,
}

impl ChatCompletionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `data` payload and return zero or more events.
    pub fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if data.trim() == DONE_SENTINEL {
            self.ensure_started(&mut events);
            events.push(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            });
            self.finished = true;
            return events;
        }

        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.finished = true;
                events.push(StreamEvent::Error {
                    error: GatewayError::StreamInterrupted(format!("malformed chunk: {e}")),
                });
                return events;
            }
        };

        if let Some(err) = chunk.error {
            self.finished = true;
            events.push(StreamEvent::Error {
                error: GatewayError::ServerError {
                    status: 500,
                    body: err.message,
                },
            });
            return events;
        }

        self.ensure_started(&mut events);

        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    events.push(StreamEvent::TextDelta { delta: content });
                }
            }
            if let Some(reason) = choice.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: FinishReason::from_wire(&reason),
                });
                self.finished = true;
            }
        }

        events
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.started {
            self.started = true;
            events.push(StreamEvent::Start);
        }
    }
}

// --- Deserialization types for chat-completion chunks ---

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
        .to_string()
    }

    #[test]
    fn parse_sse_lines_basic() {
        let raw = "data: {\"a\":1}\n\ndata: [DONE]\n\n";
        assert_eq!(parse_sse_lines(raw), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn parse_sse_lines_joins_multiline_and_skips_comments() {
        let raw = ": keep-alive\n\ndata: one\ndata: two\n\ndata:tight";
        assert_eq!(parse_sse_lines(raw), vec!["one\ntwo", "tight"]);
    }

    #[test]
    fn text_stream_then_finish_reason() {
        let mut parser = ChatCompletionParser::new();

        let events = parser.parse_data(&chunk("Hel"));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Start));
        assert!(matches!(&events[1], StreamEvent::TextDelta { delta } if delta == "Hel"));

        let events = parser.parse_data(&chunk("lo"));
        assert_eq!(events.len(), 1);

        let finish = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let events = parser.parse_data(finish);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            StreamEvent::Done {
                finish_reason: FinishReason::Stop
            }
        ));
        // [DONE] after finish_reason produces nothing more
        assert!(parser.parse_data(DONE_SENTINEL).is_empty());
    }

    #[test]
    fn done_sentinel_alone_terminates() {
        let mut parser = ChatCompletionParser::new();
        let events = parser.parse_data("[DONE]");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Done { .. }));
    }

    #[test]
    fn role_only_delta_emits_start_only() {
        let mut parser = ChatCompletionParser::new();
        let events = parser.parse_data(r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Start));
    }

    #[test]
    fn malformed_chunk_is_an_error() {
        let mut parser = ChatCompletionParser::new();
        let events = parser.parse_data("{\"choices\": [");
        assert!(matches!(
            &events[0],
            StreamEvent::Error { error: GatewayError::StreamInterrupted(msg) } if msg.contains("malformed")
        ));
        assert!(parser.parse_data(&chunk("late")).is_empty());
    }

    #[test]
    fn inline_error_object() {
        let mut parser = ChatCompletionParser::new();
        let events = parser.parse_data(r#"{"error":{"message":"model overloaded"}}"#);
        assert!(matches!(
            &events[0],
            StreamEvent::Error { error: GatewayError::ServerError { body, .. } } if body == "model overloaded"
        ));
    }

    #[test]
    fn length_finish_reason() {
        let mut parser = ChatCompletionParser::new();
        let events = parser.parse_data(
            r#"{"choices":[{"index":0,"delta":{"content":"x"},"finish_reason":"length"}]}"#,
        );
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Done {
                finish_reason: FinishReason::Length
            })
        ));
    }
}
