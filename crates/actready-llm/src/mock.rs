use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use actready_core::errors::GatewayError;
use actready_core::messages::Message;
use actready_core::provider::{LlmProvider, ProviderStream, StreamOptions};
use actready_core::stream::{FinishReason, StreamEvent};

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Return an error from the stream() call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A complete answer delivered as a single fragment.
    pub fn stream_text(text: &str) -> Self {
        Self::stream_fragments(&[text])
    }

    /// A complete answer delivered fragment by fragment.
    pub fn stream_fragments(fragments: &[&str]) -> Self {
        let mut events = vec![StreamEvent::Start];
        events.extend(fragments.iter().map(|f| StreamEvent::TextDelta {
            delta: (*f).to_string(),
        }));
        events.push(StreamEvent::Done {
            finish_reason: FinishReason::Stop,
        });
        Self::Stream(events)
    }

    /// A stream that fails after emitting some text.
    pub fn stream_error(partial: &str, error: GatewayError) -> Self {
        Self::Stream(vec![
            StreamEvent::Start,
            StreamEvent::TextDelta {
                delta: partial.to_string(),
            },
            StreamEvent::Error { error },
        ])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records every request it receives.
pub struct MockProvider {
    responses: Mutex<Vec<Option<MockResponse>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Some).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Messages of every call so far, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(
        &self,
        messages: &[Message],
        _options: &StreamOptions,
    ) -> Result<ProviderStream, GatewayError> {
        let idx = {
            let mut requests = self.requests.lock();
            requests.push(messages.to_vec());
            requests.len() - 1
        };

        let response = self.responses.lock().get_mut(idx).and_then(Option::take);
        let Some(mut current) = response else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        // Unroll nested delays iteratively
        loop {
            match current {
                MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
