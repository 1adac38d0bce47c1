use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::errors::GatewayError;
use crate::messages::Message;
use crate::stream::StreamEvent;

/// Ordered stream of events produced by one model invocation.
pub type ProviderStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Options controlling generation behavior.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stop_sequences: Vec<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: Some(0.0),
            stop_sequences: Vec::new(),
        }
    }
}

/// Trait implemented by each generative-model backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn stream(
        &self,
        messages: &[Message],
        options: &StreamOptions,
    ) -> Result<ProviderStream, GatewayError>;

    /// Non-streaming variant: the concatenation of every text fragment.
    ///
    /// A stream that ends without a `Done` event is reported as interrupted.
    async fn complete(
        &self,
        messages: &[Message],
        options: &StreamOptions,
    ) -> Result<String, GatewayError> {
        let mut stream = self.stream(messages, options).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Start => {}
                StreamEvent::TextDelta { delta } => text.push_str(&delta),
                StreamEvent::Done { .. } => return Ok(text),
                StreamEvent::Error { error } => return Err(error),
            }
        }
        Err(GatewayError::StreamInterrupted(
            "stream ended before completion".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FinishReason;

    struct FixedProvider(Vec<StreamEvent>);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _options: &StreamOptions,
        ) -> Result<ProviderStream, GatewayError> {
            Ok(Box::pin(futures::stream::iter(self.0.clone())))
        }
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::TextDelta { delta: text.into() }
    }

    #[test]
    fn stream_options_default_to_zero_temperature() {
        let opts = StreamOptions::default();
        assert!(opts.max_tokens.is_none());
        assert_eq!(opts.temperature, Some(0.0));
        assert!(opts.stop_sequences.is_empty());
    }

    #[tokio::test]
    async fn complete_concatenates_fragments_in_order() {
        let provider = FixedProvider(vec![
            StreamEvent::Start,
            delta("{\"tier\":"),
            delta("\"high\"}"),
            StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            },
        ]);
        let text = provider
            .complete(&[Message::user("hi")], &StreamOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "{\"tier\":\"high\"}");
    }

    #[tokio::test]
    async fn complete_surfaces_stream_error() {
        let provider = FixedProvider(vec![
            StreamEvent::Start,
            delta("partial"),
            StreamEvent::Error {
                error: GatewayError::StreamInterrupted("reset".into()),
            },
        ]);
        let err = provider
            .complete(&[], &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StreamInterrupted(msg) if msg == "reset"));
    }

    #[tokio::test]
    async fn complete_rejects_stream_without_done() {
        let provider = FixedProvider(vec![StreamEvent::Start, delta("cut")]);
        let err = provider
            .complete(&[], &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StreamInterrupted(_)));
    }
}
