pub mod openai;
pub mod reliable;
pub mod sse;

pub mod mock;

pub use mock::{MockProvider, MockResponse};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use reliable::{ReliableConfig, ReliableProvider};
