//! Concrete [`LlmProvider`](crate::llm::provider::LlmProvider)
//! implementations.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiProvider;
pub use scripted::{ScriptedProvider, text_response};
