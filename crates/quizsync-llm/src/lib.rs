// Quiz-generation LLM plumbing: the chat-completion client and prompt
// construction.

pub mod client;
pub mod prompt;

pub use client::{ChatCompletion, ChatSettings, LlmClient, LlmError};
