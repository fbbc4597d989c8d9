//! Gemini `generateContent` client: plain generation and grounded web search.

pub mod client;
pub mod grounding;
pub mod types;

pub use client::{GeminiClient, GeminiError, GeminiSettings, SearchClient, TextGenerator};
pub use types::Prompt;
