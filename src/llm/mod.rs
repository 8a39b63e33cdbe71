pub mod gemini;
pub mod prompt;

pub use gemini::{AskInput, GeminiClient, InlineAudio, LlmError};
