pub mod cli;
pub mod config;
pub mod llm;
pub mod server;
pub mod settings;
pub mod tts;
pub mod utils;
