//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "persona-voice")]
#[command(about = "Voice persona service: chat, speech synthesis and settings")]
#[command(version)]
pub struct Cli {
    /// Path to the service config file
    #[arg(short, long, global = true, default_value = "persona_config.json")]
    pub config: PathBuf,

    /// Enable debug logging for this crate
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve {
        /// Override the bind address from the config file
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Speak text through the remote provider, falling back to the local engine
    Speak {
        /// Text to speak
        text: String,
        /// Synthesize through a running server's /api/tts instead of the provider
        #[arg(long)]
        server: Option<String>,
    },

    /// List local engine voices and the one the fallback would pick
    Voices,
}

impl Cli {
    pub fn command_or_default(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Serve { bind: None })
    }
}
