use anyhow::{bail, Context};
use clap::Parser;
use persona_voice::cli::{Cli, Commands};
use persona_voice::config::{load_config, ServiceConfig};
use persona_voice::server::{self, AppState};
use persona_voice::tts::system::CommandSpeechEngine;
use persona_voice::tts::{select_voice, SpeakOutcome, Speaker, SpeechEngine, VoicePreference};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,persona_voice=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_serve(config: ServiceConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;

    let state = AppState::from_config(&config);
    server::serve(state, addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .with_context(|| format!("failed to bind {}", addr))
}

async fn run_speak(
    config: ServiceConfig,
    text: String,
    server_url: Option<String>,
) -> anyhow::Result<()> {
    let speaker = Speaker::from_config(&config, server_url);
    match speaker.speak(&text).await? {
        SpeakOutcome::Playing(session) => {
            tokio::select! {
                _ = session.wait() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("[TTS] Interrupted, stopping playback");
                    speaker.cancel().await;
                }
            }
            Ok(())
        }
        SpeakOutcome::Superseded => Ok(()),
        SpeakOutcome::Unavailable(reason) => {
            tracing::debug!("[TTS] Unavailable: {:?}", reason);
            bail!("could not produce speech: {}", reason.local)
        }
    }
}

async fn run_voices(config: ServiceConfig) -> anyhow::Result<()> {
    let Some(engine) = CommandSpeechEngine::detect() else {
        bail!("no local speech engine found (tried say, espeak-ng, spd-say)");
    };
    let voices = engine.voices().await;
    let preference = VoicePreference::from(&config.local_voice);
    let chosen = select_voice(&voices, &preference);

    println!("Engine: {}", engine.kind().program());
    for voice in &voices {
        let marker = if chosen.is_some_and(|c| c == voice) { "*" } else { " " };
        println!("{} {:<32} {}", marker, voice.name, voice.language);
    }
    match chosen {
        Some(voice) => println!("\nFallback voice: {} ({})", voice.name, voice.language),
        None => println!("\nNo voice matched, the engine default will be used"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config);
    match cli.command_or_default() {
        Commands::Serve { bind } => run_serve(config, bind).await,
        Commands::Speak { text, server } => run_speak(config, text, server).await,
        Commands::Voices => run_voices(config).await,
    }
}
