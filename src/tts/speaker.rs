//! Reply speaker: orchestrator + playback controller behind one `speak`/`cancel`
//! surface, as used by a chat client after each model reply.

use super::api_client::ApiTtsClient;
use super::camb::CambTaskClient;
use super::interface::{AudioOutput, RemoteSynthesizer, SpeechEngine, SynthesisRequest, TtsError};
use super::local::{LocalFallbackSynthesizer, VoicePreference};
use super::orchestrator::{RenderOutcome, SynthesisOrchestrator, Unavailable};
use super::playback::{PlaybackController, PlaybackEvent, PlaybackSession, PlaybackSource};
use super::system::{CommandAudioOutput, CommandSpeechEngine, UnavailableEngine, UnavailableOutput};
use crate::config::ServiceConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug)]
pub enum SpeakOutcome {
    Playing(PlaybackSession),
    /// A newer `speak` or a `cancel` arrived while this reply was rendering;
    /// the rendered result was discarded.
    Superseded,
    /// Neither path could start; the reply stays text-only.
    Unavailable(Unavailable),
}

pub struct Speaker {
    orchestrator: SynthesisOrchestrator,
    playback: PlaybackController,
    generation: AtomicU64,
}

impl Speaker {
    pub fn new(orchestrator: SynthesisOrchestrator, playback: PlaybackController) -> Self {
        Self {
            orchestrator,
            playback,
            generation: AtomicU64::new(0),
        }
    }

    /// Wire a speaker from config using host backends. With `server_url`, remote
    /// synthesis goes through that server's `/api/tts`; otherwise the provider is
    /// called directly.
    pub fn from_config(config: &ServiceConfig, server_url: Option<String>) -> Self {
        let engine: Arc<dyn SpeechEngine> = match CommandSpeechEngine::detect() {
            Some(engine) if config.local_voice.enabled => {
                tracing::info!("[TTS] Local speech engine: {}", engine.kind().program());
                Arc::new(engine)
            }
            _ => {
                tracing::warn!("[TTS] No local speech engine available");
                Arc::new(UnavailableEngine)
            }
        };
        let output: Arc<dyn AudioOutput> = match CommandAudioOutput::detect() {
            Some(output) => Arc::new(output),
            None => {
                tracing::warn!("[TTS] No audio player found, remote audio cannot play");
                Arc::new(UnavailableOutput)
            }
        };
        let remote: Arc<dyn RemoteSynthesizer> = match server_url {
            Some(url) => Arc::new(ApiTtsClient::new(url)),
            None => Arc::new(CambTaskClient::from_config(&config.tts)),
        };

        let local = LocalFallbackSynthesizer::new(
            engine.clone(),
            VoicePreference::from(&config.local_voice),
        );
        Self::new(
            SynthesisOrchestrator::new(remote, local),
            PlaybackController::new(output, engine),
        )
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.playback.subscribe()
    }

    pub async fn is_speaking(&self) -> bool {
        self.playback.is_playing().await
    }

    /// Speak one reply. Only empty text is an error; every other failure
    /// degrades to `SpeakOutcome::Unavailable`.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome, TtsError> {
        let request = SynthesisRequest::new(text)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.playback.cancel_current().await;

        let outcome = self.orchestrator.render(&request).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(Self::superseded());
        }

        let source = match outcome {
            RenderOutcome::Remote(audio) => PlaybackSource::Remote(audio),
            RenderOutcome::Local(utterance) => PlaybackSource::Local(utterance),
            RenderOutcome::Unavailable(reason) => return Ok(SpeakOutcome::Unavailable(reason)),
        };
        let from_remote = matches!(source, PlaybackSource::Remote(_));

        // Checked under the playback lock; `cancel` bumps the generation
        // before it takes that lock.
        let current = || self.generation.load(Ordering::SeqCst) == generation;
        match self.playback.play_if(source, current).await {
            Ok(Some(session)) => Ok(SpeakOutcome::Playing(session)),
            Ok(None) => Ok(Self::superseded()),
            Err(e) if from_remote => {
                // Rendered audio that cannot be played still gets the local path.
                let utterance = match self.orchestrator.fall_back(&request, Some(e.clone())).await {
                    Ok(utterance) => utterance,
                    Err(reason) => return Ok(SpeakOutcome::Unavailable(reason)),
                };
                match self.playback.play_if(PlaybackSource::Local(utterance), current).await {
                    Ok(Some(session)) => Ok(SpeakOutcome::Playing(session)),
                    Ok(None) => Ok(Self::superseded()),
                    Err(local) => Ok(SpeakOutcome::Unavailable(Unavailable {
                        remote: Some(e),
                        local,
                    })),
                }
            }
            Err(local) => Ok(SpeakOutcome::Unavailable(Unavailable {
                remote: None,
                local,
            })),
        }
    }

    fn superseded() -> SpeakOutcome {
        tracing::debug!("[TTS] Discarding superseded reply rendering");
        SpeakOutcome::Superseded
    }

    /// Stop any audible reply and discard replies still rendering.
    pub async fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.playback.cancel_current().await;
    }
}
