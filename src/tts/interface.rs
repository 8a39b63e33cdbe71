use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use super::task::TerminalStatus;

// ── Error Types ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TtsError {
    #[error("text is required")]
    EmptyInput,
    #[error("failed to create TTS task: {0}")]
    ProviderCreate(String),
    #[error("TTS provider transport error: {0}")]
    ProviderTransport(String),
    #[error("TTS task {task_id} ended with status {status}")]
    ProviderTerminal {
        task_id: String,
        status: TerminalStatus,
    },
    #[error("TTS task {task_id} not finished after {attempts} polls")]
    ProviderTimeout { task_id: String, attempts: u32 },
    #[error("failed to retrieve TTS result: {0}")]
    Fetch(String),
    #[error("local speech engine unavailable: {0}")]
    LocalEngineUnavailable(String),
    #[error("TTS configuration error: {0}")]
    Configuration(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

impl TtsError {
    /// Stable short label for logs and HTTP error mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            TtsError::EmptyInput => "input",
            TtsError::ProviderCreate(_) => "provider_create",
            TtsError::ProviderTransport(_) => "provider_transport",
            TtsError::ProviderTerminal { .. } => "provider_terminal",
            TtsError::ProviderTimeout { .. } => "provider_timeout",
            TtsError::Fetch(_) => "fetch",
            TtsError::LocalEngineUnavailable(_) => "local_engine_unavailable",
            TtsError::Configuration(_) => "configuration",
            TtsError::Playback(_) => "playback",
        }
    }
}

// ── Requests & Results ─────────────────────────────────

/// One reply to be spoken. Rejects empty or whitespace-only text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    text: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Result<Self, TtsError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TtsError::EmptyInput);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Rendered audio ready for playback.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioResult {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioResult {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// File extension matching the MIME type, used for transient playback files.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            "audio/flac" => "flac",
            _ => "wav",
        }
    }
}

impl fmt::Debug for AudioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResult")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

// ── Voice Parameters ───────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

impl Gender {
    /// Numeric code used by the remote provider.
    pub fn provider_code(self) -> u32 {
        match self {
            Gender::Neutral => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

/// Fixed voice parameters sent with every remote synthesis task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub voice_id: u32,
    pub language: u32,
    pub gender: Gender,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: 20037,
            language: 1,
            gender: Gender::Male,
        }
    }
}

/// A voice offered by the host speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalVoice {
    /// Selector passed back to the engine (voice file, name, or language code).
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Text prepared for the host speech engine, with the voice already chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// `None` means the engine's default voice.
    pub voice: Option<LocalVoice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

// ── Provider Traits ────────────────────────────────────

/// Remote synthesis that either yields audio or a tagged failure.
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// Identifier used in logs (e.g. "camb", "api").
    fn id(&self) -> &str;

    /// Whether the credential/configuration precondition is met.
    fn is_configured(&self) -> bool;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResult, TtsError>;
}

/// Host speech engine used as the fallback path.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn id(&self) -> &str;

    /// Whether the engine can speak at all in this environment.
    async fn is_available(&self) -> bool;

    async fn voices(&self) -> Vec<LocalVoice>;

    /// Start speaking. Returns once speech has started.
    async fn speak(&self, utterance: &Utterance) -> Result<PlaybackHandle, TtsError>;

    /// Stop every utterance this engine is currently speaking.
    fn cancel_all(&self);
}

/// Output device for rendered remote audio.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    fn id(&self) -> &str;

    /// Start playing. Returns once playback has started.
    async fn play(&self, audio: AudioResult) -> Result<PlaybackHandle, TtsError>;
}

// ── Running Playback Handle ────────────────────────────

/// Control side of one running rendition: a stop signal plus a completion
/// signal. Backends release their transient resources before completing.
pub struct PlaybackHandle {
    stop: Option<oneshot::Sender<()>>,
    done: oneshot::Receiver<Result<(), TtsError>>,
}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("stoppable", &self.stop.is_some())
            .finish()
    }
}

/// Backend side of a [`PlaybackHandle`].
pub struct PlaybackSignals {
    pub stop: oneshot::Receiver<()>,
    pub done: oneshot::Sender<Result<(), TtsError>>,
}

impl PlaybackHandle {
    pub fn channel() -> (PlaybackHandle, PlaybackSignals) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            PlaybackHandle {
                stop: Some(stop_tx),
                done: done_rx,
            },
            PlaybackSignals {
                stop: stop_rx,
                done: done_tx,
            },
        )
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Option<oneshot::Sender<()>>,
        oneshot::Receiver<Result<(), TtsError>>,
    ) {
        (self.stop, self.done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_is_rejected() {
        assert_eq!(SynthesisRequest::new("   \n"), Err(TtsError::EmptyInput));
        assert_eq!(SynthesisRequest::new(""), Err(TtsError::EmptyInput));
        assert_eq!(SynthesisRequest::new("Hi").unwrap().text(), "Hi");
    }

    #[test]
    fn test_extension_follows_mime_type() {
        assert_eq!(AudioResult::new(vec![], "audio/wav").extension(), "wav");
        assert_eq!(AudioResult::new(vec![], "audio/mpeg").extension(), "mp3");
        assert_eq!(AudioResult::new(vec![], "application/x-unknown").extension(), "wav");
    }

    #[test]
    fn test_debug_output_hides_audio_bytes() {
        let audio = AudioResult::new(vec![1, 2, 3], "audio/wav");
        let rendered = format!("{:?}", audio);
        assert!(rendered.contains("bytes: 3"));
    }

    #[test]
    fn test_gender_codes_match_provider() {
        assert_eq!(Gender::Male.provider_code(), 1);
        assert_eq!(VoiceConfig::default().gender, Gender::Male);
    }
}
