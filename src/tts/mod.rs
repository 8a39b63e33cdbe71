pub mod api_client;
pub mod camb;
pub mod interface;
pub mod local;
pub mod orchestrator;
pub mod playback;
pub mod speaker;
pub mod system;
pub mod task;

#[cfg(test)]
mod tests;

pub use api_client::ApiTtsClient;
pub use camb::CambTaskClient;
pub use interface::{
    AudioOutput, AudioResult, Gender, LocalVoice, PlaybackHandle, RemoteSynthesizer, SpeechEngine,
    SynthesisRequest, TtsError, Utterance, VoiceConfig,
};
pub use local::{select_voice, LocalFallbackSynthesizer, VoicePreference};
pub use orchestrator::{RenderOutcome, SynthesisOrchestrator, Unavailable};
pub use playback::{PlaybackController, PlaybackEvent, PlaybackPath, PlaybackSession, PlaybackSource};
pub use speaker::{SpeakOutcome, Speaker};
pub use task::{ProviderTask, ProviderTaskStatus, TaskPoller};
