use super::interface::{
    LocalVoice, PlaybackHandle, SpeechEngine, SynthesisRequest, TtsError, Utterance,
};
use crate::config::LocalVoiceSection;
use std::sync::Arc;

/// How the fallback path picks a host voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePreference {
    pub language_prefix: String,
    pub name_hints: Vec<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self::from(&LocalVoiceSection::default())
    }
}

impl From<&LocalVoiceSection> for VoicePreference {
    fn from(section: &LocalVoiceSection) -> Self {
        Self {
            language_prefix: section.language_prefix.to_lowercase(),
            name_hints: section.name_hints.iter().map(|h| h.to_lowercase()).collect(),
            rate: section.rate,
            pitch: section.pitch,
            volume: section.volume,
        }
    }
}

/// Pick the first voice whose language starts with the preferred prefix and
/// whose name contains one of the hints as a whole word. Word matching keeps
/// "male" from matching "Female".
pub fn select_voice<'a>(voices: &'a [LocalVoice], preference: &VoicePreference) -> Option<&'a LocalVoice> {
    voices.iter().find(|voice| {
        voice
            .language
            .to_lowercase()
            .starts_with(&preference.language_prefix)
            && name_matches(&voice.name, &preference.name_hints)
    })
}

fn name_matches(name: &str, hints: &[String]) -> bool {
    let lowered = name.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| hints.iter().any(|hint| hint == word))
}

/// Fallback synthesizer backed by the host speech engine.
///
/// Has no timeout of its own; an engine that cannot speak surfaces as
/// `TtsError::LocalEngineUnavailable` and is final.
pub struct LocalFallbackSynthesizer {
    engine: Arc<dyn SpeechEngine>,
    preference: VoicePreference,
}

impl LocalFallbackSynthesizer {
    pub fn new(engine: Arc<dyn SpeechEngine>, preference: VoicePreference) -> Self {
        Self { engine, preference }
    }

    pub fn engine(&self) -> Arc<dyn SpeechEngine> {
        self.engine.clone()
    }

    pub fn preference(&self) -> &VoicePreference {
        &self.preference
    }

    /// Build the utterance for `request`, choosing a voice. Falls back to the
    /// engine default voice when nothing matches.
    pub async fn prepare(&self, request: &SynthesisRequest) -> Result<Utterance, TtsError> {
        if !self.engine.is_available().await {
            return Err(TtsError::LocalEngineUnavailable(format!(
                "{} engine is not available",
                self.engine.id()
            )));
        }

        let voices = self.engine.voices().await;
        let voice = select_voice(&voices, &self.preference).cloned();
        match &voice {
            Some(v) => tracing::debug!("[TTS] Local voice selected: {} ({})", v.name, v.language),
            None => tracing::debug!("[TTS] No local voice matched, using engine default"),
        }

        Ok(Utterance {
            text: request.text().to_string(),
            voice,
            rate: self.preference.rate,
            pitch: self.preference.pitch,
            volume: self.preference.volume,
        })
    }

    /// Prepare and immediately speak `request` on the host engine.
    pub async fn speak_locally(&self, request: &SynthesisRequest) -> Result<PlaybackHandle, TtsError> {
        let utterance = self.prepare(request).await?;
        self.engine.speak(&utterance).await
    }
}
