use super::interface::{AudioResult, RemoteSynthesizer, SynthesisRequest, TtsError, Utterance};
use super::local::LocalFallbackSynthesizer;
use std::sync::Arc;

/// Why neither path can produce speech. Logged, never shown verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Unavailable {
    pub remote: Option<TtsError>,
    pub local: TtsError,
}

/// Result of rendering one reply: exactly one of the two paths, or neither.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Remote(AudioResult),
    Local(Utterance),
    Unavailable(Unavailable),
}

/// Remote-first synthesis with a deterministic, single-shot local fallback.
///
/// Decision table:
///   remote configured + succeeds         → `Remote`
///   remote fails / unconfigured / absent → local engine available → `Local`
///                                          local engine unavailable → `Unavailable`
///
/// The remote path is never retried within one reply.
pub struct SynthesisOrchestrator {
    remote: Option<Arc<dyn RemoteSynthesizer>>,
    local: LocalFallbackSynthesizer,
}

impl SynthesisOrchestrator {
    pub fn new(remote: Arc<dyn RemoteSynthesizer>, local: LocalFallbackSynthesizer) -> Self {
        Self {
            remote: Some(remote),
            local,
        }
    }

    pub fn local_only(local: LocalFallbackSynthesizer) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    pub fn local(&self) -> &LocalFallbackSynthesizer {
        &self.local
    }

    pub async fn render(&self, request: &SynthesisRequest) -> RenderOutcome {
        let remote_error = match &self.remote {
            Some(remote) if remote.is_configured() => match remote.synthesize(request).await {
                Ok(audio) => return RenderOutcome::Remote(audio),
                Err(e) => {
                    tracing::warn!(
                        "[TTS] Remote synthesis via {} failed ({}): {}, falling back to local engine",
                        remote.id(),
                        e.kind(),
                        e
                    );
                    Some(e)
                }
            },
            Some(remote) => {
                tracing::info!(
                    "[TTS] Remote synthesizer {} has no credentials, using local engine",
                    remote.id()
                );
                Some(TtsError::Configuration(format!(
                    "{} is not configured",
                    remote.id()
                )))
            }
            None => None,
        };

        match self.fall_back(request, remote_error).await {
            Ok(utterance) => RenderOutcome::Local(utterance),
            Err(reason) => RenderOutcome::Unavailable(reason),
        }
    }

    /// Local path only, recording why the remote path was skipped.
    pub async fn fall_back(
        &self,
        request: &SynthesisRequest,
        remote_error: Option<TtsError>,
    ) -> Result<Utterance, Unavailable> {
        self.local.prepare(request).await.map_err(|local| {
            tracing::error!("[TTS] Could not produce speech: {}", local);
            Unavailable {
                remote: remote_error,
                local,
            }
        })
    }
}
