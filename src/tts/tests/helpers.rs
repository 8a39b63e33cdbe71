use crate::tts::interface::{
    AudioOutput, AudioResult, LocalVoice, PlaybackHandle, RemoteSynthesizer, SpeechEngine,
    SynthesisRequest, TtsError, Utterance,
};
use crate::tts::local::{LocalFallbackSynthesizer, VoicePreference};
use crate::tts::playback::PlaybackController;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

// ── Rendition stub shared by the fakes ──────────────────────

/// Spawn a fake rendition that ends when stopped, when `cancel` changes,
/// or when `finish` is triggered.
fn spawn_rendition(
    cancel: Option<watch::Receiver<u64>>,
    finishers: &Mutex<Vec<oneshot::Sender<Result<(), TtsError>>>>,
) -> PlaybackHandle {
    let (handle, signals) = PlaybackHandle::channel();
    let (finish_tx, finish_rx) = oneshot::channel();
    finishers.lock().unwrap().push(finish_tx);

    tokio::spawn(async move {
        let mut stop = signals.stop;
        let mut cancel = cancel;
        let cancelled = async {
            match cancel.as_mut() {
                Some(rx) => {
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let result = tokio::select! {
            finished = finish_rx => finished.unwrap_or(Ok(())),
            _ = &mut stop => Ok(()),
            _ = cancelled => Ok(()),
        };
        let _ = signals.done.send(result);
    });

    handle
}

// ── Audio output ────────────────────────────────────────────

#[derive(Default)]
pub struct FakeOutput {
    pub fail: bool,
    pub played: Mutex<Vec<AudioResult>>,
    finishers: Mutex<Vec<oneshot::Sender<Result<(), TtsError>>>>,
}

impl FakeOutput {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().unwrap().len()
    }

    /// End every rendition started so far with `result`.
    pub fn finish_all(&self, result: Result<(), TtsError>) {
        for finisher in self.finishers.lock().unwrap().drain(..) {
            let _ = finisher.send(result.clone());
        }
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    fn id(&self) -> &str {
        "fake-output"
    }

    async fn play(&self, audio: AudioResult) -> Result<PlaybackHandle, TtsError> {
        if self.fail {
            return Err(TtsError::Playback("fake output refused".to_string()));
        }
        self.played.lock().unwrap().push(audio);
        Ok(spawn_rendition(None, &self.finishers))
    }
}

// ── Speech engine ───────────────────────────────────────────

pub struct FakeEngine {
    pub available: bool,
    pub voices: Vec<LocalVoice>,
    pub spoken: Mutex<Vec<Utterance>>,
    pub cancel_calls: AtomicUsize,
    pub voices_delay: Duration,
    cancel: watch::Sender<u64>,
    finishers: Mutex<Vec<oneshot::Sender<Result<(), TtsError>>>>,
}

impl FakeEngine {
    pub fn with_voices(voices: Vec<LocalVoice>) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            available: true,
            voices,
            spoken: Mutex::new(Vec::new()),
            cancel_calls: AtomicUsize::new(0),
            voices_delay: Duration::ZERO,
            cancel,
            finishers: Mutex::new(Vec::new()),
        }
    }

    pub fn available() -> Self {
        Self::with_voices(vec![
            voice("en-us", "English Female", "en-US"),
            voice("daniel", "Daniel", "en-GB"),
        ])
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            ..Self::with_voices(Vec::new())
        }
    }

    /// Available engine whose voice enumeration takes `delay`.
    pub fn slow_voices(delay: Duration) -> Self {
        Self {
            voices_delay: delay,
            ..Self::available()
        }
    }

    pub fn spoken_count(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn finish_all(&self, result: Result<(), TtsError>) {
        for finisher in self.finishers.lock().unwrap().drain(..) {
            let _ = finisher.send(result.clone());
        }
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    fn id(&self) -> &str {
        "fake-engine"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn voices(&self) -> Vec<LocalVoice> {
        if !self.voices_delay.is_zero() {
            tokio::time::sleep(self.voices_delay).await;
        }
        self.voices.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> Result<PlaybackHandle, TtsError> {
        if !self.available {
            return Err(TtsError::LocalEngineUnavailable("fake engine missing".to_string()));
        }
        self.spoken.lock().unwrap().push(utterance.clone());
        Ok(spawn_rendition(Some(self.cancel.subscribe()), &self.finishers))
    }

    fn cancel_all(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.send_modify(|generation| *generation += 1);
    }
}

// ── Remote synthesizer ──────────────────────────────────────

pub struct FakeRemote {
    pub configured: bool,
    pub result: Result<AudioResult, TtsError>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeRemote {
    pub fn succeeding() -> Self {
        Self {
            configured: true,
            result: Ok(wav(&[1, 2, 3, 4])),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: TtsError) -> Self {
        Self {
            result: Err(error),
            ..Self::succeeding()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::succeeding()
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::succeeding()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSynthesizer for FakeRemote {
    fn id(&self) -> &str {
        "fake-remote"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<AudioResult, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

// ── Builders ────────────────────────────────────────────────

pub fn voice(id: &str, name: &str, language: &str) -> LocalVoice {
    LocalVoice {
        id: id.to_string(),
        name: name.to_string(),
        language: language.to_string(),
    }
}

pub fn wav(bytes: &[u8]) -> AudioResult {
    AudioResult::new(bytes.to_vec(), "audio/wav")
}

pub fn request(text: &str) -> SynthesisRequest {
    SynthesisRequest::new(text).unwrap()
}

pub fn local_synth(engine: &Arc<FakeEngine>) -> LocalFallbackSynthesizer {
    LocalFallbackSynthesizer::new(engine.clone(), VoicePreference::default())
}

pub fn controller(output: &Arc<FakeOutput>, engine: &Arc<FakeEngine>) -> PlaybackController {
    PlaybackController::new(output.clone(), engine.clone())
}

/// Poll `check` until it holds or a short deadline passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
