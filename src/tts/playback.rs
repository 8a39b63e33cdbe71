use super::interface::{AudioOutput, AudioResult, SpeechEngine, TtsError, Utterance};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch, Mutex, MutexGuard};

/// What a playback session renders: remote audio bytes or a host-engine utterance.
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    Remote(AudioResult),
    Local(Utterance),
}

impl PlaybackSource {
    pub fn path(&self) -> PlaybackPath {
        match self {
            PlaybackSource::Remote(_) => PlaybackPath::Remote,
            PlaybackSource::Local(_) => PlaybackPath::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPath {
    Remote,
    Local,
}

/// Lifecycle events, uniform across both paths.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { session_id: u64, path: PlaybackPath },
    Ended { session_id: u64 },
    Cancelled { session_id: u64 },
    Failed { session_id: u64, message: String },
}

/// One audible rendition. Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: u64,
    path: PlaybackPath,
    active: Arc<watch::Sender<bool>>,
}

impl PlaybackSession {
    fn new(id: u64, path: PlaybackPath) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            id,
            path,
            active: Arc::new(active),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> PlaybackPath {
        self.path
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Flip to inactive. Returns `true` only for the call that did the flip.
    fn finish(&self) -> bool {
        self.active.send_if_modified(|active| std::mem::replace(active, false))
    }

    /// Resolve once the session has ended for any reason.
    pub async fn wait(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }
}

struct ActivePlayback {
    session: PlaybackSession,
    stop: Option<oneshot::Sender<()>>,
}

/// Owns at most one active rendition. Starting a new one stops the current
/// one; cancellation stops both the audio output and the speech engine.
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    engine: Arc<dyn SpeechEngine>,
    active: Arc<Mutex<Option<ActivePlayback>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>, engine: Arc<dyn SpeechEngine>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            output,
            engine,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub async fn is_playing(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| a.session.is_active())
    }

    pub async fn current(&self) -> Option<PlaybackSession> {
        self.active.lock().await.as_ref().map(|a| a.session.clone())
    }

    /// Start rendering `source`, replacing any active session.
    pub async fn play(&self, source: PlaybackSource) -> Result<PlaybackSession, TtsError> {
        let slot = self.active.lock().await;
        self.start(slot, source).await
    }

    /// Like [`play`](Self::play), but only if `still_wanted` holds once the
    /// slot is locked. Returns `Ok(None)` and leaves the active session alone
    /// otherwise, so a caller's cancel that lands before the lock is never lost.
    pub async fn play_if<F>(
        &self,
        source: PlaybackSource,
        still_wanted: F,
    ) -> Result<Option<PlaybackSession>, TtsError>
    where
        F: FnOnce() -> bool,
    {
        let slot = self.active.lock().await;
        if !still_wanted() {
            return Ok(None);
        }
        self.start(slot, source).await.map(Some)
    }

    async fn start(
        &self,
        mut slot: MutexGuard<'_, Option<ActivePlayback>>,
        source: PlaybackSource,
    ) -> Result<PlaybackSession, TtsError> {
        if let Some(previous) = slot.take() {
            self.stop(previous);
        }
        self.engine.cancel_all();

        let path = source.path();
        let started = match source {
            PlaybackSource::Remote(audio) => self.output.play(audio).await,
            PlaybackSource::Local(utterance) => self.engine.speak(&utterance).await,
        };
        let handle = match started {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("[TTS] {:?} playback could not start: {}", path, e);
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = PlaybackSession::new(id, path);
        let (stop, done) = handle.into_parts();
        *slot = Some(ActivePlayback {
            session: session.clone(),
            stop,
        });
        drop(slot);

        let _ = self.events.send(PlaybackEvent::Started {
            session_id: id,
            path,
        });
        tracing::debug!("[TTS] Playback {} started ({:?})", id, path);

        let watched = session.clone();
        let active = self.active.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = done
                .await
                .unwrap_or_else(|_| Err(TtsError::Playback("backend dropped playback".to_string())));

            {
                let mut slot = active.lock().await;
                if slot.as_ref().is_some_and(|a| a.session.id == watched.id) {
                    *slot = None;
                }
            }

            if watched.finish() {
                let event = match result {
                    Ok(()) => PlaybackEvent::Ended {
                        session_id: watched.id,
                    },
                    Err(e) => {
                        tracing::warn!("[TTS] Playback {} failed: {}", watched.id, e);
                        PlaybackEvent::Failed {
                            session_id: watched.id,
                            message: e.to_string(),
                        }
                    }
                };
                let _ = events.send(event);
            }
        });

        Ok(session)
    }

    /// Stop `session`. A no-op for sessions that already ended or were cancelled.
    pub async fn cancel(&self, session: &PlaybackSession) {
        if !session.is_active() {
            return;
        }
        {
            let mut slot = self.active.lock().await;
            if slot.as_ref().is_some_and(|a| a.session.id == session.id) {
                if let Some(active) = slot.take() {
                    self.stop(active);
                }
            }
        }
        if session.finish() {
            let _ = self.events.send(PlaybackEvent::Cancelled {
                session_id: session.id,
            });
        }
        self.engine.cancel_all();
    }

    /// Stop whatever is audible, whichever path produced it.
    pub async fn cancel_current(&self) {
        let previous = self.active.lock().await.take();
        if let Some(active) = previous {
            self.stop(active);
        }
        self.engine.cancel_all();
    }

    fn stop(&self, active: ActivePlayback) {
        if active.session.finish() {
            tracing::debug!("[TTS] Playback {} cancelled", active.session.id);
            let _ = self.events.send(PlaybackEvent::Cancelled {
                session_id: active.session.id,
            });
        }
        if let Some(stop) = active.stop {
            let _ = stop.send(());
        }
    }
}
