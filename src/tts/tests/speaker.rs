use super::helpers::*;
use crate::tts::interface::TtsError;
use crate::tts::orchestrator::SynthesisOrchestrator;
use crate::tts::playback::{PlaybackPath, PlaybackSource};
use crate::tts::speaker::{SpeakOutcome, Speaker};
use std::sync::Arc;
use std::time::Duration;

fn speaker(remote: FakeRemote, output: &Arc<FakeOutput>, engine: &Arc<FakeEngine>) -> Speaker {
    Speaker::new(
        SynthesisOrchestrator::new(Arc::new(remote), local_synth(engine)),
        controller(output, engine),
    )
}

#[tokio::test]
async fn test_empty_reply_is_rejected() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let speaker = speaker(FakeRemote::succeeding(), &output, &engine);

    assert!(matches!(speaker.speak("  ").await, Err(TtsError::EmptyInput)));
    assert_eq!(output.play_count(), 0);
    assert_eq!(engine.spoken_count(), 0);
}

#[tokio::test]
async fn test_remote_audio_is_played() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let speaker = speaker(FakeRemote::succeeding(), &output, &engine);

    match speaker.speak("Hello").await.unwrap() {
        SpeakOutcome::Playing(session) => assert_eq!(session.path(), PlaybackPath::Remote),
        other => panic!("expected playback, got {:?}", other),
    }
    assert!(speaker.is_speaking().await);
    assert_eq!(output.play_count(), 1);
    assert_eq!(engine.spoken_count(), 0);
}

#[tokio::test]
async fn test_remote_failure_speaks_locally() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let speaker = speaker(
        FakeRemote::failing(TtsError::ProviderCreate("500".into())),
        &output,
        &engine,
    );

    match speaker.speak("Hello").await.unwrap() {
        SpeakOutcome::Playing(session) => assert_eq!(session.path(), PlaybackPath::Local),
        other => panic!("expected playback, got {:?}", other),
    }
    assert_eq!(engine.spoken_count(), 1);
    assert_eq!(output.play_count(), 0);
}

#[tokio::test]
async fn test_unplayable_remote_audio_speaks_locally() {
    let output = Arc::new(FakeOutput::failing());
    let engine = Arc::new(FakeEngine::available());
    let speaker = speaker(FakeRemote::succeeding(), &output, &engine);

    match speaker.speak("Hello").await.unwrap() {
        SpeakOutcome::Playing(session) => assert_eq!(session.path(), PlaybackPath::Local),
        other => panic!("expected playback, got {:?}", other),
    }
    assert_eq!(engine.spoken_count(), 1);
}

#[tokio::test]
async fn test_nothing_available_stays_text_only() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::missing());
    let speaker = speaker(FakeRemote::unconfigured(), &output, &engine);

    match speaker.speak("Hello").await.unwrap() {
        SpeakOutcome::Unavailable(reason) => {
            assert!(matches!(reason.remote, Some(TtsError::Configuration(_))));
        }
        other => panic!("expected unavailable, got {:?}", other),
    }
    assert!(!speaker.is_speaking().await);
}

// ── Superseded Replies ──────────────────────────────────────

#[tokio::test]
async fn test_cancel_during_render_discards_result() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let speaker = Arc::new(speaker(
        FakeRemote::delayed(Duration::from_millis(200)),
        &output,
        &engine,
    ));

    let pending = {
        let speaker = speaker.clone();
        tokio::spawn(async move { speaker.speak("Hello").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    speaker.cancel().await;

    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, SpeakOutcome::Superseded));
    assert_eq!(output.play_count(), 0);
    assert!(!speaker.is_speaking().await);
}

#[tokio::test]
async fn test_newer_reply_wins() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let speaker = Arc::new(speaker(
        FakeRemote::delayed(Duration::from_millis(150)),
        &output,
        &engine,
    ));

    let first = {
        let speaker = speaker.clone();
        tokio::spawn(async move { speaker.speak("first").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = speaker.speak("second").await.unwrap();

    assert!(matches!(first.await.unwrap().unwrap(), SpeakOutcome::Superseded));
    assert!(matches!(second, SpeakOutcome::Playing(_)));
    assert_eq!(output.play_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_local_retry_discards_result() {
    let output = Arc::new(FakeOutput::failing());
    let engine = Arc::new(FakeEngine::slow_voices(Duration::from_millis(200)));
    let speaker = Arc::new(speaker(FakeRemote::succeeding(), &output, &engine));

    let pending = {
        let speaker = speaker.clone();
        tokio::spawn(async move { speaker.speak("Hello").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    speaker.cancel().await;

    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, SpeakOutcome::Superseded));
    assert!(!speaker.is_speaking().await);
    assert_eq!(engine.spoken_count(), 0);
}

#[tokio::test]
async fn test_play_if_leaves_newer_session_alone() {
    let output = Arc::new(FakeOutput::default());
    let engine = Arc::new(FakeEngine::available());
    let playback = controller(&output, &engine);

    let newer = playback
        .play(PlaybackSource::Remote(wav(&[1])))
        .await
        .unwrap();
    let stale = playback
        .play_if(PlaybackSource::Remote(wav(&[2])), || false)
        .await
        .unwrap();

    assert!(stale.is_none());
    assert!(newer.is_active());
    assert_eq!(output.play_count(), 1);
}
