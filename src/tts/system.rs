//! Host-process backends: command-line speech engines for the fallback path
//! and a command-line audio player for rendered remote audio.

use super::interface::{
    AudioOutput, AudioResult, LocalVoice, PlaybackHandle, PlaybackSignals, SpeechEngine, TtsError,
    Utterance,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// Locate an executable on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

enum ChildExit {
    Finished(std::io::Result<ExitStatus>),
    Stopped,
}

/// Drive a playback child process until it exits, is stopped through its
/// handle, or is cancelled engine-wide. The transient file (if any) is
/// dropped before completion is signalled, on every exit path.
async fn supervise_child(
    mut child: Child,
    signals: PlaybackSignals,
    mut cancel: Option<watch::Receiver<u64>>,
    transient: Option<NamedTempFile>,
    label: String,
) {
    let PlaybackSignals { mut stop, done } = signals;

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

    let exit = tokio::select! {
        status = child.wait() => ChildExit::Finished(status),
        _ = &mut stop => ChildExit::Stopped,
        _ = cancelled => ChildExit::Stopped,
    };

    let result = match exit {
        ChildExit::Finished(Ok(status)) if status.success() => Ok(()),
        ChildExit::Finished(Ok(status)) => {
            Err(TtsError::Playback(format!("{} exited with {}", label, status)))
        }
        ChildExit::Finished(Err(e)) => Err(TtsError::Playback(format!("{}: {}", label, e))),
        ChildExit::Stopped => {
            if let Err(e) = child.kill().await {
                tracing::debug!("[TTS] {} already gone on stop: {}", label, e);
            }
            Ok(())
        }
    };

    drop(transient);
    let _ = done.send(result);
}

// ── Speech engines ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// macOS `say`
    Say,
    EspeakNg,
    /// speech-dispatcher client
    SpdSay,
}

impl EngineKind {
    pub fn program(self) -> &'static str {
        match self {
            EngineKind::Say => "say",
            EngineKind::EspeakNg => "espeak-ng",
            EngineKind::SpdSay => "spd-say",
        }
    }

    fn voices_args(self) -> &'static [&'static str] {
        match self {
            EngineKind::Say => &["-v", "?"],
            EngineKind::EspeakNg => &["--voices"],
            EngineKind::SpdSay => &["-L"],
        }
    }

    fn parse_voices(self, output: &str) -> Vec<LocalVoice> {
        match self {
            EngineKind::Say => parse_say_voices(output),
            EngineKind::EspeakNg => parse_espeak_voices(output),
            EngineKind::SpdSay => parse_spd_voices(output),
        }
    }

    /// Arguments for speaking `utterance`; the text itself is written to stdin.
    pub fn speak_args(self, utterance: &Utterance) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            EngineKind::Say => {
                if let Some(voice) = &utterance.voice {
                    args.extend(["-v".to_string(), voice.id.clone()]);
                }
                args.extend(["-r".to_string(), format!("{}", (175.0 * utterance.rate).round() as i32)]);
                args.extend(["-f".to_string(), "-".to_string()]);
            }
            EngineKind::EspeakNg => {
                if let Some(voice) = &utterance.voice {
                    args.extend(["-v".to_string(), voice.id.clone()]);
                }
                args.extend(["-s".to_string(), format!("{}", (175.0 * utterance.rate).round() as i32)]);
                args.extend([
                    "-p".to_string(),
                    format!("{}", (50.0 * utterance.pitch).clamp(0.0, 99.0).round() as i32),
                ]);
                args.extend([
                    "-a".to_string(),
                    format!("{}", (100.0 * utterance.volume).clamp(0.0, 200.0).round() as i32),
                ]);
                args.push("--stdin".to_string());
            }
            EngineKind::SpdSay => {
                if let Some(voice) = &utterance.voice {
                    args.extend(["-y".to_string(), voice.id.clone()]);
                }
                let scale = |v: f32| format!("{}", ((v - 1.0) * 100.0).clamp(-100.0, 100.0).round() as i32);
                args.extend(["-r".to_string(), scale(utterance.rate)]);
                args.extend(["-p".to_string(), scale(utterance.pitch)]);
                args.extend(["-i".to_string(), scale(utterance.volume)]);
                args.extend(["-w".to_string(), "-e".to_string()]);
            }
        }
        args
    }
}

/// `say -v '?'`: `Daniel              en_GB    # Hello! My name is Daniel.`
pub fn parse_say_voices(output: &str) -> Vec<LocalVoice> {
    output
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, language) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || language.is_empty() {
                return None;
            }
            Some(LocalVoice {
                id: name.to_string(),
                name: name.to_string(),
                language: language.to_string(),
            })
        })
        .collect()
}

/// `espeak-ng --voices`: `Pty Language Age/Gender VoiceName File Other Languages`
pub fn parse_espeak_voices(output: &str) -> Vec<LocalVoice> {
    output
        .lines()
        .skip_while(|line| line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let gender = match cols[2].rsplit('/').next() {
                Some("M") => " Male",
                Some("F") => " Female",
                _ => "",
            };
            Some(LocalVoice {
                id: cols[1].to_string(),
                name: format!("{}{}", cols[3].replace('_', " "), gender),
                language: cols[1].to_string(),
            })
        })
        .collect()
}

/// `spd-say -L`: `NAME  LANGUAGE  VARIANT`
pub fn parse_spd_voices(output: &str) -> Vec<LocalVoice> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("NAME"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 2 {
                return None;
            }
            Some(LocalVoice {
                id: cols[0].to_string(),
                name: cols[0].to_string(),
                language: cols[1].to_string(),
            })
        })
        .collect()
}

/// Speech engine driven through a command-line synthesizer.
pub struct CommandSpeechEngine {
    kind: EngineKind,
    program: PathBuf,
    cancel: watch::Sender<u64>,
}

impl CommandSpeechEngine {
    pub fn new(kind: EngineKind, program: PathBuf) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            kind,
            program,
            cancel,
        }
    }

    /// First engine found on `PATH`, in order: `say`, `espeak-ng`, `spd-say`.
    pub fn detect() -> Option<Self> {
        [EngineKind::Say, EngineKind::EspeakNg, EngineKind::SpdSay]
            .into_iter()
            .find_map(|kind| find_program(kind.program()).map(|path| Self::new(kind, path)))
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    fn id(&self) -> &str {
        self.kind.program()
    }

    async fn is_available(&self) -> bool {
        self.program.is_file()
    }

    async fn voices(&self) -> Vec<LocalVoice> {
        match Command::new(&self.program)
            .args(self.kind.voices_args())
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                self.kind.parse_voices(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                tracing::warn!("[TTS] {} voice listing exited with {}", self.id(), output.status);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("[TTS] {} voice listing failed: {}", self.id(), e);
                Vec::new()
            }
        }
    }

    async fn speak(&self, utterance: &Utterance) -> Result<PlaybackHandle, TtsError> {
        let mut child = Command::new(&self.program)
            .args(self.kind.speak_args(utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::LocalEngineUnavailable(format!("{}: {}", self.id(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(utterance.text.as_bytes())
                .await
                .map_err(|e| TtsError::Playback(format!("{} stdin: {}", self.id(), e)))?;
        }

        let (handle, signals) = PlaybackHandle::channel();
        tokio::spawn(supervise_child(
            child,
            signals,
            Some(self.cancel.subscribe()),
            None,
            self.id().to_string(),
        ));
        Ok(handle)
    }

    fn cancel_all(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }
}

/// Stand-in engine for hosts without any speech synthesizer.
pub struct UnavailableEngine;

#[async_trait]
impl SpeechEngine for UnavailableEngine {
    fn id(&self) -> &str {
        "none"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn voices(&self) -> Vec<LocalVoice> {
        Vec::new()
    }

    async fn speak(&self, _utterance: &Utterance) -> Result<PlaybackHandle, TtsError> {
        Err(TtsError::LocalEngineUnavailable(
            "no speech engine found on this host".to_string(),
        ))
    }

    fn cancel_all(&self) {}
}

// ── Audio output ───────────────────────────────────────

/// Plays rendered audio by writing it to a transient file and handing the
/// path to a command-line player.
pub struct CommandAudioOutput {
    program: PathBuf,
    args: Vec<String>,
    temp_dir: Option<PathBuf>,
}

impl CommandAudioOutput {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            temp_dir: None,
        }
    }

    /// Write transient audio files under `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// First player found on `PATH`: `afplay`, `paplay`, `aplay`, `ffplay`.
    pub fn detect() -> Option<Self> {
        let candidates: [(&str, &[&str]); 4] = [
            ("afplay", &[]),
            ("paplay", &[]),
            ("aplay", &["-q"]),
            ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
        ];
        candidates.into_iter().find_map(|(program, args)| {
            find_program(program)
                .map(|path| Self::new(path, args.iter().map(|a| a.to_string()).collect()))
        })
    }

    fn write_transient(&self, audio: &AudioResult) -> std::io::Result<NamedTempFile> {
        let suffix = format!(".{}", audio.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("persona-voice-").suffix(&suffix);
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        std::io::Write::write_all(&mut file, &audio.bytes)?;
        std::io::Write::flush(&mut file)?;
        Ok(file)
    }
}

#[async_trait]
impl AudioOutput for CommandAudioOutput {
    fn id(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("player")
    }

    async fn play(&self, audio: AudioResult) -> Result<PlaybackHandle, TtsError> {
        let file = self
            .write_transient(&audio)
            .map_err(|e| TtsError::Playback(format!("transient audio file: {}", e)))?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::Playback(format!("{}: {}", self.id(), e)))?;

        let (handle, signals) = PlaybackHandle::channel();
        tokio::spawn(supervise_child(
            child,
            signals,
            None,
            Some(file),
            self.id().to_string(),
        ));
        Ok(handle)
    }
}

/// Stand-in output for headless hosts.
pub struct UnavailableOutput;

#[async_trait]
impl AudioOutput for UnavailableOutput {
    fn id(&self) -> &str {
        "none"
    }

    async fn play(&self, _audio: AudioResult) -> Result<PlaybackHandle, TtsError> {
        Err(TtsError::Playback("no audio output found on this host".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_say_listing() {
        let output = "Alex                en_US    # Most people recognize me by my voice.\n\
                      Bad News            en_US    # The light you see at the end of the tunnel.\n\
                      Daniel              en_GB    # Hello, my name is Daniel.\n";
        let voices = parse_say_voices(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].name, "Bad News");
        assert_eq!(voices[2].language, "en_GB");
    }

    #[test]
    fn test_parses_espeak_listing_with_gender() {
        let output = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
                      5  af              --/M      Afrikaans          gmw/af\n \
                      2  en-us           --/M      English_(America)  gmw/en-US            (en 3)\n \
                      5  en-gb-x-rp      --/F      English_(Received_Pronunciation) gmw/en-GB-x-rp\n";
        let voices = parse_espeak_voices(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].id, "en-us");
        assert_eq!(voices[1].name, "English (America) Male");
        assert!(voices[2].name.ends_with("Female"));
    }

    #[test]
    fn test_parses_spd_listing() {
        let output = "NAME                 LANGUAGE  VARIANT\nen-us                en-US     none\nde                   de        none\n";
        let voices = parse_spd_voices(output);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].language, "en-US");
    }

    #[test]
    fn test_espeak_args_scale_parameters() {
        let utterance = Utterance {
            text: "hi".into(),
            voice: Some(LocalVoice {
                id: "en-us".into(),
                name: "English".into(),
                language: "en-us".into(),
            }),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        };
        let args = EngineKind::EspeakNg.speak_args(&utterance);
        assert_eq!(
            args,
            vec!["-v", "en-us", "-s", "175", "-p", "50", "-a", "100", "--stdin"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_removes_transient_file_after_natural_end() {
        let Some(cat) = find_program("cat") else { return };
        let dir = tempfile::TempDir::new().unwrap();
        let output = CommandAudioOutput::new(cat, Vec::new()).with_temp_dir(dir.path());

        let handle = output
            .play(AudioResult::new(vec![1, 2, 3], "audio/wav"))
            .await
            .unwrap();
        let (_stop, done) = handle.into_parts();
        assert_eq!(done.await.unwrap(), Ok(()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_stop_kills_child_and_removes_file() {
        let Some(tail) = find_program("tail") else { return };
        let dir = tempfile::TempDir::new().unwrap();
        let output = CommandAudioOutput::new(tail, vec!["-f".to_string()]).with_temp_dir(dir.path());

        let handle = output
            .play(AudioResult::new(vec![0; 16], "audio/mpeg"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let (stop, done) = handle.into_parts();
        stop.unwrap().send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), done)
            .await
            .expect("stop should end playback")
            .unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_backends_refuse() {
        assert!(!UnavailableEngine.is_available().await);
        let err = UnavailableOutput
            .play(AudioResult::new(vec![1], "audio/wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Playback(_)));
    }
}
