use super::interface::{AudioResult, RemoteSynthesizer, SynthesisRequest, TtsError, VoiceConfig};
use super::task::{PollObservation, PollState, ProviderTask, ProviderTaskStatus, TaskPoller};
use crate::config::TtsSection;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-api-key";
const DEFAULT_AUDIO_MIME: &str = "audio/wav";

/// Task-based remote TTS client (Camb.AI style API).
///
/// Synthesis is asynchronous on the provider side:
///   1. `POST {base}/tts` creates a task and returns its `task_id`
///   2. `GET {base}/tts/{task_id}` is polled on a fixed interval until a
///      terminal status or the attempt budget runs out
///   3. `GET {base}/tts-result/{run_id}` returns the rendered audio bytes
///
/// No fallback happens here; every failure is reported as a `TtsError`.
pub struct CambTaskClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    voice: VoiceConfig,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    text: &'a str,
    voice_id: u32,
    language: u32,
    gender: u32,
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    task_id: serde_json::Value,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    run_id: Option<serde_json::Value>,
}

/// The provider returns ids as numbers or strings depending on the endpoint.
fn id_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CambTaskClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, voice: VoiceConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            voice,
            poll_interval: Duration::from_millis(2000),
            max_poll_attempts: 30,
        }
    }

    /// Construct from the `tts` config section, resolving the key from env if needed.
    pub fn from_config(section: &TtsSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::new(section.base_url.clone(), section.resolve_api_key(), section.voice())
            .with_client(client)
            .with_polling(section.poll_interval(), section.max_poll_attempts)
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn api_key(&self) -> Result<&str, TtsError> {
        self.api_key.as_deref().ok_or_else(|| {
            TtsError::Configuration("remote TTS API key is not configured".to_string())
        })
    }

    /// Step 1: submit the synthesis job.
    pub async fn create_task(&self, text: &str) -> Result<ProviderTask, TtsError> {
        let api_key = self.api_key()?;
        let body = CreateTaskRequest {
            text,
            voice_id: self.voice.voice_id,
            language: self.voice.language,
            gender: self.voice.gender.provider_code(),
        };

        let response = self
            .client
            .post(format!("{}/tts", self.base_url))
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::ProviderCreate(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("[TTS] Task create error ({}): {}", status, error_text);
            return Err(TtsError::ProviderCreate(format!("status {}", status)));
        }

        let created: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| TtsError::ProviderCreate(format!("invalid response: {}", e)))?;
        let task_id = id_from_value(&created.task_id)
            .ok_or_else(|| TtsError::ProviderCreate("response carried no task_id".to_string()))?;

        tracing::debug!("[TTS] Created task {}", task_id);
        Ok(ProviderTask::new(task_id))
    }

    /// One status poll. Transport and decode failures are reported as
    /// observations, not errors, so they only consume an attempt.
    pub async fn poll_status(&self, task: &ProviderTask) -> PollObservation {
        let api_key = match self.api_key() {
            Ok(key) => key,
            Err(e) => return PollObservation::TransportError(e.to_string()),
        };

        let response = match self
            .client
            .get(format!("{}/tts/{}", self.base_url, task.task_id))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return PollObservation::TransportError(e.to_string()),
        };

        if !response.status().is_success() {
            return PollObservation::TransportError(format!("status {}", response.status()));
        }

        match response.json::<StatusResponse>().await {
            Ok(body) => PollObservation::Status(ProviderTaskStatus::from_wire(
                &body.status,
                body.run_id.as_ref().and_then(id_from_value),
            )),
            Err(e) => PollObservation::TransportError(format!("invalid status body: {}", e)),
        }
    }

    /// Step 2: poll until the task reaches a terminal state.
    pub async fn wait_for_run(&self, task: &ProviderTask) -> Result<String, TtsError> {
        let mut poller = TaskPoller::new(self.max_poll_attempts);

        while !poller.is_terminal() {
            let observation = self.poll_status(task).await;
            if let PollObservation::TransportError(ref e) = observation {
                tracing::warn!("[TTS] Poll for task {} failed: {}", task.task_id, e);
            }
            match poller.observe(observation) {
                Ok(PollState::Polling { .. }) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("[TTS] {}", e);
                    break;
                }
            }
        }

        let attempts = poller.state().attempts_used();
        let outcome = poller.finish(task);
        match &outcome {
            Ok(run_id) => tracing::debug!(
                "[TTS] Task {} succeeded after {} polls (run {})",
                task.task_id,
                attempts,
                run_id
            ),
            Err(e) => tracing::warn!("[TTS] {}", e),
        }
        outcome
    }

    /// Step 3: download the rendered audio.
    pub async fn fetch_result(&self, run_id: &str) -> Result<AudioResult, TtsError> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/tts-result/{}", self.base_url, run_id))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| TtsError::Fetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("[TTS] Result fetch error ({}): {}", status, error_text);
            return Err(TtsError::Fetch(format!("status {}", status)));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Fetch(format!("bytes error: {}", e)))?;
        if bytes.is_empty() {
            return Err(TtsError::Fetch("provider returned empty audio".to_string()));
        }

        Ok(AudioResult::new(bytes.to_vec(), mime_type))
    }
}

#[async_trait]
impl RemoteSynthesizer for CambTaskClient {
    fn id(&self) -> &str {
        "camb"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResult, TtsError> {
        let task = self.create_task(request.text()).await?;
        let run_id = self.wait_for_run(&task).await?;
        self.fetch_result(&run_id).await
    }
}
