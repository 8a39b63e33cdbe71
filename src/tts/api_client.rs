use super::interface::{AudioResult, RemoteSynthesizer, SynthesisRequest, TtsError};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote synthesizer that calls a running server's `/api/tts` endpoint,
/// which performs the provider task protocol server-side.
pub struct ApiTtsClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ApiTtsRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTtsResponse {
    #[serde(default)]
    audio_content: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiTtsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            // Covers the server's own 30 × 2 s polling budget plus the fetch.
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl RemoteSynthesizer for ApiTtsClient {
    fn id(&self) -> &str {
        "api"
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResult, TtsError> {
        let response = self
            .client
            .post(format!("{}/api/tts", self.base_url))
            .json(&ApiTtsRequest {
                text: request.text(),
            })
            .send()
            .await
            .map_err(|e| TtsError::ProviderTransport(format!("request failed: {}", e)))?;

        let status = response.status();
        let body: ApiTtsResponse = response
            .json()
            .await
            .map_err(|e| TtsError::ProviderTransport(format!("invalid response ({}): {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(TtsError::ProviderTransport(format!("{}: {}", status, error)));
        }

        let encoded = body
            .audio_content
            .ok_or_else(|| TtsError::Fetch("response carried no audio".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TtsError::Fetch(format!("invalid base64 audio: {}", e)))?;
        if bytes.is_empty() {
            return Err(TtsError::Fetch("server returned empty audio".to_string()));
        }

        Ok(AudioResult::new(
            bytes,
            body.content_type.unwrap_or_else(|| "audio/wav".to_string()),
        ))
    }
}
