use super::prompt::{persona_system_prompt, AUDIO_ONLY_INSTRUCTION, MODEL_ACKNOWLEDGEMENT};
use crate::config::LlmSection;
use crate::utils::http::request_with_backoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("message or audio is required")]
    EmptyInput,
    #[error("language model API key is not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("model returned no text")]
    EmptyResponse,
}

/// Base64 media sent inline with the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAudio {
    pub mime_type: String,
    pub data: String,
}

/// One visitor turn: typed text, a recording, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AskInput {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub audio: Option<InlineAudio>,
}

impl AskInput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            audio: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty() && self.audio.as_ref().map_or(true, |a| a.data.is_empty())
    }
}

// ── Wire types ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineAudio,
    },
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: impl Into<String>) -> Part {
    Part::Text { text: text.into() }
}

fn turn(role: &str, parts: Vec<Part>) -> Content {
    Content {
        role: Some(role.to_string()),
        parts,
    }
}

// ── Client ─────────────────────────────────────────────

/// Gemini `generateContent` client answering as the persona.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        let defaults = LlmSection::default();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(defaults.model),
            max_retries: defaults.max_retries,
            retry_delay: Duration::from_millis(1000),
        }
    }

    pub fn from_config(section: &LlmSection, api_key: String) -> Self {
        let mut client = Self::new(
            api_key,
            Some(section.base_url.clone()),
            Some(section.model.clone()),
        );
        client.max_retries = section.max_retries;
        client
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn build_contents(knowledge_base: &str, input: &AskInput) -> Vec<Content> {
        let mut parts = Vec::new();
        match &input.audio {
            Some(audio) if !audio.data.is_empty() => {
                parts.push(Part::Inline {
                    inline_data: audio.clone(),
                });
                let message = if input.message.trim().is_empty() {
                    AUDIO_ONLY_INSTRUCTION.to_string()
                } else {
                    input.message.clone()
                };
                parts.push(text_part(message));
            }
            _ => parts.push(text_part(input.message.clone())),
        }

        vec![
            turn("user", vec![text_part(persona_system_prompt(knowledge_base))]),
            turn("model", vec![text_part(MODEL_ACKNOWLEDGEMENT)]),
            turn("user", parts),
        ]
    }

    /// Answer one visitor turn in character, grounded on `knowledge_base`.
    pub async fn ask(&self, knowledge_base: &str, input: &AskInput) -> Result<String, LlmError> {
        if input.is_empty() {
            return Err(LlmError::EmptyInput);
        }
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: Self::build_contents(knowledge_base, input),
        };

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let response = request_with_backoff(
            move || {
                let client = client.clone();
                let url = url.clone();
                let body = body.clone();
                let api_key = api_key.clone();
                async move {
                    client
                        .post(&url)
                        .header(API_KEY_HEADER, api_key)
                        .json(&body)
                        .send()
                        .await
                }
            },
            self.max_retries,
            self.retry_delay,
        )
        .await
        .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!("[LLM] Gemini returned {}: {}", status, message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(text),
                        Part::Inline { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        tracing::debug!("[LLM] Gemini replied with {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: &str) -> GeminiClient {
        GeminiClient::new(key.to_string(), Some(server.uri()), Some("gemini-test".into()))
            .with_client(Client::builder().no_proxy().build().unwrap())
            .with_retry_delay(Duration::from_millis(1))
    }

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }))
    }

    #[test]
    fn test_contents_carry_persona_then_question() {
        let contents = GeminiClient::build_contents("KB", &AskInput::text("Why us?"));
        let json = serde_json::to_value(&contents).unwrap();
        assert_eq!(json[0]["role"], "user");
        assert!(json[0]["parts"][0]["text"].as_str().unwrap().contains("KB"));
        assert_eq!(json[1]["role"], "model");
        assert_eq!(json[2]["parts"][0]["text"], "Why us?");
    }

    #[test]
    fn test_audio_goes_first_with_default_instruction() {
        let input = AskInput {
            message: String::new(),
            audio: Some(InlineAudio {
                mime_type: "audio/webm".into(),
                data: "AAAA".into(),
            }),
        };
        let json = serde_json::to_value(GeminiClient::build_contents("KB", &input)).unwrap();
        assert_eq!(json[2]["parts"][0]["inlineData"]["mimeType"], "audio/webm");
        assert_eq!(json[2]["parts"][1]["text"], AUDIO_ONLY_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_ask_returns_model_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user" }, { "role": "model" }, { "role": "user" }]
            })))
            .respond_with(reply("I led a team of four."))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server, "g-key")
            .ask("KB", &AskInput::text("Tell me about leadership"))
            .await
            .unwrap();
        assert_eq!(answer, "I led a team of four.");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("ok"))
            .mount(&server)
            .await;

        let answer = client_for(&server, "g-key")
            .ask("KB", &AskInput::text("hi"))
            .await
            .unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = client_for(&server, "bad")
            .ask("KB", &AskInput::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_preconditions_fail_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, "g-key");
        assert_eq!(
            client.ask("KB", &AskInput::text("   ")).await,
            Err(LlmError::EmptyInput)
        );
        assert_eq!(
            client_for(&server, "").ask("KB", &AskInput::text("hi")).await,
            Err(LlmError::MissingApiKey)
        );
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, "g-key")
            .ask("KB", &AskInput::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::EmptyResponse);
    }
}
