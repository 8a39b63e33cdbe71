use super::AppState;
use crate::llm::{AskInput, GeminiClient, LlmError};
use crate::settings::{SettingsError, SettingsUpdate};
use crate::tts::{SynthesisRequest, TtsError};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{json, with_status, Json, WithStatus};

type JsonReply = WithStatus<Json>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_reply(status: StatusCode, message: &str) -> JsonReply {
    with_status(json(&ErrorBody { error: message }), status)
}

fn ok_reply<T: Serialize>(body: &T) -> JsonReply {
    with_status(json(body), StatusCode::OK)
}

// ── /api/tts ───────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct TtsBody {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TtsReply {
    audio_content: String,
    content_type: String,
}

/// Status and public message for a synthesis failure. Internal detail is
/// logged, never returned.
fn tts_failure(error: &TtsError) -> (StatusCode, &'static str) {
    match error {
        TtsError::EmptyInput => (StatusCode::BAD_REQUEST, "Text is required"),
        TtsError::Configuration(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "TTS API key is not configured. Please set CAMB_AI_API_KEY in environment variables.",
        ),
        TtsError::ProviderCreate(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create TTS task")
        }
        TtsError::ProviderTerminal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "TTS task failed"),
        TtsError::ProviderTimeout { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "TTS task timed out")
        }
        TtsError::Fetch(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve TTS result",
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate speech. Please try again.",
        ),
    }
}

pub(super) async fn synthesize(body: TtsBody, state: AppState) -> Result<JsonReply, Infallible> {
    let request = match SynthesisRequest::new(body.text.unwrap_or_default()) {
        Ok(request) => request,
        Err(e) => {
            let (status, message) = tts_failure(&e);
            return Ok(error_reply(status, message));
        }
    };

    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    tracing::debug!(
        "[Server] tts {} started ({} chars)",
        request_id,
        request.text().chars().count()
    );

    match state.tts.synthesize(&request).await {
        Ok(audio) => {
            tracing::info!(
                "[Server] tts {} synthesized {} bytes of {}",
                request_id,
                audio.bytes.len(),
                audio.mime_type
            );
            Ok(ok_reply(&TtsReply {
                audio_content: base64::engine::general_purpose::STANDARD.encode(&audio.bytes),
                content_type: audio.mime_type,
            }))
        }
        Err(e) => {
            tracing::error!("[Server] tts {} failed ({}): {}", request_id, e.kind(), e);
            let (status, message) = tts_failure(&e);
            Ok(error_reply(status, message))
        }
    }
}

// ── /api/settings ──────────────────────────────────────

pub(super) async fn get_settings(state: AppState) -> Result<JsonReply, Infallible> {
    Ok(ok_reply(&state.settings.view().await))
}

pub(super) async fn save_settings(
    authorization: Option<String>,
    update: SettingsUpdate,
    state: AppState,
) -> Result<JsonReply, Infallible> {
    let token = match state.admin.verify_bearer(authorization.as_deref()) {
        Ok(token) => token,
        Err(_) => {
            tracing::warn!("[Server] Rejected settings save without valid admin token");
            return Ok(error_reply(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    };

    match state.settings.save(&token, update).await {
        Ok(_) => Ok(ok_reply(&serde_json::json!({ "success": true }))),
        Err(SettingsError::Unauthorized) => {
            Ok(error_reply(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        Err(e) => {
            tracing::error!("[Server] Settings save failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save settings",
            ))
        }
    }
}

// ── /api/auth ──────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct LoginBody {
    #[serde(default)]
    password: String,
}

pub(super) async fn login(body: LoginBody, state: AppState) -> Result<JsonReply, Infallible> {
    match state.admin.login(&body.password) {
        Ok(token) => Ok(ok_reply(&serde_json::json!({
            "success": true,
            "token": token,
        }))),
        Err(_) => Ok(error_reply(StatusCode::UNAUTHORIZED, "Invalid password")),
    }
}

// ── /api/ask ───────────────────────────────────────────

pub(super) async fn ask(input: AskInput, state: AppState) -> Result<JsonReply, Infallible> {
    if input.is_empty() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "Message or audio is required",
        ));
    }

    let settings = state.settings.for_model().await;
    let client = GeminiClient::from_config(&state.llm, settings.gemini_api_key)
        .with_client(state.http.clone());
    match client.ask(&settings.knowledge_base, &input).await {
        Ok(response) => Ok(ok_reply(&serde_json::json!({ "response": response }))),
        Err(LlmError::MissingApiKey) => Ok(error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Gemini API key is not configured. Please set it in the admin panel.",
        )),
        Err(LlmError::EmptyInput) => Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "Message or audio is required",
        )),
        Err(e) => {
            tracing::error!("[Server] /api/ask failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process your request. Please try again.",
            ))
        }
    }
}

// ── Rejections ─────────────────────────────────────────

pub(super) async fn handle_rejection(err: warp::Rejection) -> Result<JsonReply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a JSON body")
    } else {
        tracing::error!("[Server] Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(error_reply(status, message))
}
