//! HTTP API: speech synthesis, persona chat, settings and admin login.

mod handlers;


use crate::config::{LlmSection, ServiceConfig};
use crate::settings::{AdminAuth, SettingsStore};
use crate::tts::{CambTaskClient, RemoteSynthesizer};
use reqwest::Client;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

/// JSON bodies above this size are rejected. Sized for short voice clips.
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Everything a request handler needs. Cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub admin: AdminAuth,
    pub tts: Arc<dyn RemoteSynthesizer>,
    pub llm: LlmSection,
    pub http: Client,
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let tts = CambTaskClient::from_config(&config.tts);
        if !tts.is_configured() {
            tracing::warn!("[Server] No TTS provider key configured, /api/tts will fail");
        }
        Self {
            settings: Arc::new(SettingsStore::from_config(config)),
            admin: AdminAuth::from_config(&config.admin),
            tts: Arc::new(tts),
            llm: config.llm.clone(),
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

/// All API routes with CORS and JSON error recovery applied.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let api = warp::path("api");

    let tts = api
        .and(warp::path("tts"))
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::synthesize);

    let settings_get = api
        .and(warp::path!("settings" / "get"))
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_settings);

    let settings_save = api
        .and(warp::path!("settings" / "save"))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::save_settings);

    let auth = api
        .and(warp::path("auth"))
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::login);

    let ask = api
        .and(warp::path("ask"))
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::ask);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);

    tts.or(settings_get)
        .or(settings_save)
        .or(auth)
        .or(ask)
        .with(cors)
        .recover(handlers::handle_rejection)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!("[Server] Listening on http://{}", bound);
    server.await;
    tracing::info!("[Server] Shut down");
    Ok(())
}
