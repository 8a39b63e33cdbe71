//! Shared config utilities for loading/saving JSON config files
//! and resolving credentials from fields or environment variables,
//! plus the top-level `ServiceConfig` persisted to `persona_config.json`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::DeploymentMode;
use crate::tts::interface::{Gender, VoiceConfig};

/// Generic load for any Serde config type with a `Default` implementation.
/// Falls back to `T::default()` if the file is missing or unparsable.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(config) => {
                tracing::info!("[{}] Loaded config from {}", label, path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Failed to parse config {}: {}, using defaults",
                    label,
                    path.display(),
                    e
                );
                T::default()
            }
        },
        Err(_) => {
            tracing::info!(
                "[{}] No config file at {}, using defaults",
                label,
                path.display()
            );
            T::default()
        }
    }
}

/// Generic save for any Serde config type.
pub fn save_json_config<T: Serialize>(
    path: &Path,
    config: &T,
    label: &str,
) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    tracing::info!("[{}] Saved config to {}", label, path.display());
    Ok(())
}

/// Resolve a credential: check the direct field first,
/// then fall back to reading the environment variable named in `env_var`.
pub fn resolve_api_key(api_key: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(ref key) = api_key {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    if let Some(ref env_var) = env_var {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    None
}

fn default_true() -> bool {
    true
}

// ── Server ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Remote TTS provider ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSection {
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    /// Direct API key (takes precedence over env var)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable name to read the API key from
    #[serde(default = "default_tts_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_voice_id")]
    pub voice_id: u32,
    #[serde(default = "default_language")]
    pub language: u32,
    #[serde(default = "default_gender")]
    pub gender: Gender,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_tts_base_url() -> String {
    "https://client.camb.ai/apis".to_string()
}
fn default_tts_key_env() -> Option<String> {
    Some("CAMB_AI_API_KEY".to_string())
}
fn default_voice_id() -> u32 {
    20037
}
fn default_language() -> u32 {
    1
}
fn default_gender() -> Gender {
    Gender::Male
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_max_poll_attempts() -> u32 {
    30
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            base_url: default_tts_base_url(),
            api_key: None,
            api_key_env: default_tts_key_env(),
            voice_id: default_voice_id(),
            language: default_language(),
            gender: default_gender(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TtsSection {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(&self.api_key, &self.api_key_env)
    }

    pub fn voice(&self) -> VoiceConfig {
        VoiceConfig {
            voice_id: self.voice_id,
            language: self.language,
            gender: self.gender,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Language model ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Consulted when the settings store holds no key
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_llm_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".to_string())
}
fn default_llm_retries() -> u32 {
    2
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            max_retries: default_llm_retries(),
        }
    }
}

// ── Settings store ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSection {
    #[serde(default = "default_settings_path")]
    pub file_path: PathBuf,
    /// Forces the deployment mode instead of detecting it from the environment.
    #[serde(default)]
    pub deployment: Option<DeploymentMode>,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("data").join("settings.json")
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            file_path: default_settings_path(),
            deployment: None,
        }
    }
}

// ── Admin ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSection {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_admin_env")]
    pub password_env: Option<String>,
}

fn default_admin_env() -> Option<String> {
    Some("ADMIN_PASSWORD".to_string())
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            password: None,
            password_env: default_admin_env(),
        }
    }
}

impl AdminSection {
    pub fn resolve_secret(&self) -> Option<String> {
        resolve_api_key(&self.password, &self.password_env)
    }
}

// ── Local voice ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVoiceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_language_prefix")]
    pub language_prefix: String,
    /// Case-insensitive fragments matched against engine voice names
    #[serde(default = "default_name_hints")]
    pub name_hints: Vec<String>,
    #[serde(default = "default_unit")]
    pub rate: f32,
    #[serde(default = "default_unit")]
    pub pitch: f32,
    #[serde(default = "default_unit")]
    pub volume: f32,
}

fn default_language_prefix() -> String {
    "en".to_string()
}
fn default_name_hints() -> Vec<String> {
    ["male", "david", "james", "daniel"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_unit() -> f32 {
    1.0
}

impl Default for LocalVoiceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            language_prefix: default_language_prefix(),
            name_hints: default_name_hints(),
            rate: default_unit(),
            pitch: default_unit(),
            volume: default_unit(),
        }
    }
}

// ── Top-Level Service Config ───────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tts: TtsSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub admin: AdminSection,
    #[serde(default)]
    pub local_voice: LocalVoiceSection,
}

/// Load the service config from a JSON file. Falls back to defaults if missing or invalid.
pub fn load_config(path: &Path) -> ServiceConfig {
    load_json_config(path, "Config")
}

/// Save the service config to a JSON file.
pub fn save_config(path: &Path, config: &ServiceConfig) -> Result<(), std::io::Error> {
    save_json_config(path, config, "Config")
}
