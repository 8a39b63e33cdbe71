use super::auth::AdminToken;
use super::secret::{mask_secret, CredentialUpdate};
use crate::config::{save_json_config, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Knowledge base served when nothing has been configured anywhere.
pub const DEFAULT_KNOWLEDGE_BASE: &str = "No knowledge base has been configured yet. \
An administrator can add one from the settings page; until then, answer that \
the information is not available.";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("failed to persist settings to {path}: {message}")]
    PersistenceWrite { path: PathBuf, message: String },
    #[error("failed to read settings from {path}: {message}")]
    Read { path: PathBuf, message: String },
}

// ── Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Ephemeral host: no filesystem, env vars are the only durable source.
    Serverless,
    /// Long-lived process with a writable settings file.
    Local,
}

impl DeploymentMode {
    /// Precedence: explicit override variable, then config, then host detection.
    pub fn detect(env: &SettingsEnv, configured: Option<DeploymentMode>) -> Self {
        if let Some(mode) = env.deployment_override {
            return mode;
        }
        if let Some(mode) = configured {
            return mode;
        }
        if env.serverless_host {
            DeploymentMode::Serverless
        } else {
            DeploymentMode::Local
        }
    }
}

/// Process-wide settings. Persisted wholesale in this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub knowledge_base: String,
    #[serde(default)]
    pub gemini_api_key: String,
}

/// Settings as shown to untrusted readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub knowledge_base: String,
    pub has_api_key: bool,
    pub gemini_api_key: String,
}

impl From<&Settings> for SettingsView {
    fn from(settings: &Settings) -> Self {
        Self {
            knowledge_base: settings.knowledge_base.clone(),
            has_api_key: !settings.gemini_api_key.is_empty(),
            gemini_api_key: mask_secret(&settings.gemini_api_key),
        }
    }
}

/// Partial update submitted by an administrator. Omitted fields keep their
/// current value; the credential goes through [`CredentialUpdate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub knowledge_base: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
}

impl SettingsUpdate {
    pub fn apply(self, current: &Settings) -> Settings {
        let credential = CredentialUpdate::from_submitted(self.gemini_api_key.as_deref());
        Settings {
            knowledge_base: self
                .knowledge_base
                .unwrap_or_else(|| current.knowledge_base.clone()),
            gemini_api_key: credential.apply(&current.gemini_api_key),
        }
    }
}

/// Snapshot of the environment variables the store consults.
#[derive(Debug, Clone, Default)]
pub struct SettingsEnv {
    pub serverless_host: bool,
    pub deployment_override: Option<DeploymentMode>,
    pub knowledge_base: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl SettingsEnv {
    /// `key_env` names the variable holding the model credential.
    pub fn from_lookup<F>(lookup: F, key_env: Option<&str>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let deployment_override = non_empty("PERSONA_DEPLOYMENT").and_then(|v| {
            match v.to_ascii_lowercase().as_str() {
                "serverless" => Some(DeploymentMode::Serverless),
                "local" => Some(DeploymentMode::Local),
                other => {
                    tracing::warn!("[Settings] Ignoring unknown PERSONA_DEPLOYMENT={}", other);
                    None
                }
            }
        });

        Self {
            serverless_host: lookup("VERCEL").as_deref() == Some("1")
                || lookup("VERCEL_ENV").is_some(),
            deployment_override,
            knowledge_base: non_empty("KNOWLEDGE_BASE"),
            gemini_api_key: key_env.and_then(non_empty),
        }
    }

    pub fn from_process(key_env: Option<&str>) -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), key_env)
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_lookup(|name| vars.get(name).cloned(), Some("GEMINI_API_KEY"))
    }
}

// ── Store ──────────────────────────────────────────────

/// Settings singleton with cache > (env | file) > defaults resolution.
///
/// Serverless: cache → env → defaults, the file is never touched.
/// Local:      cache → file → env → defaults, the file is created on first save.
pub struct SettingsStore {
    mode: DeploymentMode,
    file_path: PathBuf,
    env: SettingsEnv,
    cache: RwLock<Option<Settings>>,
}

impl SettingsStore {
    pub fn new(mode: DeploymentMode, file_path: impl Into<PathBuf>, env: SettingsEnv) -> Self {
        Self {
            mode,
            file_path: file_path.into(),
            env,
            cache: RwLock::new(None),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let env = SettingsEnv::from_process(config.llm.api_key_env.as_deref());
        let mode = DeploymentMode::detect(&env, config.settings.deployment);
        tracing::info!("[Settings] Deployment mode: {:?}", mode);
        Self::new(mode, config.settings.file_path.clone(), env)
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Effective settings. Never fails; unreadable sources fall through.
    pub async fn get(&self) -> Settings {
        // Held across the file read so a concurrent save cannot be observed half-written.
        let cache = self.cache.read().await;
        match cache.as_ref() {
            Some(cached) => cached.clone(),
            None => self.load_uncached().await,
        }
    }

    /// Settings as the chat path uses them: blank stored fields are filled
    /// from the environment snapshot, then defaults.
    pub async fn for_model(&self) -> Settings {
        let settings = self.get().await;
        let fallback = self.env_or_defaults();
        Settings {
            knowledge_base: if settings.knowledge_base.trim().is_empty() {
                fallback.knowledge_base
            } else {
                settings.knowledge_base
            },
            gemini_api_key: if settings.gemini_api_key.is_empty() {
                fallback.gemini_api_key
            } else {
                settings.gemini_api_key
            },
        }
    }

    pub async fn view(&self) -> SettingsView {
        SettingsView::from(&self.get().await)
    }

    /// Merge `update` into the effective settings and make it visible to
    /// every later `get` in this process. In local mode the merged settings
    /// are also written to disk; a write failure is returned but the cache
    /// keeps the new value.
    pub async fn save(
        &self,
        _admin: &AdminToken,
        update: SettingsUpdate,
    ) -> Result<Settings, SettingsError> {
        let mut cache = self.cache.write().await;
        let current = match cache.as_ref() {
            Some(cached) => cached.clone(),
            None => self.load_uncached().await,
        };
        let merged = update.apply(&current);
        *cache = Some(merged.clone());

        match self.mode {
            DeploymentMode::Serverless => {
                tracing::info!(
                    "[Settings] Serverless mode: settings cached in memory only, \
                     update environment variables to persist them"
                );
            }
            DeploymentMode::Local => {
                let path = self.file_path.clone();
                let settings = merged.clone();
                let written = tokio::task::spawn_blocking(move || {
                    save_json_config(&path, &settings, "Settings").map_err(|e| e.to_string())
                })
                .await
                .unwrap_or_else(|e| Err(e.to_string()));
                written.map_err(|message| {
                    tracing::error!(
                        "[Settings] Failed to write {}: {}",
                        self.file_path.display(),
                        message
                    );
                    SettingsError::PersistenceWrite {
                        path: self.file_path.clone(),
                        message,
                    }
                })?;
            }
        }
        Ok(merged)
    }

    /// Drop the in-memory cache, as a fresh process would start.
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }

    async fn load_uncached(&self) -> Settings {
        if self.mode == DeploymentMode::Local {
            match self.read_file().await {
                Ok(Some(settings)) => return settings,
                Ok(None) => {}
                Err(e) => tracing::error!("[Settings] {}", e),
            }
        }
        self.env_or_defaults()
    }

    async fn read_file(&self) -> Result<Option<Settings>, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SettingsError::Read {
                    path: self.file_path.clone(),
                    message: e.to_string(),
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SettingsError::Read {
                path: self.file_path.clone(),
                message: e.to_string(),
            })
    }

    fn env_or_defaults(&self) -> Settings {
        Settings {
            knowledge_base: self
                .env
                .knowledge_base
                .clone()
                .unwrap_or_else(|| DEFAULT_KNOWLEDGE_BASE.to_string()),
            gemini_api_key: self.env.gemini_api_key.clone().unwrap_or_default(),
        }
    }
}
