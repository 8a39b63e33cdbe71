pub mod auth;
pub mod secret;
pub mod store;

pub use auth::{AdminAuth, AdminToken};
pub use secret::{is_masked, mask_secret, CredentialUpdate, MASK_PREFIX};
pub use store::{
    DeploymentMode, Settings, SettingsEnv, SettingsError, SettingsStore, SettingsUpdate,
    SettingsView, DEFAULT_KNOWLEDGE_BASE,
};
