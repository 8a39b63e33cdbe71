use super::store::SettingsError;
use crate::config::AdminSection;

/// Proof that the caller presented the administrative secret. Only
/// [`AdminAuth`] can produce one.
#[derive(Debug)]
pub struct AdminToken {
    _private: (),
}

/// Checks the administrative secret. With no secret configured every check
/// fails; there is no built-in fallback password.
#[derive(Clone)]
pub struct AdminAuth {
    secret: Option<String>,
}

impl AdminAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn from_config(section: &AdminSection) -> Self {
        let auth = Self::new(section.resolve_secret());
        if !auth.is_configured() {
            tracing::warn!("[Settings] No admin secret configured, settings cannot be changed");
        }
        auth
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Exchange the password for the bearer token used on later admin calls.
    pub fn login(&self, password: &str) -> Result<String, SettingsError> {
        self.check(password)?;
        Ok(password.to_string())
    }

    /// Validate an `Authorization: Bearer <secret>` header value.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<AdminToken, SettingsError> {
        let presented = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(SettingsError::Unauthorized)?;
        self.check(presented)?;
        Ok(AdminToken { _private: () })
    }

    fn check(&self, presented: &str) -> Result<(), SettingsError> {
        match &self.secret {
            Some(secret) if constant_time_eq(secret.as_bytes(), presented.as_bytes()) => Ok(()),
            _ => Err(SettingsError::Unauthorized),
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
