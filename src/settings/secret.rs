//! Display masking for stored credentials and decoding of submitted values.

/// Shown in place of a stored credential. The real value's last four
/// characters may follow it.
pub const MASK_PREFIX: &str = "••••••••";

const VISIBLE_SUFFIX: usize = 4;

/// Mask `secret` for display. Keys too short to hide most of their
/// characters reveal nothing beyond the prefix.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let count = secret.chars().count();
    if count <= MASK_PREFIX.chars().count() {
        return MASK_PREFIX.to_string();
    }
    let suffix: String = secret.chars().skip(count - VISIBLE_SUFFIX).collect();
    format!("{}{}", MASK_PREFIX, suffix)
}

/// Whether `value` has the shape produced by [`mask_secret`].
pub fn is_masked(value: &str) -> bool {
    value
        .strip_prefix(MASK_PREFIX)
        .is_some_and(|rest| rest.chars().count() <= VISIBLE_SUFFIX)
}

/// What a submitted credential field asks the store to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialUpdate {
    /// Field omitted, or the masked value echoed back from a read.
    Unchanged,
    Clear,
    Set(String),
}

impl CredentialUpdate {
    pub fn from_submitted(value: Option<&str>) -> Self {
        match value {
            None => CredentialUpdate::Unchanged,
            Some(v) if is_masked(v) => CredentialUpdate::Unchanged,
            Some(v) if v.trim().is_empty() => CredentialUpdate::Clear,
            Some(v) => CredentialUpdate::Set(v.trim().to_string()),
        }
    }

    pub fn apply(self, current: &str) -> String {
        match self {
            CredentialUpdate::Unchanged => current.to_string(),
            CredentialUpdate::Clear => String::new(),
            CredentialUpdate::Set(value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mask_shows_last_four() {
        assert_eq!(mask_secret("AIzaSyExample1234"), "••••••••1234");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_short_keys_reveal_nothing() {
        assert_eq!(mask_secret("abcd"), MASK_PREFIX);
        assert_eq!(mask_secret("12345678"), MASK_PREFIX);
    }

    #[test]
    fn test_masked_sentinel_means_unchanged() {
        assert_eq!(
            CredentialUpdate::from_submitted(Some("••••••••1234")),
            CredentialUpdate::Unchanged
        );
        assert_eq!(
            CredentialUpdate::from_submitted(Some(MASK_PREFIX)),
            CredentialUpdate::Unchanged
        );
        assert_eq!(CredentialUpdate::from_submitted(None), CredentialUpdate::Unchanged);
        assert_eq!(CredentialUpdate::from_submitted(Some("  ")), CredentialUpdate::Clear);
    }

    #[test]
    fn test_prefix_with_long_tail_is_a_real_value() {
        let value = format!("{}not-a-mask", MASK_PREFIX);
        assert_eq!(
            CredentialUpdate::from_submitted(Some(&value)),
            CredentialUpdate::Set(value.clone())
        );
    }

    #[test]
    fn test_apply_keeps_or_replaces() {
        assert_eq!(CredentialUpdate::Unchanged.apply("old"), "old");
        assert_eq!(CredentialUpdate::Clear.apply("old"), "");
        assert_eq!(CredentialUpdate::Set("new".into()).apply("old"), "new");
    }

    proptest! {
        #[test]
        fn test_echoed_mask_never_overwrites(key in "[A-Za-z0-9_-]{1,64}") {
            let masked = mask_secret(&key);
            prop_assert!(is_masked(&masked));
            prop_assert_eq!(CredentialUpdate::from_submitted(Some(&masked)).apply(&key), key);
        }

        #[test]
        fn test_mask_hides_most_of_the_key(key in "[A-Za-z0-9]{9,64}") {
            let masked = mask_secret(&key);
            let visible = masked.strip_prefix(MASK_PREFIX).unwrap_or("");
            prop_assert_eq!(visible.len(), VISIBLE_SUFFIX);
            prop_assert!(key.ends_with(visible));
        }
    }
}
