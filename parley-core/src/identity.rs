//! Logged-in identity.
//!
//! The identity is an opaque email string used as the owner key for chats.
//! Without one, no chat operation is available.

use crate::config::{AuthConfig, IdentityConfig};
use crate::error::{Error, Result};

/// Supplies the currently logged-in user, if any.
pub trait IdentityProvider {
    fn current_user(&self) -> Option<String>;
}

/// Identity fixed at startup (from config or a command-line flag).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    email: Option<String>,
}

impl StaticIdentity {
    pub fn new(email: Option<String>) -> Self {
        Self {
            email: email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self { email: None }
    }
}

impl From<&IdentityConfig> for StaticIdentity {
    fn from(config: &IdentityConfig) -> Self {
        Self::new(config.email.clone())
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.email.clone()
    }
}

/// Resolve the identity a session may run as.
pub fn authenticate(provider: &dyn IdentityProvider, auth: &AuthConfig) -> Result<String> {
    let Some(email) = provider.current_user() else {
        tracing::warn!("No logged-in identity");
        return Err(Error::NotAuthenticated);
    };

    if !auth.allows(&email) {
        tracing::warn!(email = %email, "Identity is not on the allow-list");
        return Err(Error::NotAuthenticated);
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_email_is_anonymous() {
        let identity = StaticIdentity::new(Some("   ".to_string()));
        assert!(identity.current_user().is_none());
    }

    #[test]
    fn test_authenticate() {
        let auth = AuthConfig::default();
        let identity = StaticIdentity::new(Some("a@x.com".to_string()));
        assert_eq!(authenticate(&identity, &auth).unwrap(), "a@x.com");

        let err = authenticate(&StaticIdentity::anonymous(), &auth).unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[test]
    fn test_authenticate_respects_allow_list() {
        let auth = AuthConfig {
            allowed_emails: vec!["owner@x.com".to_string()],
        };
        let stranger = StaticIdentity::new(Some("stranger@x.com".to_string()));
        assert!(authenticate(&stranger, &auth).is_err());

        let owner = StaticIdentity::new(Some("owner@x.com".to_string()));
        assert!(authenticate(&owner, &auth).is_ok());
    }
}
