//! Static credential gate in front of the dashboard.
//!
//! This is a convenience lock for shared consoles, not a security boundary:
//! the login record is a plain JSON value in the key-value store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, StorageError};
use crate::registry::KeyValueStore;

/// Storage key of the login record
pub const AUTH_SESSION_KEY: &str = "auth_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub username: String,
    pub login_time: DateTime<Utc>,
}

pub struct AuthGate {
    store: Arc<dyn KeyValueStore>,
    credentials: Option<(String, String)>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &AuthConfig) -> Self {
        let credentials = config
            .credentials()
            .map(|(user, pass)| (user.to_string(), pass.to_string()));
        Self { store, credentials }
    }

    /// Whether credentials are configured at all
    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AuthUser, AuthError> {
        let username = username.trim();
        if let Some((expected_user, expected_pass)) = &self.credentials {
            if username != expected_user || password != expected_pass {
                warn!(username = %username, "Rejected login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let user = AuthUser {
            username: username.to_string(),
            login_time: Utc::now(),
        };
        let encoded = serde_json::to_string(&user).map_err(StorageError::from)?;
        self.store.set(AUTH_SESSION_KEY, &encoded)?;

        info!(username = %user.username, "Logged in");
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.remove(AUTH_SESSION_KEY)?;
        info!("Logged out");
        Ok(())
    }

    /// Decoded login record; unreadable records count as logged out
    pub fn current_user(&self) -> Option<AuthUser> {
        let raw = self.store.get(AUTH_SESSION_KEY).ok().flatten()?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored login record is malformed");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.is_enabled() || self.current_user().is_some()
    }

    /// Fail unless the gate is open or someone is logged in
    pub fn require(&self) -> Result<Option<AuthUser>, AuthError> {
        match self.current_user() {
            Some(user) => Ok(Some(user)),
            None if !self.is_enabled() => Ok(None),
            None => Err(AuthError::NotLoggedIn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryStore;

    fn gate(with_credentials: bool) -> (AuthGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = if with_credentials {
            AuthConfig {
                username: Some("ops".to_string()),
                password: Some("secret".to_string()),
            }
        } else {
            AuthConfig::default()
        };
        (AuthGate::new(store.clone(), &config), store)
    }

    #[test]
    fn test_open_gate_without_credentials() {
        let (gate, _) = gate(false);
        assert!(!gate.is_enabled());
        assert!(gate.is_authenticated());
        assert_eq!(gate.require().unwrap(), None);
    }

    #[test]
    fn test_login_and_logout() {
        let (gate, store) = gate(true);
        assert!(matches!(gate.require(), Err(AuthError::NotLoggedIn)));

        let user = gate.login(" ops ", "secret").unwrap();
        assert_eq!(user.username, "ops");
        assert_eq!(gate.current_user(), Some(user.clone()));
        assert!(store.get(AUTH_SESSION_KEY).unwrap().unwrap().contains("loginTime"));

        gate.logout().unwrap();
        assert!(gate.current_user().is_none());
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let (gate, store) = gate(true);
        assert!(matches!(
            gate.login("ops", "nope"),
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(store.get(AUTH_SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_malformed_record_is_logged_out() {
        let (gate, store) = gate(true);
        store.set(AUTH_SESSION_KEY, "not json").unwrap();
        assert!(gate.current_user().is_none());
    }
}
