//! Connection credentials.
//!
//! `Credentials` is immutable once built. The secret is the user's
//! web-service access key (vtiger: "My Preferences" > "Access Key"), not the
//! login password.

use std::fmt;

use serde::Deserialize;

use crate::error::ApiError;

/// Environment variable holding the CRM base URL.
pub const HOST_VAR: &str = "VTIGER_HOST";
/// Environment variable holding the web-service user name.
pub const USER_VAR: &str = "VTIGER_USER";
/// Environment variable holding the user's access key.
pub const ACCESS_KEY_VAR: &str = "VTIGER_ACCESS_KEY";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    host: String,
    user: String,
    secret: String,
}

impl Credentials {
    pub fn new(host: impl Into<String>, user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Read `VTIGER_HOST`, `VTIGER_USER` and `VTIGER_ACCESS_KEY`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let var = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Config(format!("{name} is not set")))
        };
        Ok(Self::new(var(HOST_VAR)?, var(USER_VAR)?, var(ACCESS_KEY_VAR)?))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("https://crm.example.com", "admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn lookup_reads_all_three_variables() {
        let env: HashMap<&str, &str> = [
            (HOST_VAR, "https://crm.example.com"),
            (USER_VAR, "admin"),
            (ACCESS_KEY_VAR, "k3y"),
        ]
        .into_iter()
        .collect();
        let creds = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(creds, Credentials::new("https://crm.example.com", "admin", "k3y"));
    }

    #[test]
    fn missing_variable_is_a_config_error() {
        let err = Credentials::from_lookup(|name| (name == HOST_VAR).then(|| "http://h".to_string())).unwrap_err();
        assert!(matches!(err, ApiError::Config(ref msg) if msg.contains(USER_VAR)));
    }

    #[test]
    fn deserializes_from_json() {
        let creds: Credentials =
            serde_json::from_str(r#"{"host":"http://h","user":"u","secret":"s"}"#).unwrap();
        assert_eq!(creds.user(), "u");
        assert_eq!(creds.secret(), "s");
    }
}
