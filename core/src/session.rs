//! Authentication handshake and session caching.
//!
//! Logging in is a two-step exchange: `getchallenge` hands out a one-time
//! token, and `login` answers with `md5(token + access_key)`. The resulting
//! session name authenticates every other call. Sessions are reused for at
//! most `SESSION_MAX_AGE_SECS`; after that a fresh handshake runs before the
//! next request.

use chrono::{DateTime, Duration, Utc};
use md5::{Digest, Md5};
use tracing::debug;

use crate::adapter::Adapter;
use crate::config::Credentials;
use crate::error::ApiError;
use crate::http::{Form, HttpMethod};
use crate::types::{Challenge, LoginResult};
use crate::WEBSERVICE_PATH;

/// Sessions older than this many seconds are replaced.
pub const SESSION_MAX_AGE_SECS: i64 = 240;

/// A server-issued session and the moment it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_name: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Strictly older than the policy window.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > Duration::seconds(SESSION_MAX_AGE_SECS)
    }
}

/// `md5(token + secret)` as lower-case hex.
pub fn access_key(token: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Owns the credentials and the cached session.
#[derive(Debug, Clone)]
pub struct SessionManager {
    credentials: Credentials,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            session: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The cached session, if it is still inside the policy window.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&Session> {
        self.session.as_ref().filter(|s| !s.is_expired_at(now))
    }

    /// The cached session regardless of age.
    pub fn cached(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Forget the cached session; the next call logs in again.
    pub fn invalidate(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Step one of the handshake: fetch a challenge token.
    pub fn get_token<A: Adapter + ?Sized>(&self, adapter: &A) -> Result<Challenge, ApiError> {
        let endpoint = format!(
            "{WEBSERVICE_PATH}?operation=getchallenge&username={}",
            urlencoding::encode(self.credentials.user())
        );
        let envelope = adapter.request(HttpMethod::Get, self.credentials.host(), &endpoint, None)?;
        serde_json::from_value(envelope.result)
            .map_err(|e| ApiError::UnexpectedPayload(format!("getchallenge result: {e}")))
    }

    /// Step two of the handshake: trade the token for a session.
    pub fn login<A: Adapter + ?Sized>(&self, adapter: &A, token: &str) -> Result<LoginResult, ApiError> {
        let form = Form::new()
            .field("operation", "login")
            .field("username", self.credentials.user())
            .field("accessKey", access_key(token, self.credentials.secret()));
        let envelope = adapter.request(
            HttpMethod::Post,
            self.credentials.host(),
            WEBSERVICE_PATH,
            Some(&form),
        )?;
        serde_json::from_value(envelope.result)
            .map_err(|e| ApiError::UnexpectedPayload(format!("login result: {e}")))
    }

    /// Return a valid session name, running the handshake first when the
    /// cache is empty or stale. The cache is only replaced once both steps
    /// have succeeded.
    pub fn session_at<A: Adapter + ?Sized>(
        &mut self,
        adapter: &A,
        now: DateTime<Utc>,
    ) -> Result<&str, ApiError> {
        if self.current(now).is_some() {
            debug!("reusing cached session");
        } else {
            debug!(
                user = self.credentials.user(),
                had_session = self.session.is_some(),
                "starting login handshake"
            );
            let challenge = self.get_token(adapter)?;
            let login = self.login(adapter, &challenge.token)?;
            self.session = Some(Session {
                session_name: login.session_name,
                user_id: login.user_id,
                created_at: now,
            });
        }

        self.session
            .as_ref()
            .map(|s| s.session_name.as_str())
            .ok_or_else(|| ApiError::UnexpectedPayload("no session after login".to_string()))
    }
}
