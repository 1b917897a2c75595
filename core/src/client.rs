//! The web-service facade.
//!
//! # Design
//! `VtigerClient` owns its adapter, its credentials (through the session
//! manager) and a clock. Each public operation resolves a session first,
//! which may cost a `getchallenge` + `login` round trip, then issues exactly
//! one request for the operation itself. Every operation returns the whole
//! validated `Envelope`; use `Envelope::into_result` for a typed `result`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::adapter::Adapter;
use crate::config::Credentials;
use crate::error::ApiError;
use crate::http::{Form, HttpMethod};
use crate::query::Query;
use crate::session::SessionManager;
use crate::types::Envelope;
use crate::WEBSERVICE_PATH;

/// Source of "now" for session expiry.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct VtigerClient<A> {
    adapter: A,
    sessions: SessionManager,
    clock: Clock,
}

impl<A: Adapter> VtigerClient<A> {
    pub fn new(
        adapter: A,
        host: impl Into<String>,
        user: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self::with_credentials(adapter, Credentials::new(host, user, secret))
    }

    pub fn with_credentials(adapter: A, credentials: Credentials) -> Self {
        Self {
            adapter,
            sessions: SessionManager::new(credentials),
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to drive session expiry in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// A session name no older than the policy window, logging in if needed.
    pub fn session(&mut self) -> Result<String, ApiError> {
        let now = (self.clock)();
        self.sessions
            .session_at(&self.adapter, now)
            .map(str::to_string)
    }

    /// `listtypes`: the modules visible to the user.
    pub fn get_types(&mut self) -> Result<Envelope, ApiError> {
        let session = self.session()?;
        self.get(&format!(
            "{WEBSERVICE_PATH}?operation=listtypes&sessionName={}",
            urlencoding::encode(&session)
        ))
    }

    /// `describe`: field metadata for one module.
    pub fn describe(&mut self, element_type: &str) -> Result<Envelope, ApiError> {
        let session = self.session()?;
        self.get(&format!(
            "{WEBSERVICE_PATH}?operation=describe&sessionName={}&elementType={}",
            urlencoding::encode(&session),
            urlencoding::encode(element_type)
        ))
    }

    /// `create`: store a new record of `element_type`.
    pub fn create<T: Serialize + ?Sized>(
        &mut self,
        element_type: &str,
        entity: &T,
    ) -> Result<Envelope, ApiError> {
        let element = serde_json::to_string(entity)?;
        let session = self.session()?;
        self.post(
            Form::new()
                .field("operation", "create")
                .field("sessionName", session)
                .field("element", element)
                .field("elementType", element_type),
        )
    }

    /// `retrieve`: fetch one record by its `NxM` id.
    pub fn read(&mut self, id: &str) -> Result<Envelope, ApiError> {
        let session = self.session()?;
        self.get(&format!(
            "{WEBSERVICE_PATH}?operation=retrieve&sessionName={}&id={}",
            urlencoding::encode(&session),
            urlencoding::encode(id)
        ))
    }

    /// `update`: replace a record. The entity must carry its `id`.
    pub fn update<T: Serialize + ?Sized>(&mut self, entity: &T) -> Result<Envelope, ApiError> {
        let value = serde_json::to_value(entity)?;
        if let Value::Object(map) = &value {
            if !map.contains_key("id") {
                return Err(ApiError::InvalidEntity("update requires an `id` field".to_string()));
            }
        }
        let element = serde_json::to_string(&value)?;
        let session = self.session()?;
        self.post(
            Form::new()
                .field("operation", "update")
                .field("sessionName", session)
                .field("element", element),
        )
    }

    /// `delete`: remove a record by id.
    pub fn delete(&mut self, id: &str) -> Result<Envelope, ApiError> {
        let session = self.session()?;
        self.post(
            Form::new()
                .field("operation", "delete")
                .field("sessionName", session)
                .field("id", id),
        )
    }

    /// `query`: run a SELECT statement.
    pub fn query(&mut self, query: &Query) -> Result<Envelope, ApiError> {
        let session = self.session()?;
        debug!(module = query.module(), "running query");
        self.get(&format!(
            "{WEBSERVICE_PATH}?operation=query&sessionName={}&query={}",
            urlencoding::encode(&session),
            query.encoded()
        ))
    }

    /// `logout`: end the current session on the server and drop it locally.
    ///
    /// Returns `Ok(None)` without any request when there is no live session.
    pub fn logout(&mut self) -> Result<Option<Envelope>, ApiError> {
        let now = (self.clock)();
        let Some(session) = self.sessions.current(now).map(|s| s.session_name.clone()) else {
            self.sessions.invalidate();
            return Ok(None);
        };
        let envelope = self.post(
            Form::new()
                .field("operation", "logout")
                .field("sessionName", session),
        )?;
        self.sessions.invalidate();
        Ok(Some(envelope))
    }

    fn get(&self, endpoint: &str) -> Result<Envelope, ApiError> {
        let host = self.sessions.credentials().host();
        self.adapter.request(HttpMethod::Get, host, endpoint, None)
    }

    fn post(&self, form: Form) -> Result<Envelope, ApiError> {
        let host = self.sessions.credentials().host();
        self.adapter
            .request(HttpMethod::Post, host, WEBSERVICE_PATH, Some(&form))
    }
}

impl<A> fmt::Debug for VtigerClient<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VtigerClient")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
