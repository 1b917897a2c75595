//! Wire DTOs for the vtiger web service.
//!
//! Every response is wrapped in an `Envelope`. The handshake payloads get
//! their own types; entity and query payloads stay `serde_json::Value`
//! because their shape depends on the CRM module, and callers convert them
//! with `Envelope::into_result`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// The `{success, result}` object returned for every operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub result: Value,
}

impl Envelope {
    /// Decode `result` into a caller-chosen type.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.result)?)
    }
}

/// `result` of `getchallenge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<i64>,
}

/// `result` of `login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub session_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtiger_version: Option<String>,
}

/// `error` object carried by failure envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// `result` of `listtypes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeList {
    pub types: Vec<String>,
    #[serde(default)]
    pub information: serde_json::Map<String, Value>,
}
