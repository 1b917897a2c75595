//! The transport capability the client delegates every request to.
//!
//! # Design
//! An adapter receives `(method, host, endpoint, form)` and must return a
//! validated `Envelope` or fail. The pipeline is split into three steps so
//! alternative adapters can reuse the parts they do not replace:
//!
//! 1. `HttpRequest::build` shapes the request as plain data.
//! 2. The adapter performs the round trip.
//! 3. `decode` + `validate` turn the `HttpResponse` into an `Envelope`.
//!
//! A body that is not JSON is not a transport error: it is reported as
//! `InvalidResponse` with the raw text, the same as `success: false`.

use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;
use crate::http::{Form, HttpMethod, HttpResponse};
use crate::types::{Envelope, ServerError};

#[cfg(feature = "transport")]
pub use self::ureq_adapter::UreqAdapter;

/// Issue one request against the web service.
pub trait Adapter {
    fn request(
        &self,
        method: HttpMethod,
        host: &str,
        endpoint: &str,
        form: Option<&Form>,
    ) -> Result<Envelope, ApiError>;
}

impl<A: Adapter + ?Sized> Adapter for &A {
    fn request(
        &self,
        method: HttpMethod,
        host: &str,
        endpoint: &str,
        form: Option<&Form>,
    ) -> Result<Envelope, ApiError> {
        (**self).request(method, host, endpoint, form)
    }
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn request(
        &self,
        method: HttpMethod,
        host: &str,
        endpoint: &str,
        form: Option<&Form>,
    ) -> Result<Envelope, ApiError> {
        (**self).request(method, host, endpoint, form)
    }
}

/// Decode the body as JSON. `None` when it is not JSON at all.
pub fn decode(response: &HttpResponse) -> Option<Value> {
    serde_json::from_str(&response.body).ok()
}

/// Accept only `{"success": true, "result": <non-null>}`.
pub fn validate(data: Option<Value>, response: &HttpResponse) -> Result<Envelope, ApiError> {
    let Some(Value::Object(mut map)) = data else {
        return Err(invalid(None, response));
    };

    let success = map.get("success").and_then(Value::as_bool) == Some(true);
    let result = map.remove("result").filter(|r| !r.is_null());

    match result {
        Some(result) if success => Ok(Envelope { success, result }),
        _ => {
            let server_error = map
                .remove("error")
                .and_then(|e| serde_json::from_value::<ServerError>(e).ok());
            Err(invalid(server_error, response))
        }
    }
}

/// `decode` followed by `validate`.
pub fn parse_envelope(response: &HttpResponse) -> Result<Envelope, ApiError> {
    validate(decode(response), response)
}

fn invalid(server_error: Option<ServerError>, response: &HttpResponse) -> ApiError {
    let (code, message) = match server_error {
        Some(e) => (Some(e.code), Some(e.message).filter(|m| !m.is_empty())),
        None => (None, None),
    };
    warn!(
        status = response.status,
        code = code.as_deref().unwrap_or("-"),
        "web service rejected request"
    );
    ApiError::InvalidResponse {
        code,
        message,
        raw: response.body.clone(),
    }
}

#[cfg(feature = "transport")]
mod ureq_adapter {
    use std::time::Duration;

    use tracing::debug;

    use super::{parse_envelope, Adapter};
    use crate::error::ApiError;
    use crate::http::{Form, HttpMethod, HttpRequest, HttpResponse};
    use crate::types::Envelope;

    /// HTTP request timeout in seconds.
    const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Blocking adapter backed by a `ureq` agent.
    ///
    /// Status codes are returned as data rather than errors: the web service
    /// reports failures inside the envelope, and a non-JSON error page is
    /// still surfaced as `InvalidResponse` with its body.
    #[derive(Clone)]
    pub struct UreqAdapter {
        agent: ureq::Agent,
    }

    impl UreqAdapter {
        pub fn new() -> Self {
            Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        }

        pub fn with_timeout(timeout: Duration) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(Some(timeout))
                .build()
                .new_agent();
            Self { agent }
        }

        /// Wrap an agent configured by the caller (proxies, TLS roots, ...).
        pub fn from_agent(agent: ureq::Agent) -> Self {
            Self { agent }
        }

        /// Execute a plain-data request.
        pub fn send(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
            let result = match (req.method, req.body.as_deref()) {
                (HttpMethod::Get, _) => {
                    let mut builder = self.agent.get(&req.url);
                    for (name, value) in &req.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    builder.call()
                }
                (HttpMethod::Post, Some(body)) => {
                    let mut builder = self.agent.post(&req.url);
                    for (name, value) in &req.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    builder.send(body.as_bytes())
                }
                (HttpMethod::Post, None) => self.agent.post(&req.url).send_empty(),
            };
            let mut response = result.map_err(ApiError::transport)?;

            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(ApiError::transport)?;

            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body,
            })
        }
    }

    impl Default for UreqAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Adapter for UreqAdapter {
        fn request(
            &self,
            method: HttpMethod,
            host: &str,
            endpoint: &str,
            form: Option<&Form>,
        ) -> Result<Envelope, ApiError> {
            let req = HttpRequest::build(method, host, endpoint, form);
            let path = req.url.split('?').next().unwrap_or_default();
            debug!(%method, url = path, "sending web service request");
            let response = self.send(&req)?;
            debug!(status = response.status, bytes = response.body.len(), "web service responded");
            parse_envelope(&response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn successful_envelope_is_returned() {
        let envelope = parse_envelope(&response(r#"{"success":true,"result":{"token":"abc"}}"#)).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.result["token"], "abc");
    }

    #[test]
    fn empty_array_result_is_still_present() {
        let envelope = parse_envelope(&response(r#"{"success":true,"result":[]}"#)).unwrap();
        assert_eq!(envelope.result, serde_json::json!([]));
    }

    #[test]
    fn success_false_is_rejected_with_server_error() {
        let body = r#"{"success":false,"error":{"code":"INVALID_SESSIONID","message":"Session Identifier provided is Invalid"}}"#;
        let err = parse_envelope(&response(body)).unwrap_err();
        match err {
            ApiError::InvalidResponse { code, message, raw } => {
                assert_eq!(code.as_deref(), Some("INVALID_SESSIONID"));
                assert_eq!(message.as_deref(), Some("Session Identifier provided is Invalid"));
                assert_eq!(raw, body);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truthy_but_not_true_success_is_rejected() {
        let err = parse_envelope(&response(r#"{"success":1,"result":{}}"#)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { code: None, .. }));
    }

    #[test]
    fn missing_or_null_result_is_rejected() {
        for body in [r#"{"success":true}"#, r#"{"success":true,"result":null}"#] {
            let err = parse_envelope(&response(body)).unwrap_err();
            assert!(matches!(err, ApiError::InvalidResponse { .. }), "{body}");
        }
    }

    #[test]
    fn non_json_body_is_invalid_response() {
        let err = parse_envelope(&HttpResponse {
            status: 502,
            headers: Vec::new(),
            body: "<html>Bad Gateway</html>".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { ref raw, .. } if raw.contains("Bad Gateway")));
    }

    #[test]
    fn json_that_is_not_an_object_is_rejected() {
        let err = parse_envelope(&response("[true]")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { .. }));
    }
}
