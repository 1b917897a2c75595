//! HTTP transport types for the vtiger web service.
//!
//! # Design
//! Requests are described as plain data before any I/O happens. An
//! `Adapter` turns the `(method, host, endpoint, form)` tuple the client
//! hands it into an `HttpRequest`, executes it however it likes, and hands
//! the resulting `HttpResponse` to the shared decode/validate pipeline in
//! `adapter`. Keeping the request shape in one place means every adapter
//! (including test doubles) produces byte-identical requests.

use std::fmt;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP method for a request. The web service only speaks GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered form fields for a POST body.
///
/// Insertion order is preserved so the encoded body is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: Vec<(String, String)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, builder style.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Look up the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as `application/x-www-form-urlencoded`.
    pub fn encode(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Assemble a request from the adapter contract's arguments.
    ///
    /// The URL is `host` (trailing slashes stripped) followed by `endpoint`.
    /// A non-empty form becomes a url-encoded body; an absent or empty form
    /// produces a request without a body, whatever the method.
    pub fn build(method: HttpMethod, host: &str, endpoint: &str, form: Option<&Form>) -> Self {
        let url = format!("{}{}", host.trim_end_matches('/'), endpoint);
        match form.filter(|f| !f.is_empty()) {
            Some(form) => HttpRequest {
                method,
                url,
                headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
                body: Some(form.encode()),
            },
            None => HttpRequest {
                method,
                url,
                headers: Vec::new(),
                body: None,
            },
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_without_form_has_no_body() {
        let req = HttpRequest::build(
            HttpMethod::Get,
            "https://crm.example.com/",
            "/webservice.php?operation=listtypes&sessionName=abc",
            None,
        );
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            "https://crm.example.com/webservice.php?operation=listtypes&sessionName=abc"
        );
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn post_with_form_is_url_encoded() {
        let form = Form::new()
            .field("operation", "create")
            .field("element", r#"{"lastname":"Doe & Sons"}"#)
            .field("elementType", "Contacts");
        let req = HttpRequest::build(HttpMethod::Post, "http://localhost", "/webservice.php", Some(&form));
        assert_eq!(req.url, "http://localhost/webservice.php");
        assert_eq!(
            req.headers,
            vec![(
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string()
            )]
        );
        assert_eq!(
            req.body.as_deref(),
            Some("operation=create&element=%7B%22lastname%22%3A%22Doe%20%26%20Sons%22%7D&elementType=Contacts")
        );
    }

    #[test]
    fn empty_form_is_treated_as_absent() {
        let req = HttpRequest::build(HttpMethod::Post, "http://localhost", "/webservice.php", Some(&Form::new()));
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn form_lookup_returns_first_value() {
        let form = Form::new().field("id", "12x1").field("id", "12x2");
        assert_eq!(form.get("id"), Some("12x1"));
        assert_eq!(form.get("missing"), None);
    }
}
