//! Blocking client for the vtiger CRM web-service API.
//!
//! # Overview
//! `VtigerClient` performs the challenge/login handshake, caches the
//! resulting session for up to four minutes, and exposes the web service's
//! CRUD and query operations. The actual HTTP exchange is delegated to an
//! [`Adapter`]; [`UreqAdapter`] is the bundled blocking implementation
//! (cargo feature `transport`, on by default).
//!
//! # Design
//! - Requests are shaped as plain data (`HttpRequest`) before any I/O, so
//!   adapters and test doubles see identical requests.
//! - Every response is validated into an [`Envelope`]; anything other than
//!   `success: true` with a `result` is an `ApiError::InvalidResponse`.
//! - Session state lives in one owned [`SessionManager`]. Operations take
//!   `&mut self`, so concurrent use of one client needs an outer `Mutex`.
//! - Nothing is retried.
//!
//! ```no_run
//! # #[cfg(feature = "transport")]
//! # fn main() -> Result<(), vtiger_core::ApiError> {
//! use vtiger_core::{Query, UreqAdapter, VtigerClient};
//!
//! let mut client = VtigerClient::new(UreqAdapter::new(), "https://crm.example.com", "admin", "accesskey");
//! let rows = client.query(&Query::new("*", "Contacts").limit(10))?;
//! println!("{}", rows.result);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "transport"))]
//! # fn main() {}
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod session;
pub mod types;

/// Path of the web-service entry point, relative to the CRM host.
pub const WEBSERVICE_PATH: &str = "/webservice.php";

pub use adapter::Adapter;
#[cfg(feature = "transport")]
pub use adapter::UreqAdapter;
pub use client::VtigerClient;
pub use config::Credentials;
pub use error::ApiError;
pub use http::{Form, HttpMethod, HttpRequest, HttpResponse};
pub use query::Query;
pub use session::{Session, SessionManager, SESSION_MAX_AGE_SECS};
pub use types::{Challenge, Envelope, LoginResult, ServerError, TypeList};
