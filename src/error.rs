//! HTTP-status-bearing error taxonomy.
//!
//! Handlers return [`WebApiError`] to control the response status and
//! description; anything else that escapes a handler is wrapped into a
//! generic 500 by the router. `retry_after` is normalised to an HTTP-date
//! string at construction time so the router can emit it verbatim in a
//! `Retry-After` header.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Render a timestamp as an RFC 7231 HTTP-date (IMF-fixdate, always GMT).
pub(crate) fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Accepted inputs for `Retry-After`: a millisecond delta from now, an
/// absolute timestamp, or an already-formatted HTTP-date string.
#[derive(Debug, Clone)]
pub enum RetryAfter {
    DeltaMillis(i64),
    At(DateTime<Utc>),
    HttpDate(String),
}

impl From<i64> for RetryAfter {
    fn from(ms: i64) -> Self {
        RetryAfter::DeltaMillis(ms)
    }
}

impl From<DateTime<Utc>> for RetryAfter {
    fn from(at: DateTime<Utc>) -> Self {
        RetryAfter::At(at)
    }
}

impl From<&str> for RetryAfter {
    fn from(s: &str) -> Self {
        RetryAfter::HttpDate(s.to_string())
    }
}

impl From<String> for RetryAfter {
    fn from(s: String) -> Self {
        RetryAfter::HttpDate(s)
    }
}

impl RetryAfter {
    /// Normalise to an HTTP-date string. Invalid input falls back to
    /// now + 5 ms rather than erroring; a bad retry hint must not sink
    /// the response carrying it.
    fn normalize(self) -> String {
        match self {
            RetryAfter::DeltaMillis(ms) => http_date(Utc::now() + Duration::milliseconds(ms)),
            RetryAfter::At(at) => http_date(at),
            RetryAfter::HttpDate(s) => match DateTime::parse_from_rfc2822(&s) {
                Ok(parsed) => http_date(parsed.with_timezone(&Utc)),
                Err(_) => http_date(Utc::now() + Duration::milliseconds(5)),
            },
        }
    }
}

/// An error carrying an HTTP status code, an optional description, and an
/// optional normalised `Retry-After` date.
///
/// The status is clamped to the valid range `[100, 599]`; out-of-range
/// values collapse to 500.
#[derive(Debug, Clone, Error)]
#[error("{description} ({status})")]
pub struct WebApiError {
    status: u16,
    description: String,
    retry_after: Option<String>,
}

impl WebApiError {
    pub fn new(status: u16, description: impl Into<String>) -> Self {
        let status = if (100..=599).contains(&status) {
            status
        } else {
            500
        };
        Self {
            status,
            description: description.into(),
            retry_after: None,
        }
    }

    /// Attach a `Retry-After` hint, normalised to an HTTP-date string.
    pub fn with_retry_after(mut self, retry_after: impl Into<RetryAfter>) -> Self {
        self.retry_after = Some(retry_after.into().normalize());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The normalised HTTP-date for the `Retry-After` header, if set.
    pub fn retry_after(&self) -> Option<&str> {
        self.retry_after.as_deref()
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(400, description)
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(401, description)
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(403, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(404, description)
    }

    pub fn method_not_allowed(description: impl Into<String>) -> Self {
        Self::new(405, description)
    }

    pub fn not_acceptable(description: impl Into<String>) -> Self {
        Self::new(406, description)
    }

    pub fn proxy_authentication_required(description: impl Into<String>) -> Self {
        Self::new(407, description)
    }

    pub fn request_timeout(description: impl Into<String>) -> Self {
        Self::new(408, description)
    }

    pub fn conflict(description: impl Into<String>) -> Self {
        Self::new(409, description)
    }

    pub fn gone(description: impl Into<String>) -> Self {
        Self::new(410, description)
    }

    pub fn unsupported_media_type(description: impl Into<String>) -> Self {
        Self::new(415, description)
    }

    pub fn internal_server_error(description: impl Into<String>) -> Self {
        Self::new(500, description)
    }

    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::new(501, description)
    }

    pub fn bad_gateway(description: impl Into<String>) -> Self {
        Self::new(502, description)
    }

    pub fn service_unavailable(description: impl Into<String>) -> Self {
        Self::new(503, description)
    }

    pub fn network_authentication_required(description: impl Into<String>) -> Self {
        Self::new(511, description)
    }
}
