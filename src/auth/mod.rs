//! Pluggable authentication protocols.
//!
//! An [`AuthProtocol`] names an HTTP authentication scheme and knows how to
//! verify a parsed request and produce a challenge for `WWW-Authenticate`.
//! Protocols are shared across request coroutines and must be internally
//! thread-safe; any per-verification state (hashers, nonce material) is
//! created per call.
//!
//! Credential storage is an external capability behind [`CredentialStore`];
//! the in-memory implementation here is the reference consumer of that
//! interface and the one the tests use.

mod digest;

pub use digest::{DigestAlgorithm, DigestAuth, DigestAuthError};

use crate::server::request::RequestDescriptor;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// The structured outcome of a verification attempt.
///
/// `ok: false` without a `scheme` means "no scheme matched": the router
/// answers with the union of all registered challenges. With a `scheme`,
/// the named protocol rejected the credentials; `status` (400–599) and
/// `reason` refine the response.
#[derive(Debug, Clone, Default)]
pub struct VerifyResult {
    pub ok: bool,
    pub scheme: Option<String>,
    pub status: Option<u16>,
    pub reason: HashMap<String, String>,
}

impl VerifyResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn ok_with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            ok: true,
            scheme: Some(scheme.into()),
            ..Default::default()
        }
    }

    /// Rejection by a specific protocol.
    pub fn denied(scheme: impl Into<String>) -> Self {
        Self {
            ok: false,
            scheme: Some(scheme.into()),
            ..Default::default()
        }
    }

    /// No protocol matched the presented credentials (or none were sent).
    pub fn no_scheme() -> Self {
        Self {
            ok: false,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        if (400..=599).contains(&status) {
            self.status = Some(status);
        }
        self
    }

    pub fn with_reason(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.reason.insert(name.into(), value.into());
        self
    }
}

/// A named HTTP authentication scheme.
pub trait AuthProtocol: Send + Sync {
    /// Scheme name as it appears in challenges (e.g. `Digest`). Matching
    /// against request credentials is case-insensitive.
    fn scheme(&self) -> &str;

    /// Verify the parsed request.
    fn verify(&self, request: &RequestDescriptor) -> VerifyResult;

    /// The challenge for `WWW-Authenticate`. May be empty for schemes that
    /// do not advertise one.
    fn challenge(&self) -> String;
}

#[derive(Debug, Error)]
#[error("credential lookup failed: {0}")]
pub struct CredentialError(pub String);

/// Capability for password/credential lookup.
///
/// `table` and `projection` address a record collection and the field to
/// project from the matching record; the backend owns its own storage and
/// concurrency.
pub trait CredentialStore: Send + Sync {
    fn lookup(
        &self,
        table: &str,
        key: &str,
        projection: &str,
    ) -> Result<Option<String>, CredentialError>;
}

/// In-memory [`CredentialStore`] keyed table → record key → field.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tables: RwLock<HashMap<String, HashMap<String, HashMap<String, String>>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, key: &str, field: &str, value: &str) {
        let mut tables = self.tables.write().expect("credential store poisoned");
        tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(
        &self,
        table: &str,
        key: &str,
        projection: &str,
    ) -> Result<Option<String>, CredentialError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CredentialError("store lock poisoned".to_string()))?;
        Ok(tables
            .get(table)
            .and_then(|records| records.get(key))
            .and_then(|record| record.get(projection))
            .cloned())
    }
}
