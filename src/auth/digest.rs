//! HTTP Digest authentication (RFC 7616 subset: qop auth / auth-int,
//! MD5 or SHA-256).

use super::{AuthProtocol, CredentialError, CredentialStore, VerifyResult};
use crate::server::request::RequestDescriptor;
use base64::{engine::general_purpose, Engine as _};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const QOP_VALUES: &[&str] = &["auth", "auth-int", "auth,auth-int"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => f.write_str("MD5"),
            DigestAlgorithm::Sha256 => f.write_str("SHA-256"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DigestAuthError {
    #[error("unsupported qop {0:?} (expected auth, auth-int, or auth,auth-int)")]
    InvalidQop(String),
}

#[derive(Debug, Error)]
enum VerifyError {
    #[error("no authorization credentials")]
    MissingCredentials,
    #[error("credentials are not Digest")]
    SchemeMismatch,
    #[error("missing digest parameter {0}")]
    MissingParam(&'static str),
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Store(#[from] CredentialError),
}

/// The Digest authentication protocol.
///
/// Shared across request coroutines; hashers are constructed per call and
/// the challenge nonce is recomputed per challenge from the configured
/// secret, so no verification state survives a request.
pub struct DigestAuth {
    qop: String,
    secret: Vec<u8>,
    realm: Option<String>,
    domain: Option<String>,
    algorithm: DigestAlgorithm,
    opaque: String,
    store: Arc<dyn CredentialStore>,
    table: String,
    projection: String,
}

fn random_opaque(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

impl DigestAuth {
    /// Create a Digest protocol with the given quality-of-protection,
    /// nonce secret, and credential backend.
    ///
    /// The `opaque` value is drawn from the OS CSPRNG at construction
    /// (32 bytes, base64; see [`DigestAuth::opaque_length`]).
    pub fn new(
        qop: &str,
        secret: impl Into<Vec<u8>>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, DigestAuthError> {
        if !QOP_VALUES.contains(&qop) {
            return Err(DigestAuthError::InvalidQop(qop.to_string()));
        }
        Ok(Self {
            qop: qop.to_string(),
            secret: secret.into(),
            realm: None,
            domain: None,
            algorithm: DigestAlgorithm::default(),
            opaque: random_opaque(32),
            store,
            table: "credentials".to_string(),
            projection: "password".to_string(),
        })
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Redraw the opaque value with the given byte length.
    pub fn opaque_length(mut self, length: usize) -> Self {
        self.opaque = random_opaque(length);
        self
    }

    pub fn credentials_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn credentials_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = projection.into();
        self
    }

    fn hash_hex(&self, data: &str) -> String {
        match self.algorithm {
            DigestAlgorithm::Md5 => format!("{:x}", Md5::digest(data.as_bytes())),
            DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data.as_bytes())),
        }
    }

    fn hash_raw(&self, data: &[u8]) -> Vec<u8> {
        match self.algorithm {
            DigestAlgorithm::Md5 => Md5::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// A fresh nonce: `base64(H(now_ms ":" secret))`, recomputed per
    /// challenge.
    pub fn make_nonce(&self) -> String {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut input = format!("{now_ms}:").into_bytes();
        input.extend_from_slice(&self.secret);
        general_purpose::STANDARD.encode(self.hash_raw(&input))
    }

    fn check(&self, request: &RequestDescriptor) -> Result<bool, VerifyError> {
        let credentials = request
            .first_header("authorization")
            .ok_or(VerifyError::MissingCredentials)?;
        if !credentials.value.eq_ignore_ascii_case("digest") {
            return Err(VerifyError::SchemeMismatch);
        }

        let param = |name: &'static str| {
            credentials
                .param(name)
                .ok_or(VerifyError::MissingParam(name))
        };
        let username = param("username")?;
        let realm = credentials.param("realm").unwrap_or("");
        let nonce = param("nonce")?;
        let nc = param("nc")?;
        let cnonce = param("cnonce")?;
        let qop = param("qop")?;
        // Taken verbatim from the client; the effective request target is
        // not re-derived.
        let uri = param("uri")?;
        let response = param("response")?;

        let password = self
            .store
            .lookup(&self.table, username, &self.projection)?
            .ok_or(VerifyError::UnknownUser)?;

        let ha1 = self.hash_hex(&format!("{username}:{realm}:{password}"));
        let ha2 = self.hash_hex(&format!("{}:{uri}", request.method.as_str()));
        let expected = self.hash_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

        Ok(expected == response)
    }
}

impl AuthProtocol for DigestAuth {
    fn scheme(&self) -> &str {
        "Digest"
    }

    fn verify(&self, request: &RequestDescriptor) -> VerifyResult {
        match self.check(request) {
            Ok(ok) => VerifyResult {
                ok,
                scheme: Some("Digest".to_string()),
                status: None,
                reason: Default::default(),
            },
            Err(err) => {
                debug!(request_id = %request.request_id, error = %err, "digest verification failed");
                VerifyResult::denied("Digest")
            }
        }
    }

    fn challenge(&self) -> String {
        let mut members = Vec::new();
        if let Some(realm) = &self.realm {
            members.push(format!("realm=\"{realm}\""));
        }
        if let Some(domain) = &self.domain {
            members.push(format!("domain=\"{domain}\""));
        }
        members.push(format!("nonce=\"{}\"", self.make_nonce()));
        members.push(format!("opaque=\"{}\"", self.opaque));
        members.push(format!("algorithm={}", self.algorithm));
        members.push(format!("qop=\"{}\"", self.qop));
        format!("Digest {}", members.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::header::parse_header;
    use crate::ids::RequestId;
    use crate::server::request::Body;
    use http::Method;
    use std::collections::HashMap;

    fn store_with_user() -> Arc<MemoryCredentialStore> {
        let store = MemoryCredentialStore::new();
        store.insert("credentials", "mia", "password", "open sesame");
        Arc::new(store)
    }

    fn request_with_authorization(value: &str) -> RequestDescriptor {
        let mut headers = HashMap::new();
        headers.insert(
            "authorization".to_string(),
            parse_header("authorization", value).unwrap(),
        );
        RequestDescriptor {
            request_id: RequestId::new(),
            method: Method::GET,
            path: "/res".to_string(),
            raw_query: String::new(),
            headers,
            query: HashMap::new(),
            body: Body::Empty,
        }
    }

    fn md5_hex(data: &str) -> String {
        format!("{:x}", Md5::digest(data.as_bytes()))
    }

    #[test]
    fn test_challenge_shape() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user())
            .unwrap()
            .realm("api");
        let challenge = auth.challenge();
        assert!(challenge.starts_with("Digest realm=\"api\", nonce=\""));
        assert!(challenge.contains("opaque=\""));
        // algorithm is the one unquoted member
        assert!(challenge.contains("algorithm=MD5"));
        assert!(challenge.ends_with("qop=\"auth\""));
    }

    #[test]
    fn test_challenge_nonce_changes_per_call() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user()).unwrap();
        // Nonces from distinct timestamps differ; same-millisecond nonces
        // may collide, so just check the shape here.
        let nonce = auth.make_nonce();
        assert!(general_purpose::STANDARD.decode(nonce).is_ok());
    }

    #[test]
    fn test_invalid_qop_rejected() {
        assert!(matches!(
            DigestAuth::new("none", b"s".to_vec(), store_with_user()),
            Err(DigestAuthError::InvalidQop(_))
        ));
    }

    #[test]
    fn test_verify_accepts_correct_response() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user())
            .unwrap()
            .realm("api");

        let ha1 = md5_hex("mia:api:open sesame");
        let ha2 = md5_hex("GET:/res");
        let response = md5_hex(&format!("{ha1}:n1:00000001:cn:auth:{ha2}"));
        let header = format!(
            "Digest username=\"mia\", realm=\"api\", nonce=\"n1\", nc=00000001, \
             cnonce=\"cn\", qop=auth, uri=\"/res\", response=\"{response}\""
        );

        let result = auth.verify(&request_with_authorization(&header));
        assert!(result.ok);
        assert_eq!(result.scheme.as_deref(), Some("Digest"));
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user())
            .unwrap()
            .realm("api");

        let ha1 = md5_hex("mia:api:wrong password");
        let ha2 = md5_hex("GET:/res");
        let response = md5_hex(&format!("{ha1}:n1:00000001:cn:auth:{ha2}"));
        let header = format!(
            "Digest username=\"mia\", realm=\"api\", nonce=\"n1\", nc=00000001, \
             cnonce=\"cn\", qop=auth, uri=\"/res\", response=\"{response}\""
        );

        let result = auth.verify(&request_with_authorization(&header));
        assert!(!result.ok);
        assert_eq!(result.scheme.as_deref(), Some("Digest"));
    }

    #[test]
    fn test_verify_unknown_user_denied() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user()).unwrap();
        let header = "Digest username=\"bob\", realm=\"api\", nonce=\"n\", nc=1, \
                      cnonce=\"c\", qop=auth, uri=\"/res\", response=\"beef\"";
        let result = auth.verify(&request_with_authorization(header));
        assert!(!result.ok);
        assert_eq!(result.scheme.as_deref(), Some("Digest"));
    }

    #[test]
    fn test_sha256_algorithm() {
        let auth = DigestAuth::new("auth", b"secret".to_vec(), store_with_user())
            .unwrap()
            .realm("api")
            .algorithm(DigestAlgorithm::Sha256);
        assert!(auth.challenge().contains("algorithm=SHA-256"));

        let sha_hex = |d: &str| format!("{:x}", Sha256::digest(d.as_bytes()));
        let ha1 = sha_hex("mia:api:open sesame");
        let ha2 = sha_hex("GET:/res");
        let response = sha_hex(&format!("{ha1}:n1:00000001:cn:auth:{ha2}"));
        let header = format!(
            "Digest username=\"mia\", realm=\"api\", nonce=\"n1\", nc=00000001, \
             cnonce=\"cn\", qop=auth, uri=\"/res\", response=\"{response}\""
        );
        assert!(auth.verify(&request_with_authorization(&header)).ok);
    }
}
