//! waymark — an embeddable HTTP request-routing and dispatch engine.
//!
//! The core is a pattern trie ([`PatternMap`]) that resolves request paths
//! to endpoints ([`WebEntity`]): APIs dispatching by method and resources
//! serving negotiated content. Requests are parsed through a structured
//! header grammar (RFC 7235 / 9110 credentials and value-with-parameters
//! forms) and body decoders (JSON, urlencoded, multipart, text); endpoints
//! authenticate through pluggable [`AuthProtocol`]s, with Digest built in.
//!
//! The server front-end runs on `may` coroutines via `may_minihttp`:
//!
//! ```rust,ignore
//! use std::sync::{Arc, RwLock};
//! use waymark::{
//!     HttpServer, Pattern, Router, RouterConfig, RouterService, WebApi,
//! };
//!
//! let mut router = Router::new();
//! router.enable(Arc::new(
//!     WebApi::new(Pattern::parse("/hello")?)?
//!         .get(|_req| Ok(serde_json::json!({ "statusCode": 200, "message": "hi" })))
//!         .into(),
//! ))?;
//!
//! let service = RouterService::new(Arc::new(RwLock::new(router)), RouterConfig::default());
//! let handle = HttpServer::new(service).start("127.0.0.1:8080")?;
//! handle.join().unwrap();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod auth;
pub mod content_type;
pub mod entity;
pub mod error;
pub mod header;
pub mod ids;
pub mod pattern;
pub mod runtime_config;
pub mod server;

pub use auth::{
    AuthProtocol, CredentialError, CredentialStore, DigestAlgorithm, DigestAuth,
    MemoryCredentialStore, VerifyResult,
};
pub use content_type::ContentTypeRegistry;
pub use entity::{
    ApiRequest, EntityError, ParamValue, ResourceContent, ResourceContext, ResourceProvider,
    ResourceTarget, WebApi, WebEntity, WebResource,
};
pub use error::{RetryAfter, WebApiError};
pub use header::{parse_header, HeaderDescriptor, HeaderKind, HeaderParseError};
pub use ids::RequestId;
pub use pattern::{PathMatch, Pattern, PatternError, PatternKind, PatternMap, PatternMapError};
pub use runtime_config::RuntimeConfig;
pub use server::{
    parse_request, Body, HttpServer, PartValue, RequestDescriptor, RequestParseError, Router,
    RouterConfig, RouterService, ServerHandle, TrailingSlash,
};
