//! The HTTP server front-end.
//!
//! Built on `may_minihttp` and the `may` coroutine runtime: every
//! connection is served by a coroutine running [`RouterService`], which
//! drives the full pipeline:
//!
//! ```text
//! connection → parse_request → normalise → PatternMap lookup
//!            → verify (AuthProtocol) → dispatch → response assembly
//! ```
//!
//! This module contains:
//! - [`HttpServer`] / [`ServerHandle`] — server lifecycle
//! - [`RouterService`] — the per-request pipeline
//! - [`Router`] / [`RouterConfig`] — the entity table and its knobs
//! - request parsing ([`parse_request`], [`RequestDescriptor`]) and body
//!   decoding, including multipart

pub mod http_server;
pub mod multipart;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use multipart::{MultipartError, PartValue};
pub use request::{parse_request, Body, RequestDescriptor, RequestParseError};
pub use service::{Router, RouterConfig, RouterService, TrailingSlash};
