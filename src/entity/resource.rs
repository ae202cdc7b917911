//! Static-content endpoints with Accept negotiation.
//!
//! A resource serves bytes from a file-system root or a custom provider.
//! Only `GET` is dispatched. The response content type is negotiated from
//! the request's `Accept` descriptors against the resource's allowed types,
//! q-value ordered; wildcard allowed types resolve against the
//! [`ContentTypeRegistry`] using the URL path's extension.
//!
//! File-backed targets confine reads to the configured root: traversal
//! attempts are 403, missing files and directories are 404 (a directory is
//! never 403, which would leak hierarchy), file-handle exhaustion is 503
//! with a retry hint.

use super::{register_protocol, ProtocolSet};
use crate::auth::AuthProtocol;
use crate::content_type::{media_range_matches, ContentTypeRegistry};
use crate::error::WebApiError;
use crate::header::HeaderDescriptor;
use crate::pattern::{PathMatch, Pattern};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Content returned by a [`ResourceProvider`].
pub enum ResourceContent {
    Bytes(Vec<u8>),
    Text(String),
}

impl ResourceContent {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResourceContent::Bytes(b) => b,
            ResourceContent::Text(s) => s.into_bytes(),
        }
    }
}

/// Context handed to a provider: the negotiated content type plus the
/// pattern-match pieces of the request path.
pub struct ResourceContext<'a> {
    pub content_type: &'a str,
    pub first: &'a [String],
    pub last: &'a [String],
    pub params: &'a HashMap<String, String>,
}

/// A custom content source for a [`WebResource`].
pub trait ResourceProvider: Send + Sync {
    fn get(&self, path: &str, ctx: &ResourceContext<'_>) -> Result<ResourceContent, WebApiError>;
}

/// Where a resource's content comes from.
pub enum ResourceTarget {
    /// Serve files under this root directory.
    FileRoot(PathBuf),
    Provider(Arc<dyn ResourceProvider>),
}

/// A static-content endpoint.
pub struct WebResource {
    pattern: Pattern,
    protocols: ProtocolSet,
    default_type: String,
    allowed_types: Option<Vec<String>>,
    target: ResourceTarget,
    registry: Arc<ContentTypeRegistry>,
}

impl WebResource {
    pub fn new(pattern: Pattern, default_type: impl Into<String>, target: ResourceTarget) -> Self {
        Self {
            pattern,
            protocols: Vec::new(),
            default_type: default_type.into(),
            allowed_types: None,
            target,
            registry: ContentTypeRegistry::shared(),
        }
    }

    /// Restrict the negotiable content types beyond the default type.
    /// Entries may be wildcards (`text/*`, `*/json`).
    pub fn allowed_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn registry(mut self, registry: Arc<ContentTypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn protocol(mut self, protocol: Arc<dyn AuthProtocol>) -> Self {
        register_protocol(&mut self.protocols, protocol);
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn protocols(&self) -> &ProtocolSet {
        &self.protocols
    }

    /// The concrete allowed type satisfying one accepted media range, if
    /// any. The default type is considered before the allowed set.
    fn allowed_type_for(&self, accepted: &str, path: &str) -> Option<String> {
        let allowed_iter = std::iter::once(self.default_type.as_str()).chain(
            self.allowed_types
                .iter()
                .flat_map(|v| v.iter().map(String::as_str)),
        );
        for allowed in allowed_iter {
            if allowed.contains('*') {
                if let Some(concrete) = self.registry.resolve(allowed, path) {
                    if media_range_matches(accepted, &concrete) {
                        return Some(concrete);
                    }
                }
            } else if media_range_matches(accepted, allowed) {
                return Some(allowed.to_string());
            }
        }
        None
    }

    /// Pick the response content type from the Accept descriptors: sort by
    /// descending q (default 1, clamped to [0,1], stable), take the first
    /// accepted range an allowed type satisfies. No Accept header means the
    /// default type; no satisfiable range is 415 naming the rejects.
    fn negotiate(&self, path: &str, accept: &[HeaderDescriptor]) -> Result<String, WebApiError> {
        if accept.is_empty() {
            return Ok(self.default_type.clone());
        }

        let mut ranked: Vec<(&HeaderDescriptor, f64)> = accept
            .iter()
            .map(|d| {
                let q = d
                    .param("q")
                    .and_then(|q| q.parse::<f64>().ok())
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);
                (d, q)
            })
            .collect();
        ranked.sort_by(|(_, qa), (_, qb)| qb.partial_cmp(qa).unwrap_or(std::cmp::Ordering::Equal));

        for (descriptor, q) in &ranked {
            if let Some(concrete) = self.allowed_type_for(&descriptor.value, path) {
                debug!(accepted = %descriptor.value, q, content_type = %concrete, "accept negotiation");
                return Ok(concrete);
            }
        }

        let rejected: Vec<&str> = ranked.iter().map(|(d, _)| d.value.as_str()).collect();
        Err(WebApiError::unsupported_media_type(format!(
            "no acceptable representation for {}",
            rejected.join(", ")
        )))
    }

    /// Serve the resource for a request path and its Accept descriptors.
    /// Returns the body bytes and the negotiated content type.
    pub(crate) fn serve(
        &self,
        path: &str,
        accept: &[HeaderDescriptor],
    ) -> Result<(Vec<u8>, String), WebApiError> {
        let content_type = self.negotiate(path, accept)?;
        let matched = self
            .pattern
            .extract(path)
            .ok_or_else(|| WebApiError::not_found("Not Found"))?;

        let bytes = match &self.target {
            ResourceTarget::Provider(provider) => {
                let ctx = ResourceContext {
                    content_type: &content_type,
                    first: &matched.first,
                    last: &matched.last,
                    params: &matched.params,
                };
                provider.get(path, &ctx)?.into_bytes()
            }
            ResourceTarget::FileRoot(root) => read_confined(root, &matched)?,
        };

        Ok((bytes, content_type))
    }
}

/// Map the wildcard tail onto the file system, refusing anything that
/// would resolve outside the root.
fn read_confined(root: &Path, matched: &PathMatch) -> Result<Vec<u8>, WebApiError> {
    let mut resolved = root.to_path_buf();
    for segment in &matched.last {
        let decoded = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| WebApiError::bad_request("undecodable path segment"))?;
        if decoded.is_empty()
            || decoded == "."
            || decoded == ".."
            || decoded.contains('/')
            || decoded.contains('\\')
            || decoded.contains('\0')
        {
            return Err(WebApiError::forbidden("path escapes the resource root"));
        }
        resolved.push(decoded.as_ref());
    }

    if resolved.is_dir() {
        return Err(WebApiError::not_found("Not Found"));
    }

    match std::fs::read(&resolved) {
        Ok(bytes) => Ok(bytes),
        Err(err) => Err(map_read_error(err)),
    }
}

fn map_read_error(err: io::Error) -> WebApiError {
    match err.kind() {
        io::ErrorKind::NotFound => WebApiError::not_found("Not Found"),
        // EMFILE: out of file handles; ask the client to come back.
        _ if err.raw_os_error() == Some(24) => {
            WebApiError::service_unavailable("resource temporarily unavailable")
                .with_retry_after(120_000i64)
        }
        _ => WebApiError::bad_request("unreadable resource"),
    }
}
