//! The routing pipeline: the `HttpService` tying parsing, lookup,
//! verification, dispatch, and response assembly together.
//!
//! Per request, in order: parse (400/413 on failure), normalise the path
//! and resolve a method override, look up the entity (404), gate the
//! method (405), verify (401/400/403 with `WWW-Authenticate`), dispatch,
//! and translate the handler's envelope into the response.

use crate::entity::{ApiRequest, EntityError, ParamValue, WebEntity};
use crate::header::quote_if_needed;
use crate::pattern::{Pattern, PatternMap};
use crate::server::multipart::PartValue;
use crate::server::request::{parse_request, Body, RequestDescriptor, RequestParseError};
use crate::server::response::{
    push_header, render_envelope, write_api_error, write_bytes, write_error, write_rendered,
};
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// What to do with a trailing slash before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlash {
    AsIs,
    Add,
    #[default]
    Remove,
}

/// Router behaviour knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub trailing_slash: TrailingSlash,
    /// Honour `X-HTTP-Method`, `X-HTTP-Method-Override`, `X-Method-Override`
    /// on POST requests.
    pub allows_post_method_override: bool,
    /// Try to JSON-parse each raw query value; keep the raw string on
    /// failure.
    pub parses_query_as_json: bool,
    /// Requests with larger bodies fail with 413 before dispatch.
    pub max_body_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlash::Remove,
            allows_post_method_override: false,
            parses_query_as_json: true,
            max_body_size: 1024 * 1024,
        }
    }
}

/// The entity table: a pattern trie of enabled endpoints.
///
/// Read-only during request handling; `enable`/`disable` are setup-time
/// operations serialised against readers by the `RwLock` the service holds.
#[derive(Default)]
pub struct Router {
    map: PatternMap<Arc<WebEntity>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable an entity under its pattern.
    ///
    /// Re-enabling the same entity is idempotent; a different entity under
    /// an already-enabled pattern is a configuration error.
    pub fn enable(&mut self, entity: Arc<WebEntity>) -> Result<(), EntityError> {
        if let Some(existing) = self.map.get(entity.pattern()) {
            if Arc::ptr_eq(existing, &entity) {
                return Ok(());
            }
            return Err(EntityError::DuplicatePattern(
                entity.pattern().raw().to_string(),
            ));
        }
        let pattern = entity.pattern().clone();
        info!(pattern = %pattern, "entity enabled");
        self.map.set(pattern, entity)?;
        Ok(())
    }

    pub fn disable(&mut self, pattern: &Pattern) -> Option<Arc<WebEntity>> {
        let removed = self.map.delete(pattern);
        if removed.is_some() {
            info!(pattern = %pattern, "entity disabled");
        }
        removed
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<WebEntity>> {
        self.map.lookup(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn normalize_path(path: &str, policy: TrailingSlash) -> String {
    match policy {
        TrailingSlash::AsIs => path.to_string(),
        TrailingSlash::Remove => {
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            }
        }
        TrailingSlash::Add => {
            if path.ends_with('/') {
                path.to_string()
            } else {
                format!("{path}/")
            }
        }
    }
}

const OVERRIDE_HEADERS: &[&str] = &["x-http-method", "x-http-method-override", "x-method-override"];

/// Resolve a method override on POST; first header present wins.
fn resolve_method_override(descriptor: &mut RequestDescriptor) {
    for name in OVERRIDE_HEADERS {
        let Some(value) = descriptor.first_header(name).map(|d| d.value.clone()) else {
            continue;
        };
        match value.to_ascii_uppercase().parse::<Method>() {
            Ok(method) => {
                info!(
                    request_id = %descriptor.request_id,
                    header = name,
                    method = %method,
                    "method override applied"
                );
                descriptor.method = method;
            }
            Err(_) => {
                warn!(
                    request_id = %descriptor.request_id,
                    header = name,
                    value = %value,
                    "ignoring unparseable method override"
                );
            }
        }
        return;
    }
}

/// Re-parse raw query strings as JSON, keeping the raw value on failure.
fn parse_query_as_json(descriptor: &mut RequestDescriptor) {
    for (key, value) in descriptor.query.iter_mut() {
        let Value::String(raw) = value else { continue };
        match crate::server::request::parse_json_body(raw.as_bytes()) {
            Ok(parsed) => *value = parsed,
            Err(err) => {
                warn!(
                    request_id = %descriptor.request_id,
                    key = %key,
                    error = %err,
                    "query value kept as raw string"
                );
            }
        }
    }
}

/// Merge query, path parameters, and (for methods with content) the body
/// into the handler's parameter map.
fn build_params(
    descriptor: &RequestDescriptor,
    pattern: &Pattern,
    path: &str,
) -> HashMap<String, ParamValue> {
    let mut params: HashMap<String, ParamValue> = descriptor
        .query
        .iter()
        .map(|(k, v)| (k.clone(), ParamValue::Json(v.clone())))
        .collect();

    if let Some(matched) = pattern.extract(path) {
        for (name, value) in matched.params {
            params.insert(name, ParamValue::Json(Value::String(value)));
        }
    }

    let method = &descriptor.method;
    let has_content =
        !(*method == Method::GET || *method == Method::HEAD || *method == Method::DELETE);
    if !has_content {
        return params;
    }

    match &descriptor.body {
        Body::Empty => {}
        Body::Json(Value::Object(map)) => {
            for (k, v) in map {
                params.insert(k.clone(), ParamValue::Json(v.clone()));
            }
        }
        // A non-map body lands under the `body` key.
        Body::Json(other) => {
            params.insert("body".to_string(), ParamValue::Json(other.clone()));
        }
        Body::Form(map) => {
            for (k, v) in map {
                params.insert(k.clone(), ParamValue::Json(Value::String(v.clone())));
            }
        }
        Body::Multipart(parts) => {
            for (name, part) in parts {
                let value = match part {
                    PartValue::Text(s) => ParamValue::Json(Value::String(s.clone())),
                    PartValue::Json(v) => ParamValue::Json(v.clone()),
                    PartValue::Bytes(b) => ParamValue::Bytes(b.clone()),
                };
                params.insert(name.clone(), value);
            }
        }
        Body::Text(s) => {
            params.insert("body".to_string(), ParamValue::Json(Value::String(s.clone())));
        }
        Body::Raw(b) => {
            params.insert("body".to_string(), ParamValue::Bytes(b.clone()));
        }
    }

    params
}

/// Append `reason` pairs to a protocol challenge, quoting values that are
/// not tokens and keeping already-well-formed quoted strings as they are.
fn extend_challenge(base: String, reason: &HashMap<String, String>) -> String {
    let mut out = base;
    let mut pairs: Vec<_> = reason.iter().collect();
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (name, value) in pairs {
        let rendered = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value.clone()
        } else {
            quote_if_needed(value)
        };
        out.push_str(", ");
        out.push_str(name);
        out.push('=');
        out.push_str(&rendered);
    }
    out
}

/// The HTTP front-end service.
#[derive(Clone)]
pub struct RouterService {
    pub router: Arc<RwLock<Router>>,
    pub config: Arc<RouterConfig>,
}

impl RouterService {
    pub fn new(router: Arc<RwLock<Router>>, config: RouterConfig) -> Self {
        Self {
            router,
            config: Arc::new(config),
        }
    }

    fn handle(&self, req: Request, res: &mut Response) {
        let mut descriptor = match parse_request(req, self.config.max_body_size) {
            Ok(descriptor) => descriptor,
            Err(err @ RequestParseError::BodyTooLarge { .. }) => {
                warn!(error = %err, "request body over limit");
                write_error(res, 413, Some(&err.to_string()), None);
                return;
            }
            Err(err) => {
                warn!(error = %err, "request parsing failed");
                write_error(res, 400, Some(&err.to_string()), None);
                return;
            }
        };
        let request_id = descriptor.request_id;

        if self.config.allows_post_method_override && descriptor.method == Method::POST {
            resolve_method_override(&mut descriptor);
        }
        if self.config.parses_query_as_json {
            parse_query_as_json(&mut descriptor);
        }

        let path = normalize_path(&descriptor.path, self.config.trailing_slash);

        let entity = {
            let router = self.router.read().expect("router lock poisoned");
            router.lookup(&path)
        };
        let Some(entity) = entity else {
            debug!(request_id = %request_id, method = %descriptor.method, path = %path, "no entity matched");
            write_error(res, 404, Some("Not Found"), None);
            return;
        };

        if !entity.supports(&descriptor.method) {
            debug!(
                request_id = %request_id,
                method = %descriptor.method,
                pattern = %entity.pattern(),
                "method not supported by entity"
            );
            write_error(res, 405, Some("Method Not Allowed"), None);
            return;
        }

        let verdict = entity.verify(&descriptor);
        if !verdict.ok {
            let status = match verdict.status {
                Some(s @ (400 | 403)) => s,
                _ => 401,
            };
            let challenge = match &verdict.scheme {
                None => entity.challenges(),
                Some(scheme) => {
                    let base = entity
                        .protocol_for_scheme(scheme)
                        .map(|p| p.challenge())
                        .unwrap_or_default();
                    extend_challenge(base, &verdict.reason)
                }
            };
            info!(
                request_id = %request_id,
                pattern = %entity.pattern(),
                status,
                scheme = verdict.scheme.as_deref().unwrap_or("<none>"),
                "verification rejected the request"
            );
            if !challenge.is_empty() {
                push_header(res, "WWW-Authenticate", &challenge);
            }
            write_error(res, status, None, None);
            return;
        }

        match entity.as_ref() {
            WebEntity::Resource(resource) => {
                let accept = descriptor.header("accept").unwrap_or(&[]);
                match resource.serve(&path, accept) {
                    Ok((bytes, content_type)) => {
                        info!(
                            request_id = %request_id,
                            path = %path,
                            content_type = %content_type,
                            bytes = bytes.len(),
                            "resource served"
                        );
                        write_bytes(res, 200, bytes, &content_type);
                    }
                    Err(err) => {
                        info!(request_id = %request_id, path = %path, status = err.status(), "resource error");
                        write_api_error(res, &err);
                    }
                }
            }
            WebEntity::Api(api) => {
                let params = build_params(&descriptor, entity.pattern(), &path);
                let api_request = ApiRequest {
                    request_id,
                    method: descriptor.method.clone(),
                    path: path.clone(),
                    params,
                    headers: descriptor.headers.clone(),
                };

                let started = std::time::Instant::now();
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| api.invoke(&descriptor.method, api_request)));
                let latency_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(Ok(envelope)) => {
                        let rendered = render_envelope(&descriptor.method, envelope, request_id);
                        info!(
                            request_id = %request_id,
                            method = %descriptor.method,
                            path = %path,
                            status = rendered.status,
                            latency_ms,
                            "handler completed"
                        );
                        write_rendered(res, rendered);
                    }
                    Ok(Err(err)) => {
                        info!(
                            request_id = %request_id,
                            method = %descriptor.method,
                            path = %path,
                            status = err.status(),
                            latency_ms,
                            error = %err,
                            "handler returned an error"
                        );
                        write_api_error(res, &err);
                    }
                    Err(panic) => {
                        error!(
                            request_id = %request_id,
                            method = %descriptor.method,
                            path = %path,
                            latency_ms,
                            panic = ?panic.downcast_ref::<&str>(),
                            "handler panicked"
                        );
                        write_error(res, 500, Some("Something went wrong"), None);
                    }
                }
            }
        }
    }
}

impl HttpService for RouterService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        self.handle(req, res);
        Ok(())
    }
}
