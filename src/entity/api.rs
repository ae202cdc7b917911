//! Method-dispatched API endpoints.
//!
//! Supported methods are exactly those with a registered handler; the
//! router answers 405 for the rest without invoking anything.

use super::{register_protocol, EntityError, ProtocolSet};
use crate::auth::AuthProtocol;
use crate::error::WebApiError;
use crate::header::HeaderDescriptor;
use crate::ids::RequestId;
use crate::pattern::{Pattern, PatternKind};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One merged parameter passed to a handler: JSON-shaped data or raw bytes
/// (from binary uploads).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParamValue::Json(v) => Some(v),
            ParamValue::Bytes(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ParamValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// The handler's view of a request: the merged parameters (query, path,
/// body) plus the parsed headers.
#[derive(Debug)]
pub struct ApiRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, ParamValue>,
    pub headers: HashMap<String, Vec<HeaderDescriptor>>,
}

impl ApiRequest {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|p| p.as_str())
    }
}

type Handler = Box<dyn Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync>;

/// An endpoint dispatching by HTTP method to registered handlers.
///
/// Handlers return an envelope object; the router translates its control
/// keys (`statusCode`, `noContent`, `created`, `accepted`) into the HTTP
/// response per method.
pub struct WebApi {
    pattern: Pattern,
    protocols: ProtocolSet,
    handlers: HashMap<Method, Handler>,
}

impl WebApi {
    /// Create an API endpoint. The pattern must be exact; forward
    /// (wildcard) patterns belong to resources.
    pub fn new(pattern: Pattern) -> Result<Self, EntityError> {
        if pattern.kind() == PatternKind::Forward {
            return Err(EntityError::ForwardApiPattern(pattern.raw().to_string()));
        }
        Ok(Self {
            pattern,
            protocols: Vec::new(),
            handlers: HashMap::new(),
        })
    }

    /// Register an authentication protocol. Order of registration decides
    /// the challenge order.
    pub fn protocol(mut self, protocol: Arc<dyn AuthProtocol>) -> Self {
        register_protocol(&mut self.protocols, protocol);
        self
    }

    fn handler(
        mut self,
        method: Method,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method, Box::new(f));
        self
    }

    pub fn get(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::GET, f)
    }

    pub fn head(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::HEAD, f)
    }

    pub fn post(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::POST, f)
    }

    pub fn put(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::PUT, f)
    }

    pub fn patch(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::PATCH, f)
    }

    pub fn delete(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::DELETE, f)
    }

    pub fn options(
        self,
        f: impl Fn(ApiRequest) -> Result<Value, WebApiError> + Send + Sync + 'static,
    ) -> Self {
        self.handler(Method::OPTIONS, f)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn protocols(&self) -> &ProtocolSet {
        &self.protocols
    }

    /// True iff a handler is registered for `method`.
    pub fn supports(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }

    pub(crate) fn invoke(
        &self,
        method: &Method,
        request: ApiRequest,
    ) -> Result<Value, WebApiError> {
        match self.handlers.get(method) {
            Some(handler) => handler(request),
            None => Err(WebApiError::method_not_allowed(format!(
                "{method} is not supported here"
            ))),
        }
    }
}
