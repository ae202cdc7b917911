//! Addressable endpoints.
//!
//! A [`WebEntity`] pairs a path pattern with an ordered set of
//! authentication protocols and one of two behaviours: a [`WebApi`]
//! dispatches to method-keyed handlers, a [`WebResource`] serves content
//! with Accept negotiation. Entities are built at setup time and shared
//! immutably with the request coroutines.

mod api;
mod resource;

pub use api::{ApiRequest, ParamValue, WebApi};
pub use resource::{
    ResourceContent, ResourceContext, ResourceProvider, ResourceTarget, WebResource,
};

use crate::auth::{AuthProtocol, VerifyResult};
use crate::header::SCHEME_PARAM;
use crate::pattern::Pattern;
use crate::server::request::RequestDescriptor;
use http::Method;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("a WebApi pattern must be exact; {0:?} ends in a wildcard")]
    ForwardApiPattern(String),
    #[error("pattern {0:?} is already enabled for a different entity")]
    DuplicatePattern(String),
    #[error(transparent)]
    Map(#[from] crate::pattern::PatternMapError),
}

/// Ordered scheme → protocol registrations. Registration order decides the
/// challenge order; a scheme registered twice keeps its original position.
pub(crate) type ProtocolSet = Vec<(String, Arc<dyn AuthProtocol>)>;

pub(crate) fn register_protocol(set: &mut ProtocolSet, protocol: Arc<dyn AuthProtocol>) {
    let scheme = protocol.scheme().to_ascii_lowercase();
    match set.iter_mut().find(|(s, _)| *s == scheme) {
        Some((_, existing)) => *existing = protocol,
        None => set.push((scheme, protocol)),
    }
}

/// An endpoint: either a method-dispatched API or a content resource.
pub enum WebEntity {
    Api(WebApi),
    Resource(WebResource),
}

impl WebEntity {
    pub fn pattern(&self) -> &Pattern {
        match self {
            WebEntity::Api(api) => api.pattern(),
            WebEntity::Resource(resource) => resource.pattern(),
        }
    }

    fn protocols(&self) -> &ProtocolSet {
        match self {
            WebEntity::Api(api) => api.protocols(),
            WebEntity::Resource(resource) => resource.protocols(),
        }
    }

    /// Whether this entity can dispatch `method` at all.
    pub fn supports(&self, method: &Method) -> bool {
        match self {
            WebEntity::Api(api) => api.supports(method),
            WebEntity::Resource(_) => *method == Method::GET,
        }
    }

    /// Authenticate a request against the registered protocols.
    ///
    /// With no protocols the entity is open. Otherwise the first
    /// `authorization` descriptor picks the protocol by scheme
    /// (case-insensitive); a missing header or unknown scheme yields a
    /// scheme-less rejection, which the router answers with the union
    /// challenge.
    pub fn verify(&self, request: &RequestDescriptor) -> VerifyResult {
        let protocols = self.protocols();
        if protocols.is_empty() {
            return VerifyResult::ok();
        }
        let Some(credentials) = request.first_header("authorization") else {
            return VerifyResult::no_scheme();
        };
        let scheme = credentials
            .param(SCHEME_PARAM)
            .unwrap_or(credentials.value.as_str());
        match protocols.iter().find(|(s, _)| s.eq_ignore_ascii_case(scheme)) {
            Some((_, protocol)) => protocol.verify(request),
            None => VerifyResult::no_scheme(),
        }
    }

    /// The joined challenges of every registered protocol, for
    /// `WWW-Authenticate`. Empty challenges are dropped.
    pub fn challenges(&self) -> String {
        self.protocols()
            .iter()
            .map(|(_, p)| p.challenge())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Find a registered protocol by scheme, case-insensitively.
    pub(crate) fn protocol_for_scheme(&self, scheme: &str) -> Option<&Arc<dyn AuthProtocol>> {
        self.protocols()
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(scheme))
            .map(|(_, p)| p)
    }
}

impl From<WebApi> for WebEntity {
    fn from(api: WebApi) -> Self {
        WebEntity::Api(api)
    }
}

impl From<WebResource> for WebEntity {
    fn from(resource: WebResource) -> Self {
        WebEntity::Resource(resource)
    }
}
