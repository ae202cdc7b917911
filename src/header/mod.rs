//! Parsing of structured HTTP header field values.
//!
//! A header field decodes to an ordered list of [`HeaderDescriptor`]s, one
//! per comma-separated member. Three parser variants exist, selected by the
//! lowercased header name:
//!
//! | header             | variant                         |
//! |--------------------|---------------------------------|
//! | `authorization`    | single credentials (RFC 7235)   |
//! | `www-authenticate` | credentials list                |
//! | `user-agent`       | single-valued, no splitting     |
//! | anything else      | generic value-with-parameters   |
//!
//! Parse errors are fatal for the request; the router surfaces them as
//! 400 Bad Request.

mod credentials;
mod tokenizer;
mod value;

pub use credentials::{SCHEME_PARAM, TOKEN68_PARAM};

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderParseError {
    #[error("control byte 0x{0:02x} in header value")]
    ControlByte(u8),
    #[error("unterminated quoted string")]
    UnterminatedQuote,
    #[error("unexpected {0:?} in header value")]
    UnexpectedToken(String),
    #[error("header value ended inside a production")]
    UnexpectedEnd,
    #[error("malformed token68 {0:?}")]
    MalformedToken68(String),
}

/// The parsed form of one comma-separated member of a header field: a main
/// value plus a parameter map with lowercased names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderDescriptor {
    pub value: String,
    pub params: HashMap<String, String>,
}

impl HeaderDescriptor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            params: HashMap::new(),
        }
    }

    /// Parameter lookup by (lowercased) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }
}

/// Which parser variant applies to a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `credentials` — exactly one production.
    Credentials,
    /// `#credentials` — a challenge list.
    CredentialsList,
    /// Kept whole; commas and semicolons carry no structure.
    Verbatim,
    /// `1#( value *( OWS ";" OWS name "=" value ) )`.
    Generic,
}

/// Look up the parser variant for a header name.
pub fn kind_for(name: &str) -> HeaderKind {
    match name.to_ascii_lowercase().as_str() {
        "authorization" => HeaderKind::Credentials,
        "www-authenticate" => HeaderKind::CredentialsList,
        "user-agent" => HeaderKind::Verbatim,
        _ => HeaderKind::Generic,
    }
}

fn parse_verbatim(input: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    if let Some(b) = input
        .bytes()
        .find(|&b| (b < 0x20 && b != b'\t') || b == 0x7f)
    {
        return Err(HeaderParseError::ControlByte(b));
    }
    Ok(vec![HeaderDescriptor::new(
        input.trim_matches(|c| c == ' ' || c == '\t'),
    )])
}

/// Parse a header field value with the variant selected by `name`.
pub fn parse_header(name: &str, input: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    match kind_for(name) {
        HeaderKind::Credentials => credentials::parse_credentials(input).map(|d| vec![d]),
        HeaderKind::CredentialsList => credentials::parse_credentials_list(input),
        HeaderKind::Verbatim => parse_verbatim(input),
        HeaderKind::Generic => value::parse_value_list(input),
    }
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Quote `value` unless it is a well-formed token.
pub(crate) fn quote_if_needed(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(is_tchar) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Render descriptors back to wire form for the variant given by `kind`.
///
/// Parameter order within a descriptor is not preserved by the parse (the
/// map is unordered), so rendering sorts parameters by name; re-parsing the
/// result yields the same descriptor list.
pub fn render_descriptors(kind: HeaderKind, list: &[HeaderDescriptor]) -> String {
    match kind {
        HeaderKind::Verbatim => list
            .first()
            .map(|d| d.value.clone())
            .unwrap_or_default(),
        HeaderKind::Credentials | HeaderKind::CredentialsList => list
            .iter()
            .map(render_credentials)
            .collect::<Vec<_>>()
            .join(", "),
        HeaderKind::Generic => list
            .iter()
            .map(render_generic)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn sorted_params<'a>(
    descriptor: &'a HeaderDescriptor,
) -> impl Iterator<Item = (&'a String, &'a String)> {
    let mut params: Vec<_> = descriptor.params.iter().collect();
    params.sort_by(|(a, _), (b, _)| a.cmp(b));
    params.into_iter()
}

fn render_generic(descriptor: &HeaderDescriptor) -> String {
    let mut out = descriptor.value.clone();
    for (name, value) in sorted_params(descriptor) {
        out.push_str("; ");
        out.push_str(name);
        out.push('=');
        out.push_str(&quote_if_needed(value));
    }
    out
}

fn render_credentials(descriptor: &HeaderDescriptor) -> String {
    let mut out = descriptor.value.clone();
    if let Some(token) = descriptor.param(TOKEN68_PARAM) {
        out.push(' ');
        out.push_str(token);
        return out;
    }
    let params: Vec<String> = sorted_params(descriptor)
        .filter(|(name, _)| name.as_str() != SCHEME_PARAM)
        .map(|(name, value)| format!("{name}={}", quote_if_needed(value)))
        .collect();
    if !params.is_empty() {
        out.push(' ');
        out.push_str(&params.join(", "));
    }
    out
}
