//! Parsing of the raw HTTP request into a [`RequestDescriptor`].
//!
//! Headers go through the grammar parser's specialisation table; the body
//! is buffered (with `Content-Length` verification and a size cap) and
//! decoded according to the first `Content-Type` descriptor.

use crate::header::{parse_header, HeaderDescriptor, HeaderParseError};
use crate::ids::RequestId;
use crate::server::multipart::{self, MultipartError, PartValue};
use http::Method;
use may_minihttp::Request;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Read};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RequestParseError {
    #[error("unrecognised request method {0:?}")]
    InvalidMethod(String),
    #[error("malformed {name} header: {source}")]
    Header {
        name: String,
        source: HeaderParseError,
    },
    #[error("declared content-length {0:?} is not a valid length")]
    InvalidContentLength(String),
    #[error("content-length declares {declared} bytes but {received} were received")]
    ContentLengthMismatch { declared: usize, received: usize },
    #[error("request body exceeds the {limit}-byte limit")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Io(#[from] io::Error),
    #[error("request body is not valid JSON: {0}")]
    Json(String),
    #[error("JSON object key \"__proto__\" is not accepted")]
    ProtoKey,
    #[error("request body is not valid {charset}")]
    TextDecode { charset: String },
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

/// Decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    /// Unrecognised content type; bytes kept as received.
    Raw(Vec<u8>),
    /// `text/*`, decoded with the declared charset.
    Text(String),
    /// `application/json`, prototype-poisoning-safe.
    Json(Value),
    /// `application/x-www-form-urlencoded`.
    Form(HashMap<String, String>),
    /// `multipart/form-data`, keyed by part name.
    Multipart(HashMap<String, PartValue>),
}

/// The parsed request handed to routing, verification, and handlers.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub raw_query: String,
    /// Header descriptors keyed by lowercased field name.
    pub headers: HashMap<String, Vec<HeaderDescriptor>>,
    /// Query parameters; values start out as JSON strings and may be
    /// re-parsed by the router's query-as-JSON policy.
    pub query: HashMap<String, Value>,
    pub body: Body,
}

impl RequestDescriptor {
    /// All descriptors of a header, by lowercased name.
    pub fn header(&self, name: &str) -> Option<&[HeaderDescriptor]> {
        self.headers.get(name).map(|v| v.as_slice())
    }

    /// The first descriptor of a header.
    pub fn first_header(&self, name: &str) -> Option<&HeaderDescriptor> {
        self.headers.get(name).and_then(|v| v.first())
    }
}

/// Undo obs-fold line continuation: CRLF (or bare LF) followed by SP/HTAB
/// collapses to a single space.
pub(crate) fn unfold(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let fold_len = if bytes[i..].starts_with(b"\r\n") {
            2
        } else if bytes[i] == b'\n' {
            1
        } else {
            0
        };
        if fold_len > 0 && matches!(bytes.get(i + fold_len), Some(b' ') | Some(b'\t')) {
            out.push(' ');
            i += fold_len + 1;
            while matches!(bytes.get(i), Some(b' ') | Some(b'\t')) {
                i += 1;
            }
            continue;
        }
        let ch = value[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

pub(crate) fn parse_query(raw: &str) -> HashMap<String, Value> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Decode `bytes` as text in the given charset, fatally; `None` on any
/// malformed sequence. Falls back to fatal UTF-8 when no charset is given.
pub(crate) fn decode_text(bytes: &[u8], charset: Option<&str>) -> Option<String> {
    match charset {
        Some(label) => {
            let encoding = encoding_rs::Encoding::for_label(label.as_bytes())?;
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|cow| cow.into_owned())
        }
        None => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
    }
}

/// Reject any JSON object carrying a `__proto__` key, at any depth. The
/// wire format is the attack surface regardless of host-language object
/// semantics.
fn reject_proto_keys(value: &Value) -> Result<(), RequestParseError> {
    match value {
        Value::Object(map) => {
            if map.contains_key("__proto__") {
                return Err(RequestParseError::ProtoKey);
            }
            for v in map.values() {
                reject_proto_keys(v)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for v in items {
                reject_proto_keys(v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub(crate) fn parse_json_body(bytes: &[u8]) -> Result<Value, RequestParseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| RequestParseError::Json(e.to_string()))?;
    reject_proto_keys(&value)?;
    Ok(value)
}

fn decode_body(
    bytes: Vec<u8>,
    content_type: Option<&HeaderDescriptor>,
) -> Result<Body, RequestParseError> {
    if bytes.is_empty() {
        return Ok(Body::Empty);
    }
    let Some(descriptor) = content_type else {
        return Ok(Body::Raw(bytes));
    };

    let media_type = descriptor.value.to_ascii_lowercase();
    match media_type.as_str() {
        "multipart/form-data" => {
            let boundary = descriptor
                .param("boundary")
                .ok_or(MultipartError::MissingBoundaryParam)?;
            Ok(Body::Multipart(multipart::parse_multipart(
                &bytes, boundary,
            )?))
        }
        "application/x-www-form-urlencoded" => {
            let map = url::form_urlencoded::parse(&bytes)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Ok(Body::Form(map))
        }
        "application/json" => Ok(Body::Json(parse_json_body(&bytes)?)),
        _ if media_type.starts_with("text/") => {
            let charset = descriptor.param("charset");
            let text = match decode_text(&bytes, charset) {
                Some(text) => text,
                // Fall back to fatal UTF-8 before giving up.
                None => {
                    decode_text(&bytes, None).ok_or_else(|| RequestParseError::TextDecode {
                        charset: charset.unwrap_or("utf-8").to_string(),
                    })?
                }
            };
            Ok(Body::Text(text))
        }
        _ => Ok(Body::Raw(bytes)),
    }
}

/// Parse a `may_minihttp` request into a [`RequestDescriptor`].
///
/// `max_body_size` bounds body buffering; exceeding it fails with
/// [`RequestParseError::BodyTooLarge`], which the router surfaces as 413
/// before any dispatch.
pub fn parse_request(
    req: Request,
    max_body_size: usize,
) -> Result<RequestDescriptor, RequestParseError> {
    let method: Method = req
        .method()
        .parse()
        .map_err(|_| RequestParseError::InvalidMethod(req.method().to_string()))?;

    let raw_path = req.path().to_string();
    let (path, raw_query) = match raw_path.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (raw_path.clone(), String::new()),
    };

    // Join repeated fields with ", " before parsing, preserving arrival
    // order per name.
    let mut raw_headers: Vec<(String, String)> = Vec::new();
    for h in req.headers() {
        let name = h.name.to_ascii_lowercase();
        let value = unfold(&String::from_utf8_lossy(h.value));
        match raw_headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => raw_headers.push((name, value)),
        }
    }

    let mut headers = HashMap::new();
    for (name, value) in raw_headers {
        let descriptors =
            parse_header(&name, &value).map_err(|source| RequestParseError::Header {
                name: name.clone(),
                source,
            })?;
        headers.insert(name, descriptors);
    }

    let mut bytes = Vec::new();
    req.body()
        .take(max_body_size as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > max_body_size {
        return Err(RequestParseError::BodyTooLarge {
            limit: max_body_size,
        });
    }

    if let Some(descriptor) = headers.get("content-length").and_then(|v| v.first()) {
        let declared: usize = descriptor
            .value
            .parse()
            .map_err(|_| RequestParseError::InvalidContentLength(descriptor.value.clone()))?;
        if declared != bytes.len() {
            return Err(RequestParseError::ContentLengthMismatch {
                declared,
                received: bytes.len(),
            });
        }
    }

    let content_type = headers.get("content-type").map(|list| {
        if list.len() > 1 {
            warn!(
                count = list.len(),
                content_type = %list[0].value,
                "multiple content-type values; using the first"
            );
        }
        &list[0]
    });

    // Adopt a caller-supplied correlation id when it is a valid ULID.
    let request_id = RequestId::from_header_or_new(
        headers
            .get("x-request-id")
            .and_then(|list| list.first())
            .map(|d| d.value.as_str()),
    );

    let query = parse_query(&raw_query);
    let body = decode_body(bytes, content_type)?;

    Ok(RequestDescriptor {
        request_id,
        method,
        path,
        raw_query,
        headers,
        query,
        body,
    })
}
