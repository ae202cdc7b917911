//! `multipart/form-data` body parsing (RFC 7578).
//!
//! The body is scanned for `CRLF--boundary` delimiter lines, tolerating an
//! optional preamble before the first boundary and requiring the closing
//! `--boundary--` delimiter. Part headers are unfolded (RFC 5322) and run
//! through the header grammar parser; every part must carry
//! `Content-Disposition: form-data` with a `name` parameter.

use crate::header::parse_header;
use crate::server::request::{decode_text, parse_json_body, unfold};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("multipart content-type is missing its boundary parameter")]
    MissingBoundaryParam,
    #[error("multipart body has no opening boundary")]
    MissingOpeningBoundary,
    #[error("multipart body is missing the closing boundary")]
    MissingClosingBoundary,
    #[error("bytes after a boundary line are neither a part nor the closing delimiter")]
    MalformedBoundary,
    #[error("multipart part has no header block")]
    MissingPartHeaders,
    #[error("multipart part has no content-disposition form-data name")]
    MissingPartName,
    #[error("malformed part header line {0:?}")]
    MalformedPartHeader(String),
    #[error("part {name:?} is not valid {charset}")]
    TextDecode { name: String, charset: String },
    #[error("part {name:?} is not valid JSON: {detail}")]
    Json { name: String, detail: String },
}

/// Decoded value of one form-data part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    /// `text/plain` (or no declared type), decoded with the part charset.
    Text(String),
    /// `application/json`.
    Json(Value),
    /// Anything else, kept as raw bytes.
    Bytes(Vec<u8>),
}

impl PartValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PartValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PartValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Parse a multipart body into a map keyed by part name.
pub fn parse_multipart(
    body: &[u8],
    boundary: &str,
) -> Result<HashMap<String, PartValue>, MultipartError> {
    let marker: Vec<u8> = format!("--{boundary}").into_bytes();
    let delim: Vec<u8> = format!("\r\n--{boundary}").into_bytes();

    // The body must open with `--boundary`, either immediately or after a
    // discardable preamble ending in CRLF.
    let mut cursor = if body.starts_with(&marker) {
        marker.len()
    } else {
        find(body, &delim, 0).ok_or(MultipartError::MissingOpeningBoundary)? + delim.len()
    };

    let mut parts = HashMap::new();
    loop {
        if body[cursor..].starts_with(b"--") {
            // Closing delimiter; the epilogue, if any, is discarded.
            return Ok(parts);
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(MultipartError::MalformedBoundary);
        }
        cursor += 2;

        let end = find(body, &delim, cursor).ok_or(MultipartError::MissingClosingBoundary)?;
        let (name, value) = parse_part(&body[cursor..end])?;
        parts.insert(name, value);
        cursor = end + delim.len();
    }
}

fn parse_part(part: &[u8]) -> Result<(String, PartValue), MultipartError> {
    let header_end = find(part, b"\r\n\r\n", 0).ok_or(MultipartError::MissingPartHeaders)?;
    let header_block = String::from_utf8_lossy(&part[..header_end]);
    let content = &part[header_end + 4..];

    let mut name = None;
    let mut content_type = None;
    for line in unfold(&header_block).split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (field, value) = line
            .split_once(':')
            .ok_or_else(|| MultipartError::MalformedPartHeader(line.to_string()))?;
        let field = field.trim().to_ascii_lowercase();
        let descriptors = parse_header(&field, value.trim())
            .map_err(|_| MultipartError::MalformedPartHeader(line.to_string()))?;
        let Some(descriptor) = descriptors.into_iter().next() else {
            continue;
        };
        match field.as_str() {
            "content-disposition" => {
                if descriptor.value.eq_ignore_ascii_case("form-data") {
                    name = descriptor.param("name").map(|s| s.to_string());
                }
            }
            "content-type" => content_type = Some(descriptor),
            _ => {}
        }
    }

    let name = name.ok_or(MultipartError::MissingPartName)?;

    let media_type = content_type
        .as_ref()
        .map(|d| d.value.to_ascii_lowercase())
        .unwrap_or_else(|| "text/plain".to_string());

    let value = match media_type.as_str() {
        "text/plain" => {
            let charset = content_type.as_ref().and_then(|d| d.param("charset"));
            let text = decode_text(content, charset)
                .or_else(|| decode_text(content, None))
                .ok_or_else(|| MultipartError::TextDecode {
                    name: name.clone(),
                    charset: charset.unwrap_or("utf-8").to_string(),
                })?;
            PartValue::Text(text)
        }
        "application/json" => {
            let json = parse_json_body(content).map_err(|e| MultipartError::Json {
                name: name.clone(),
                detail: e.to_string(),
            })?;
            PartValue::Json(json)
        }
        _ => PartValue::Bytes(content.to_vec()),
    };

    Ok((name, value))
}
