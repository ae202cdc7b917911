//! Response assembly: envelope translation, error bodies, raw writes.
//!
//! Handler envelopes are interpreted per request method (see
//! [`render_envelope`]); the result is written to the `may_minihttp`
//! response. Header lines handed to `may_minihttp` must be `'static`, so
//! dynamic headers are leaked per response.

use crate::error::WebApiError;
use crate::ids::RequestId;
use http::{Method, StatusCode};
use may_minihttp::Response;
use serde_json::{Map, Value};
use tracing::warn;

fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("OK")
}

pub(crate) fn push_header(res: &mut Response, name: &str, value: &str) {
    // may_minihttp keeps only 'static header lines.
    res.header(Box::leak(format!("{name}: {value}").into_boxed_str()));
}

/// A translated response, independent of the transport.
#[derive(Debug, PartialEq)]
pub(crate) struct Rendered {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` writes no body at all (HEAD, 204).
    pub body: Option<Vec<u8>>,
}

fn header_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_set(map: &mut Map<String, Value>, key: &str) -> bool {
    matches!(map.remove(key), Some(Value::Bool(true)))
}

fn take_status_code(map: &mut Map<String, Value>) -> Option<u16> {
    map.remove("statusCode")
        .as_ref()
        .and_then(Value::as_i64)
        .filter(|s| (200..=599).contains(s))
        .map(|s| s as u16)
}

/// Interpret a handler envelope per request method.
///
/// | method              | interpretation                                      |
/// |---------------------|-----------------------------------------------------|
/// | HEAD                | headers only, default 204                           |
/// | GET/POST/PATCH/OPTIONS | JSON body minus `statusCode`, default 200        |
/// | PUT                 | `noContent` → 204, `created` → 201, fields → headers |
/// | DELETE              | `noContent` → 204 (no body), `accepted` → 202       |
pub(crate) fn render_envelope(method: &Method, envelope: Value, request_id: RequestId) -> Rendered {
    let mut map = match envelope {
        Value::Object(map) => map,
        other => {
            // Non-object envelopes are passed through as the JSON body.
            return Rendered {
                status: 200,
                headers: Vec::new(),
                body: Some(serde_json::to_vec(&other).unwrap_or_default()),
            };
        }
    };

    let status_code = take_status_code(&mut map);

    if *method == Method::HEAD {
        let headers = map.iter().map(|(k, v)| (k.clone(), header_value(v))).collect();
        return Rendered {
            status: status_code.unwrap_or(204),
            headers,
            body: None,
        };
    }

    if *method == Method::PUT {
        let no_content = is_set(&mut map, "noContent");
        let created = is_set(&mut map, "created");
        let status = if no_content && created {
            warn!(request_id = %request_id, "PUT envelope sets both noContent and created");
            200
        } else if no_content {
            204
        } else if created {
            201
        } else {
            status_code.unwrap_or(200)
        };
        let headers = map.iter().map(|(k, v)| (k.clone(), header_value(v))).collect();
        return Rendered {
            status,
            headers,
            body: None,
        };
    }

    if *method == Method::DELETE {
        let no_content = is_set(&mut map, "noContent");
        let accepted = is_set(&mut map, "accepted");
        let status = if no_content && accepted {
            warn!(request_id = %request_id, "DELETE envelope sets both noContent and accepted");
            200
        } else if no_content {
            204
        } else if accepted {
            202
        } else {
            status_code.unwrap_or(200)
        };
        let body = if status == 204 {
            None
        } else {
            Some(serde_json::to_vec(&Value::Object(map)).unwrap_or_default())
        };
        return Rendered {
            status,
            headers: Vec::new(),
            body,
        };
    }

    // GET, POST, PATCH, OPTIONS and anything else with a body.
    Rendered {
        status: status_code.unwrap_or(200),
        headers: Vec::new(),
        body: Some(serde_json::to_vec(&Value::Object(map)).unwrap_or_default()),
    }
}

pub(crate) fn write_rendered(res: &mut Response, rendered: Rendered) {
    res.status_code(rendered.status as usize, status_reason(rendered.status));
    for (name, value) in &rendered.headers {
        push_header(res, name, value);
    }
    match rendered.body {
        Some(body) => {
            if !body.is_empty() {
                res.header("Content-Type: application/json");
            }
            res.body_vec(body);
        }
        None => res.body_vec(Vec::new()),
    }
}

/// Write raw bytes with an explicit content type (the resource path).
pub(crate) fn write_bytes(res: &mut Response, status: u16, bytes: Vec<u8>, content_type: &str) {
    res.status_code(status as usize, status_reason(status));
    if !bytes.is_empty() {
        push_header(res, "Content-Type", content_type);
    }
    res.body_vec(bytes);
}

/// Error body shape: `{"error":{"message":…,"status":…}}`, the message
/// omitted when there is none.
pub(crate) fn write_error(
    res: &mut Response,
    status: u16,
    message: Option<&str>,
    retry_after: Option<&str>,
) {
    let mut error = Map::new();
    if let Some(message) = message {
        if !message.is_empty() {
            error.insert("message".to_string(), Value::String(message.to_string()));
        }
    }
    error.insert("status".to_string(), Value::Number(status.into()));

    if let Some(retry_after) = retry_after {
        push_header(res, "Retry-After", retry_after);
    }

    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    let body = Value::Object(Map::from_iter([("error".to_string(), Value::Object(error))]));
    res.body_vec(serde_json::to_vec(&body).unwrap_or_default());
}

pub(crate) fn write_api_error(res: &mut Response, err: &WebApiError) {
    write_error(res, err.status(), Some(err.description()), err.retry_after());
}
