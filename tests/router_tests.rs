//! End-to-end routing pipeline tests over a real server socket.

mod common;

use common::http;
use common::test_server::start_router;
use serde_json::{json, Value};
use std::sync::Arc;
use waymark::{Pattern, Router, RouterConfig, WebApi};

fn enable_api(router: &mut Router, api: WebApi) {
    router.enable(Arc::new(api.into())).unwrap();
}

#[test]
fn test_simple_get_no_auth() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/hello").unwrap())
            .unwrap()
            .get(|_req| Ok(json!({ "statusCode": 200, "message": "hi" }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert!(resp
        .header("content-type")
        .unwrap()
        .starts_with("application/json"));
    assert!(resp.header("content-length").is_some());
    assert_eq!(resp.body_json(), json!({ "message": "hi" }));

    handle.stop();
}

#[test]
fn test_path_param_percent_decoded_per_segment() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/users/:id").unwrap())
            .unwrap()
            .get(|req| Ok(json!({ "id": req.param_str("id") }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    // The encoded slash must stay inside the segment.
    let resp = http::request(
        &addr,
        "GET /users/42%2Fadmin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_json(), json!({ "id": "42/admin" }));

    handle.stop();
}

#[test]
fn test_trailing_slash_removed_before_lookup() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/a").unwrap())
            .unwrap()
            .get(|_req| Ok(json!({ "route": "a" }))),
    );
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/a/b").unwrap())
            .unwrap()
            .get(|_req| Ok(json!({ "route": "a/b" }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /a/ HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_json(), json!({ "route": "a" }));

    handle.stop();
}

#[test]
fn test_post_method_override() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/res").unwrap())
            .unwrap()
            .get(|_req| Ok(json!({ "handler": "get" })))
            .post(|_req| Ok(json!({ "handler": "post" })))
            .put(|_req| Ok(json!({ "statusCode": 200, "handler": "put" }))),
    );
    let config = RouterConfig {
        allows_post_method_override: true,
        ..RouterConfig::default()
    };
    let (handle, addr) = start_router(router, config);

    // POST with an override header dispatches to the put handler. The PUT
    // envelope promotes leftover fields to headers, so check those.
    let resp = http::request(
        &addr,
        "POST /res HTTP/1.1\r\nHost: localhost\r\n\
         X-HTTP-Method-Override: PUT\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("handler"), Some("put"));

    // The same header on GET is ignored.
    let resp = http::request(
        &addr,
        "GET /res HTTP/1.1\r\nHost: localhost\r\n\
         X-HTTP-Method-Override: PUT\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_json(), json!({ "handler": "get" }));

    handle.stop();
}

#[test]
fn test_method_override_disabled_by_default() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/res").unwrap())
            .unwrap()
            .post(|_req| Ok(json!({ "handler": "post" })))
            .put(|_req| Ok(json!({ "handler": "put" }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "POST /res HTTP/1.1\r\nHost: localhost\r\n\
         X-HTTP-Method-Override: PUT\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_json(), json!({ "handler": "post" }));

    handle.stop();
}

#[test]
fn test_put_created_envelope() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/x").unwrap())
            .unwrap()
            .put(|_req| Ok(json!({ "created": true, "location": "/x/1" }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "PUT /x HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 201);
    assert_eq!(resp.header("location"), Some("/x/1"));
    assert!(resp.body.is_empty());

    handle.stop();
}

#[test]
fn test_delete_no_content_envelope() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/x/:id").unwrap())
            .unwrap()
            .delete(|_req| Ok(json!({ "noContent": true }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "DELETE /x/9 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 204);
    assert!(resp.body.is_empty());

    handle.stop();
}

#[test]
fn test_unknown_path_is_404() {
    let router = Router::new();
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 404);
    let body = resp.body_json();
    assert_eq!(body["error"]["status"], json!(404));

    handle.stop();
}

#[test]
fn test_unsupported_method_is_405_and_never_invoked() {
    use std::sync::atomic::{AtomicBool, Ordering};
    static INVOKED: AtomicBool = AtomicBool::new(false);

    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/only-get").unwrap())
            .unwrap()
            .get(|_req| {
                INVOKED.store(true, Ordering::SeqCst);
                Ok(json!({}))
            }),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "POST /only-get HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 405);
    assert!(!INVOKED.load(Ordering::SeqCst));

    handle.stop();
}

#[test]
fn test_query_parsed_as_json_with_raw_fallback() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/echo").unwrap())
            .unwrap()
            .get(|req| {
                let n = req.param("n").and_then(|p| p.as_json()).cloned();
                let s = req.param("s").and_then(|p| p.as_json()).cloned();
                Ok(json!({ "n": n, "s": s }))
            }),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /echo?n=5&s=hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    // "5" parses as a JSON number; "hello" is kept as the raw string.
    assert_eq!(resp.body_json(), json!({ "n": 5, "s": "hello" }));

    handle.stop();
}

#[test]
fn test_json_body_merged_into_params() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/items").unwrap())
            .unwrap()
            .post(|req| {
                Ok(json!({
                    "statusCode": 201,
                    "name": req.param("name").and_then(|p| p.as_json()).cloned(),
                }))
            }),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let body = r#"{"name":"lamp"}"#;
    let resp = http::request(
        &addr,
        &format!(
            "POST /items HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body_json(), json!({ "name": "lamp" }));

    handle.stop();
}

#[test]
fn test_proto_key_in_body_is_400() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/items").unwrap())
            .unwrap()
            .post(|_req| Ok(json!({}))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let body = r#"{"__proto__":{"admin":true}}"#;
    let resp = http::request(
        &addr,
        &format!(
            "POST /items HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert_eq!(resp.status, 400);

    handle.stop();
}

#[test]
fn test_body_over_limit_is_413() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/items").unwrap())
            .unwrap()
            .post(|_req| Ok(json!({}))),
    );
    let config = RouterConfig {
        max_body_size: 16,
        ..RouterConfig::default()
    };
    let (handle, addr) = start_router(router, config);

    let body = "x".repeat(64);
    let resp = http::request(
        &addr,
        &format!(
            "POST /items HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/plain\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert_eq!(resp.status, 413);

    handle.stop();
}

#[test]
fn test_malformed_header_is_400() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/hello").unwrap())
            .unwrap()
            .get(|_req| Ok(json!({}))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    // Unterminated quoted string in a parsed header is fatal.
    let resp = http::request(
        &addr,
        "GET /hello HTTP/1.1\r\nHost: localhost\r\nAuthorization: Digest realm=\"oops\r\n\
         Connection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 400);

    handle.stop();
}

#[test]
fn test_handler_error_maps_status_and_retry_after() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/busy").unwrap())
            .unwrap()
            .get(|_req| {
                Err(waymark::WebApiError::service_unavailable("try later")
                    .with_retry_after(120_000i64))
            }),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /busy HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 503);
    let retry = resp.header("retry-after").unwrap();
    assert!(retry.ends_with("GMT"));
    let body = resp.body_json();
    assert_eq!(body["error"]["status"], json!(503));
    assert_eq!(body["error"]["message"], json!("try later"));

    handle.stop();
}

#[test]
fn test_handler_panic_is_500() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/boom").unwrap())
            .unwrap()
            .get(|_req| panic!("kaboom")),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "GET /boom HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 500);
    let body: Value = resp.body_json();
    assert_eq!(body["error"]["message"], json!("Something went wrong"));

    handle.stop();
}

#[test]
fn test_inbound_request_id_adopted_when_valid() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/whoami").unwrap())
            .unwrap()
            .get(|req| Ok(json!({ "id": req.request_id.to_string() }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let supplied = waymark::RequestId::new().to_string();
    let resp = http::request(
        &addr,
        &format!(
            "GET /whoami HTTP/1.1\r\nHost: localhost\r\n\
             X-Request-Id: {supplied}\r\nConnection: close\r\n\r\n"
        ),
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_json(), json!({ "id": supplied }));

    // A malformed id is replaced, not adopted.
    let resp = http::request(
        &addr,
        "GET /whoami HTTP/1.1\r\nHost: localhost\r\n\
         X-Request-Id: not-a-ulid\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    let echoed = resp.body_json()["id"].as_str().unwrap().to_string();
    assert_ne!(echoed, "not-a-ulid");
    assert_eq!(echoed.len(), 26);

    handle.stop();
}

#[test]
fn test_head_replies_headers_only() {
    let mut router = Router::new();
    enable_api(
        &mut router,
        WebApi::new(Pattern::parse("/meta").unwrap())
            .unwrap()
            .head(|_req| Ok(json!({ "x-count": 3 }))),
    );
    let (handle, addr) = start_router(router, RouterConfig::default());

    let resp = http::request(
        &addr,
        "HEAD /meta HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp.status, 204);
    assert_eq!(resp.header("x-count"), Some("3"));
    assert!(resp.body.is_empty());

    handle.stop();
}
