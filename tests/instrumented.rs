//! End-to-end flow through the public API: attach transport extensions,
//! capture, read typed inputs, finish, observe telemetry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::Request;
use http_body_util::Full;
use kiroku::{Exchange, HttpSink, Peer, RequestContext, RouteInfo, StatusCode, Telemetry};

fn inbound(method: &str, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost")
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap()
}

#[tokio::test]
async fn capture_read_finish_and_meter() {
    let responses = Arc::new(Mutex::new(Vec::new()));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let (resp_log, req_log) = (Arc::clone(&responses), Arc::clone(&requests));

    let telemetry = Arc::new(
        Telemetry::builder()
            .route_with_method(true)
            .on_request(move |route| req_log.lock().unwrap().push(route.to_owned()))
            .on_response(move |route, status, elapsed| {
                resp_log
                    .lock()
                    .unwrap()
                    .push((route.to_owned(), status, elapsed))
            })
            .build(),
    );

    let mut req = inbound(
        "GET",
        "http://localhost/devices/aa-bb-cc-00-11-22?since=2019-03-01",
        "Some body",
    );
    RouteInfo::new("/devices/{mac}")
        .with_params(vec![("mac".into(), "aa:bb:cc:00:11:22".into())])
        .attach(req.extensions_mut());
    Peer("10.0.0.1:55555".parse().unwrap()).attach(req.extensions_mut());
    RequestContext::new()
        .with_request_id("req-e2e")
        .with_session_username("alice")
        .attach(req.extensions_mut());

    let ex = Exchange::capture(req, HttpSink::new(), Arc::clone(&telemetry)).await;

    // captured body is stable; the rebuilt request replays it in full
    assert_eq!(ex.body(), b"Some body");
    assert_eq!(ex.body(), b"Some body");

    // typed inputs
    assert_eq!(ex.path_value("mac").to_mac(), "aa-bb-cc-00-11-22");
    assert_eq!(ex.query_value("since").to_datetime().timestamp(), 1_551_398_400);
    assert_eq!(ex.context().request_id(), "req-e2e");

    let payload = serde_json::json!({ "ok": true });
    let finished = ex.json(StatusCode::OK, &payload);
    let sink = finished.sink();
    assert_eq!(sink.status(), 200);
    assert_eq!(sink.headers().get("content-type").unwrap(), "application/json");
    assert_eq!(sink.body(), br#"{"ok":true}"#);

    telemetry.shutdown().await;

    assert_eq!(requests.lock().unwrap().as_slice(), ["GET /devices/{mac}"]);
    let responses = responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "GET /devices/{mac}");
    assert_eq!(responses[0].1, 200);
    assert!(responses[0].2 >= Duration::ZERO);
}

#[tokio::test]
async fn no_content_keeps_body_and_writes_204() {
    let ex = Exchange::capture(
        inbound("GET", "http://localhost/test/uri", "Some body"),
        HttpSink::new(),
        Arc::new(Telemetry::disabled()),
    )
    .await;
    assert_eq!(ex.body(), b"Some body");
    let finished = ex.no_content();
    assert_eq!(finished.sink().status(), 204);
    assert!(finished.sink().body().is_empty());
}

#[tokio::test]
async fn finished_converts_into_an_http_response() {
    let ex = Exchange::capture(
        inbound("GET", "http://localhost/x", ""),
        HttpSink::new(),
        Arc::new(Telemetry::disabled()),
    )
    .await;
    let res = ex.finish(StatusCode::ACCEPTED, "queued").into_response();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}
