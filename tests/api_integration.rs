//! HTTP-level tests driving the router in-process.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{encode, good_report, render_qr, Reply, TestGate, ITEM, PAYEE_ACCOUNT, TOKEN};
use http_body_util::BodyExt;
use bankpay_gate::qr::{Decoder, QrPipeline};
use image::{DynamicImage, ImageFormat};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "bankpay-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"receipt.png\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn authorized(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

async fn create_payment(app: &Router) -> (StatusCode, Value) {
    let request = authorized("POST", "/create-payment")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "itemId": ITEM }).to_string()))
        .expect("request");
    send(app, request).await
}

async fn verify_payment(app: &Router, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let request = authorized("POST", "/verify-payment")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request");
    send(app, request).await
}

async fn access(app: &Router) -> (StatusCode, Value) {
    let request = authorized("GET", &format!("/payments/access?itemId={ITEM}"))
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

fn item_field() -> String {
    ITEM.to_string()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let gate = TestGate::setup();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&gate.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let gate = TestGate::setup();
    let request = Request::builder()
        .method("POST")
        .uri("/create-payment")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "itemId": ITEM }).to_string()))
        .expect("request");
    let (status, body) = send(&gate.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
    assert!(gate.store.is_empty());
}

#[tokio::test]
async fn test_create_payment_then_reuse() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (status, first) = create_payment(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["amount"], "500.00");
    assert_eq!(first["payeeAccount"], PAYEE_ACCOUNT);
    assert!(first.get("reused").is_none());
    let reference = first["referenceCode"].as_str().expect("reference");
    assert_eq!(reference.len(), 8);

    let (status, second) = create_payment(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["referenceCode"], reference);
    assert_eq!(second["reused"], true);
}

#[tokio::test]
async fn test_create_payment_for_unknown_item() {
    let gate = TestGate::setup();
    let request = authorized("POST", "/create-payment")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "itemId": 999 }).to_string()))
        .expect("request");
    let (status, body) = send(&gate.router(), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not-found");
}

#[tokio::test]
async fn test_missing_item_id_is_invalid_input() {
    let gate = TestGate::setup();
    let app = gate.router();

    let request = authorized("POST", "/create-payment")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");
    assert!(body["error"].is_string());

    let request = authorized("GET", "/payments/access")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");

    let request = authorized("GET", "/payments/latest-reference?itemId=seven")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");
    assert!(gate.store.is_empty());
}

#[tokio::test]
async fn test_full_payment_over_http() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();
    gate.oracle().push(Reply::Report(good_report(&reference)));

    let item = item_field();
    let (status, verified) = verify_payment(
        &app,
        &[
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference.to_lowercase()),
            Part::Text("transactionId", "FT25001ABC"),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["success"], true);
    assert_eq!(verified["status"], "VERIFIED");
    assert_eq!(verified["providerResponse"]["success"], true);

    let (status, granted) = access(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(granted, json!({ "accessGranted": true, "status": "VERIFIED" }));

    let (status, owned) = create_payment(&app).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(owned["status"], "VERIFIED");
    assert_eq!(owned["referenceCode"], reference);

    let request = &gate.oracle().requests()[0];
    assert_eq!(request.transaction_id, "FT25001ABC");
    assert_eq!(request.account_suffix, "6789");
}

#[tokio::test]
async fn test_amount_mismatch_over_http() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();
    let mut report = good_report(&reference);
    report["amount"] = json!("450.00");
    gate.oracle().push(Reply::Report(report));

    let item = item_field();
    let (status, body) = verify_payment(
        &app,
        &[
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference),
            Part::Text("transactionId", "FT25001ABC"),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "amount-mismatch");

    let (_, denied) = access(&app).await;
    assert_eq!(denied, json!({ "accessGranted": false, "status": "FAILED" }));
}

#[tokio::test]
async fn test_provider_outage_is_service_unavailable() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();
    gate.oracle().push(Reply::Down);

    let item = item_field();
    let (status, body) = verify_payment(
        &app,
        &[
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference),
            Part::Text("transactionId", "FT25001ABC"),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "provider-unavailable");
}

#[tokio::test]
async fn test_verify_requires_fields() {
    let gate = TestGate::setup();
    let item = item_field();
    let (status, body) = verify_payment(
        &gate.router(),
        &[
            Part::Text("itemId", &item),
            Part::Text("transactionId", "FT25001ABC"),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");
    assert_eq!(gate.oracle().calls(), 0);
}

#[tokio::test]
async fn test_access_without_sessions_is_not_found() {
    let gate = TestGate::setup();
    let (status, body) = access(&gate.router()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not-found");
}

#[tokio::test]
async fn test_transaction_id_is_read_from_receipt_image() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();
    gate.oracle().push(Reply::Report(good_report(&reference)));

    let receipt = encode(&render_qr("FT25099QRCODE", 6, false), ImageFormat::Png);
    let item = item_field();
    let (status, body) = verify_payment(
        &app,
        &[
            Part::File("qrImage", &receipt),
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference),
            Part::Text("transactionId", ""),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "VERIFIED");
    assert_eq!(gate.oracle().requests()[0].transaction_id, "FT25099QRCODE");
}

#[tokio::test]
async fn test_unreadable_receipt_image() {
    let gate = TestGate::setup();
    let app = gate.router();

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();

    let blank = encode(
        &DynamicImage::new_luma8(200, 200),
        ImageFormat::Png,
    );
    let item = item_field();
    let (status, body) = verify_payment(
        &app,
        &[
            Part::File("qrImage", &blank),
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "qr-not-detected");
    assert_eq!(gate.oracle().calls(), 0);
}

struct PanickingDecoder;

impl Decoder for PanickingDecoder {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn decode(&self, _image: &DynamicImage) -> Option<String> {
        panic!("decoder bug");
    }
}

#[tokio::test]
async fn test_decoder_panic_fails_only_its_request() {
    let gate = TestGate::setup();
    let app = gate.router_with_qr(QrPipeline::with_decoders(vec![Box::new(PanickingDecoder)]));

    let (_, created) = create_payment(&app).await;
    let reference = created["referenceCode"].as_str().expect("reference").to_string();
    let receipt = encode(&render_qr("FT25099QRCODE", 6, false), ImageFormat::Png);
    let item = item_field();
    let (status, body) = verify_payment(
        &app,
        &[
            Part::File("qrImage", &receipt),
            Part::Text("itemId", &item),
            Part::Text("referenceCode", &reference),
            Part::Text("accountSuffix", "6789"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "internal");
    assert_eq!(gate.oracle().calls(), 0);

    // The server keeps answering.
    let (status, _) = access(&app).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_latest_reference() {
    let gate = TestGate::setup();
    let app = gate.router();

    let uri = format!("/payments/latest-reference?itemId={ITEM}");
    let request = authorized("GET", &uri).body(Body::empty()).expect("request");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, created) = create_payment(&app).await;
    let request = authorized("GET", &uri).body(Body::empty()).expect("request");
    let (status, latest) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["referenceCode"], created["referenceCode"]);
    assert_eq!(latest["status"], "PENDING");
}
