//! HTTP API integration tests.
//!
//! Drives the full router (extractors, envelope, rate limiting) over the
//! in-memory store with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::too_many_lines)] // Integration tests demonstrate complete flows

mod common;

use arena_testing::fixtures;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{test_config, Catalog, TestApp};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Forwarded-For", "198.51.100.7");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str, token: &str) -> Request<Body> {
    request(Method::GET, uri, Some(token), None)
}

fn post(uri: &str, token: &str, body: Value) -> Request<Body> {
    request(Method::POST, uri, Some(token), Some(body))
}

fn add_body(catalog: &Catalog) -> Value {
    json!({
        "competitionId": catalog.competition.id,
        "registrationTypeId": catalog.individual.id,
        "participantDetails": { "members": [{ "name": "Nimal Perera", "school": "Royal College" }] }
    })
}

fn checkout_body(method: &str) -> Value {
    json!({
        "customerInfo": {
            "firstName": "Nimal",
            "lastName": "Perera",
            "email": "nimal@example.com",
            "phone": "0771234567"
        },
        "paymentMethod": method,
        "bankSlipUrl": "https://uploads.arena.test/slips/0001.jpg"
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = TestApp::new();
    let router = app.router();

    let (status, body) = send(&router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = send(&router, request(Method::GET, "/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ready");
}

#[tokio::test]
async fn test_session_required() {
    let app = TestApp::new();
    let router = app.router();

    let (status, body) = send(&router, request(Method::GET, "/cart", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = send(&router, get("/cart", "not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired session");
}

#[tokio::test]
async fn test_cart_endpoints() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let token = app.login(&member);
    let router = app.router();

    let (status, body) = send(&router, post("/cart/add", &token, add_body(&catalog))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Item added to cart");
    assert_eq!(body["data"]["itemCount"], 1);
    assert_eq!(body["data"]["subtotal"], 5000.0);
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&router, get("/cart", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["participantDetails"]["members"][0]["name"], "Nimal Perera");

    let (status, body) = send(
        &router,
        request(Method::DELETE, "/cart/remove?itemId=nope", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &router,
        request(
            Method::DELETE,
            &format!("/cart/remove?itemId={item_id}"),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Item removed, cart is now empty");

    let (_, body) = send(&router, get("/cart", &token)).await;
    assert_eq!(body["data"]["itemCount"], 0);
    assert_eq!(body["data"]["cartId"], Value::Null);
}

#[tokio::test]
async fn test_malformed_json_uses_envelope() {
    let app = TestApp::new();
    let member = app.member("nimal@example.com");
    let token = app.login(&member);
    let router = app.router();

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/cart/add")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"competitionId\":"))
        .unwrap();
    let (status, body) = send(&router, malformed).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_bank_checkout_and_admin_verification() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    let member_token = app.login(&member);
    let admin_token = app.login(&admin);
    let router = app.router();

    send(&router, post("/cart/add", &member_token, add_body(&catalog))).await;
    let (status, body) = send(&router, post("/checkout", &member_token, checkout_body("bank"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orderId"], "ORDER-TEST-1");
    assert_eq!(body["data"]["registrationNumbers"].as_array().unwrap().len(), 1);

    let (status, body) = send(&router, get("/my-registrations", &member_token)).await;
    assert_eq!(status, StatusCode::OK);
    let mine = &body["data"][0];
    assert_eq!(mine["status"], "PENDING");
    assert_eq!(mine["amountPaid"], 5000.0);
    assert!(mine.get("displayCode").is_none());

    let (status, body) = send(&router, get("/admin/registrations", &member_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(&router, get("/admin/registrations?status=PENDING", &admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    let registration = body["data"]["items"][0].clone();

    let (status, body) = send(
        &router,
        post(
            "/admin/verify-payment",
            &admin_token,
            json!({
                "paymentId": registration["paymentId"],
                "registrationId": registration["id"],
                "approve": false
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"], "A reason is required to reject");

    let (status, body) = send(
        &router,
        post(
            "/admin/verify-payment",
            &admin_token,
            json!({
                "paymentId": registration["paymentId"],
                "registrationId": registration["id"],
                "approve": true
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CONFIRMED");
    assert_eq!(body["data"]["displayCode"], "RBT26-0001");

    let (_, body) = send(&router, get("/admin/registrations?status=PENDING", &admin_token)).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_card_checkout_and_gateway_notification() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let token = app.login(&member);
    let router = app.router();

    send(&router, post("/cart/add", &token, add_body(&catalog))).await;
    let (status, body) = send(&router, post("/checkout", &token, checkout_body("card"))).await;
    assert_eq!(status, StatusCode::OK);
    let order_id = body["data"]["orderId"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["gateway"]["amount"], "5000.00");
    assert_eq!(body["data"]["gateway"]["checkoutUrl"], "https://sandbox.payhere.lk/pay/checkout");

    let (status, body) = send(&router, post("/checkout", &token, checkout_body("bank"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Your cart is empty");

    let notify = |md5sig: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/payments/notify")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "merchant_id=1211149&order_id={order_id}&payment_id=320025071\
                 &payhere_amount=5000.00&payhere_currency=LKR&status_code=2&md5sig={md5sig}"
            )))
            .unwrap()
    };

    let (status, body) = send(&router, notify("0123456789ABCDEF0123456789ABCDEF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid payment notification");

    let signature = app.notification(&order_id, "5000.00", 2).md5sig;
    let (status, body) = send(&router, notify(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment completed");

    let (_, body) = send(&router, get("/my-registrations", &token)).await;
    assert_eq!(body["data"][0]["status"], "CONFIRMED");

    let (status, body) = send(&router, notify(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification acknowledged");
}

#[tokio::test]
async fn test_flag_endpoints() {
    let app = TestApp::new();
    let author = app.member("author@example.com");
    let reporter = app.member("reporter@example.com");
    let moderator = app.moderator("mod@arena.test");
    let post_row = app.store.insert_post(fixtures::post(&author, app.now()));
    let reporter_token = app.login(&reporter);
    let moderator_token = app.login(&moderator);
    let router = app.router();

    let flag_body = json!({ "postId": post_row.id, "reason": "spam", "details": "Shop links" });
    let (status, body) = send(&router, post("/flags", &reporter_token, flag_body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["severity"], "low");
    let flag_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&router, post("/flags", &reporter_token, flag_body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = send(
        &router,
        post("/flags", &reporter_token, json!({ "postId": post_row.id, "reason": "rude" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&router, get("/flags", &reporter_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&router, get("/flags?status=PENDING", &moderator_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = send(
        &router,
        post(
            &format!("/flags/{flag_id}/review"),
            &moderator_token,
            json!({ "status": "RESOLVED", "notes": "Removed the links", "action": "hide" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["flag"]["status"], "RESOLVED");
    assert_eq!(body["data"]["post"]["flagCount"], 0);
    assert_eq!(body["data"]["post"]["isFlagged"], false);
    assert_eq!(body["data"]["post"]["isHidden"], true);

    let (status, body) = send(
        &router,
        post(
            &format!("/flags/{flag_id}/review"),
            &reporter_token,
            json!({ "status": "DISMISSED" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Moderator access required");
}

#[tokio::test]
async fn test_write_endpoints_are_rate_limited() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let app = TestApp::with_config(config);
    let author = app.member("author@example.com");
    let reporter = app.member("reporter@example.com");
    let moderator = app.moderator("mod@arena.test");
    let post_row = app.store.insert_post(fixtures::post(&author, app.now()));
    let token = app.login(&reporter);
    let moderator_token = app.login(&moderator);
    let router = app.router();

    let flag = |reason: &str| post("/flags", &token, json!({ "postId": post_row.id, "reason": reason }));

    let (status, _) = send(&router, flag("spam")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&router, flag("off_topic")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&router, flag("other")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "RATE_LIMITED");

    // Reads on the same path are not limited.
    let (status, body) = send(&router, get("/flags", &moderator_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    // Other clients have their own window.
    let other_client = Request::builder()
        .method(Method::POST)
        .uri("/flags")
        .header("X-Forwarded-For", "203.0.113.20")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "postId": post_row.id, "reason": "other" }).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&router, other_client).await;
    assert_eq!(status, StatusCode::CREATED);
}
