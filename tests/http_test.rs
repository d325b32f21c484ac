use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mailbatch::auth::{AdminCredentials, CookieSettings, SessionStore};
use mailbatch::config::SenderStore;
use mailbatch::http::{router, Context};
use mailbatch::templates::TemplateStore;

fn test_context() -> Context {
    Context {
        senders: Arc::new(SenderStore::default()),
        sessions: SessionStore::default(),
        templates: TemplateStore::new(std::env::temp_dir().join("mailbatch-http-test")),
        admin: AdminCredentials {
            admin_email: Some("admin@example.com".into()),
            admin_password: Some("hunter2".into()),
        },
        cookies: CookieSettings { secure: false },
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(ctx: &Context) -> String {
    let resp = router(ctx.clone())
        .oneshot(post_json(
            "/api/login",
            json!({ "email": "admin@example.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn login_rejects_wrong_credentials() {
    let resp = router(test_context())
        .oneshot(post_json(
            "/api/login",
            json!({ "email": "admin@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn login_requires_both_fields() {
    let resp = router(test_context())
        .oneshot(post_json("/api/login", json!({ "email": "admin@example.com" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guarded_routes_reject_missing_session() {
    let resp = router(test_context())
        .oneshot(
            Request::builder()
                .uri("/api/env")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], json!("Unauthorized"));
}

#[tokio::test]
async fn session_cookie_grants_access() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let resp = router(ctx)
        .oneshot(
            Request::builder()
                .uri("/api/env")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body.get("missing").is_some());
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let resp = router(ctx.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router(ctx)
        .oneshot(
            Request::builder()
                .uri("/api/env")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn env_upload_rejects_empty_payload() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let mut req = post_json("/api/env", json!({ "envText": "   " }));
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let resp = router(ctx).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], json!("No env content provided"));
}

#[tokio::test]
async fn env_upload_stores_a_profile() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let text = "SENDER_EMAIL=team@example.com\nSENDER_APP_PASSWORD=abcd\nSENDER_NAME=Team\n";
    let mut req = post_json("/api/env", json!({ "envText": text, "profile": "events" }));
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let resp = router(ctx.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["profile"], json!("events"));
    assert_eq!(body["missing"], json!([]));

    assert!(ctx.senders.profiles().contains(&"events".to_string()));
}

#[tokio::test]
async fn variant_switch_rejects_unknown_names() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let mut req = post_json("/api/env/variant", json!({ "variant": "nope" }));
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let resp = router(ctx).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_without_rows_is_a_bad_request() {
    let ctx = test_context();
    let cookie = login(&ctx).await;

    let mut req = post_json(
        "/api/send",
        json!({
            "mapping": { "recipient": "email", "name": "name" },
            "template": "Hi {{name}}",
        }),
    );
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let resp = router(ctx).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], json!("Missing required fields"));
}
