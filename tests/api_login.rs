mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use calibra::{
    api::{router, ProxyPolicy},
    auth::StaffRole,
    store::StoreHealth,
};
use common::{Harness, PASSWORD};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(harness: &Harness, trust_forwarded_headers: bool) -> Router {
    let health: Arc<dyn StoreHealth> = harness.store.clone();
    router(
        harness.auth.clone(),
        health,
        ProxyPolicy {
            trust_forwarded_headers,
        },
    )
}

fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: &Value,
) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "api-test");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::empty())?)
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

async fn login_token(app: &Router, email: &str) -> Result<String> {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "email": email, "password": PASSWORD }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    Ok(body["token"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn login_validation_errors_are_keyed() -> Result<()> {
    let harness = Harness::new()?;
    let app = app(&harness, false);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/v1/auth/login", None, &json!({ "password": "x" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({
            "message": "The email field is required.",
            "errors": { "email": ["The email field is required."] }
        })
    );

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "email": "not-an-email", "password": "x" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["email"][0],
        "The email must be a valid email address."
    );

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/v1/auth/login", None, &json!({ "email": "a@x.com" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["password"][0], "The password field is required.");

    // Input errors never reach the ledger.
    assert!(harness.store.attempts().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn wrong_password_counts_down_then_locks() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("a@x.com", StaffRole::User, true).await?;
    let app = app(&harness, false);

    let wrong = json!({ "email": "a@x.com", "password": "nope-nope" });
    let (status, body) = send(
        &app,
        json_request(Method::POST, "/v1/auth/login", None, &wrong)?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["email"][0],
        "These credentials do not match our records. 4 attempts remaining."
    );

    for _ in 0..4 {
        send(
            &app,
            json_request(Method::POST, "/v1/auth/login", None, &wrong)?,
        )
        .await?;
    }

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "email": "a@x.com", "password": PASSWORD }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "Too many login attempts. Please try again in 15 minutes."
    );
    Ok(())
}

#[tokio::test]
async fn source_address_defaults_to_unknown_without_peer() -> Result<()> {
    let harness = Harness::new()?;
    let app = app(&harness, false);

    let mut request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "email": "a@x.com", "password": "whatever1" }),
    )?;
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9".parse()?);
    send(&app, request).await?;

    let attempts = harness.store.attempts().await;
    assert_eq!(attempts[0].source_address, "unknown");
    assert_eq!(attempts[0].user_agent, "api-test");
    Ok(())
}

#[tokio::test]
async fn trusted_proxy_headers_set_source_address() -> Result<()> {
    let harness = Harness::new()?;
    let app = app(&harness, true);

    let mut request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "email": "a@x.com", "password": "whatever1" }),
    )?;
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse()?);
    send(&app, request).await?;

    let attempts = harness.store.attempts().await;
    assert_eq!(attempts[0].source_address, "10.0.0.1");
    Ok(())
}

#[tokio::test]
async fn spoofed_forwarded_hops_share_the_proxy_address() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("target@x.com", StaffRole::User, true).await?;
    let app = app(&harness, true);

    let attempt = |email: String, hop: usize, password: &str| -> Result<Request<Body>> {
        let mut request = json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "email": email, "password": password }),
        )?;
        request.headers_mut().insert(
            "x-forwarded-for",
            format!("1.1.1.{hop}, 198.51.100.7").parse()?,
        );
        Ok(request)
    };

    for n in 0..10 {
        let (status, body) = send(&app, attempt(format!("spray{n}@x.com"), n, "nope-nope")?).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(
            body["message"]
                .as_str()
                .is_some_and(|message| message.starts_with("These credentials")),
            "{body}"
        );
    }

    let (status, body) = send(&app, attempt("target@x.com".to_string(), 10, PASSWORD)?).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "Too many login attempts. Please try again in 15 minutes."
    );

    let attempts = harness.store.attempts().await;
    assert_eq!(attempts.len(), 10);
    assert!(attempts
        .iter()
        .all(|record| record.source_address == "198.51.100.7"));
    Ok(())
}

#[tokio::test]
async fn login_me_logout_round() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("admin@x.com", StaffRole::Admin, true).await?;
    let app = app(&harness, false);

    let token = login_token(&app, "Admin@X.com").await?;

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/auth/me", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "admin@x.com");
    assert_eq!(body["role"], "admin");
    assert_eq!(body["kind"], "staff");

    let (status, _) = send(&app, empty_request(Method::POST, "/v1/auth/logout", Some(&token))?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/auth/me", Some(&token))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "Unauthenticated." }));
    Ok(())
}

#[tokio::test]
async fn missing_bearer_is_unauthenticated() -> Result<()> {
    let harness = Harness::new()?;
    let app = app(&harness, false);

    for (method, uri) in [
        (Method::GET, "/v1/auth/me"),
        (Method::POST, "/v1/auth/logout"),
        (Method::GET, "/v1/audit"),
        (Method::GET, "/v1/login-attempts"),
    ] {
        let (status, _) = send(&app, empty_request(method, uri, None)?).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn admin_routes_reject_non_admins() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("user@x.com", StaffRole::User, true).await?;
    let app = app(&harness, false);
    let token = login_token(&app, "user@x.com").await?;

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/audit", Some(&token))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "This action is unauthorized.");

    let (status, _) = send(&app, empty_request(Method::DELETE, "/v1/audit", Some(&token))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn admin_lists_and_clears() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("admin@x.com", StaffRole::Admin, true).await?;
    let app = app(&harness, false);
    let token = login_token(&app, "admin@x.com").await?;

    let (status, body) = send(
        &app,
        empty_request(Method::GET, "/v1/login-attempts?limit=5", Some(&token))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["succeeded"], true);

    let (status, body) = send(&app, empty_request(Method::DELETE, "/v1/audit", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "removed": 1 }));

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/audit", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["action"], "audit_cleared");
    Ok(())
}

#[tokio::test]
async fn change_password_over_http() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_staff("a@x.com", StaffRole::User, true).await?;
    let app = app(&harness, false);
    let token = login_token(&app, "a@x.com").await?;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/auth/password",
            Some(&token),
            &json!({ "current_password": "wrong-one", "password": "brand-new-pass" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["current_password"][0],
        "The provided password does not match your current password."
    );

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/auth/password",
            Some(&token),
            &json!({ "current_password": PASSWORD, "password": "brand-new-pass" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password updated.");
    Ok(())
}

#[tokio::test]
async fn ledger_outage_is_a_server_error() -> Result<()> {
    let harness = Harness::new()?;
    harness.store.set_ledger_available(false);
    let app = app(&harness, false);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "email": "a@x.com", "password": PASSWORD }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Server Error" }));

    let (status, body) = send(&app, empty_request(Method::GET, "/health", None)?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "error");
    Ok(())
}

#[tokio::test]
async fn health_and_request_id() -> Result<()> {
    let harness = Harness::new()?;
    let app = app(&harness, false);

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/health", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-app"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["database"], "ok");
    Ok(())
}
