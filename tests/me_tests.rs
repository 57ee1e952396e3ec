mod common;

use authgate::auth::RequiredScheme;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    EMAIL, TestSetup, app, body_json, cookie_value, get, location, set_cookies, tokens,
    with_cookie,
};
use tower::ServiceExt;

fn bearer(uri: &str, token: &str) -> Request<Body> {
    let mut request = get(uri, "application/json");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

#[tokio::test]
async fn test_json_without_principal_is_unauthorized() {
    let app = app().await;

    let response = app
        .router
        .oneshot(get("/me", "application/json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"status": 401, "message": "Unauthorized"}));
}

#[tokio::test]
async fn test_html_without_principal_redirects_to_login() {
    let app = app().await;

    let response = app.router.oneshot(get("/me", "text/html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login?next=%2Fme");
}

#[tokio::test]
async fn test_missing_accept_is_treated_as_browser() {
    let app = app().await;
    let request = Request::builder().uri("/me").body(Body::empty()).unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_cookie_returns_account() {
    let app = app().await;
    let (access, _) = tokens(&app).await;

    let request = with_cookie(
        get("/me", "application/json"),
        &format!("access_token={}", access),
    );
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-cache, no-store"
    );
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let json = body_json(response).await;
    assert_eq!(json["account"]["email"], EMAIL);
    assert_eq!(json["account"]["givenName"], "Alice");
    assert_eq!(json["account"]["status"], "ENABLED");
}

#[tokio::test]
async fn test_bearer_returns_account() {
    let app = app().await;
    let (access, _) = tokens(&app).await;

    let response = app.router.oneshot(bearer("/me", &access)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["account"]["email"], EMAIL);
}

#[tokio::test]
async fn test_required_bearer_rejects_cookie() {
    let app = TestSetup::new()
        .with_config(|c| c.web.me.required_scheme = RequiredScheme::Bearer)
        .build()
        .await;
    let (access, _) = tokens(&app).await;

    let request = with_cookie(
        get("/me", "application/json"),
        &format!("access_token={}", access),
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.router.oneshot(bearer("/me", &access)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_cookie_alone_renews_access() {
    let app = app().await;
    let (_, refresh) = tokens(&app).await;

    let request = with_cookie(
        get("/me", "application/json"),
        &format!("refresh_token={}", refresh),
    );
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let renewed = cookie_value(&cookies, "access_token").unwrap();
    assert!(!renewed.is_empty());
    assert!(cookie_value(&cookies, "refresh_token").is_none());
}

#[tokio::test]
async fn test_stale_cookie_is_deleted_on_unauthorized() {
    let app = app().await;

    let request = with_cookie(get("/me", "application/json"), "access_token=stale");
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookie_value(&cookies, "access_token").as_deref(), Some(""));
    assert!(cookies[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_post_not_allowed() {
    let app = app().await;
    let (access, _) = tokens(&app).await;

    let mut request = bearer("/me", &access);
    *request.method_mut() = axum::http::Method::POST;
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET");
}
