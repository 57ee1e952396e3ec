mod common;

use axum::http::StatusCode;
use common::{
    app, body_json, cookie_value, get, location, post_form, set_cookies, tokens, with_cookie,
};
use tower::ServiceExt;

fn logout(accept: &str, cookie: Option<&str>) -> axum::http::Request<axum::body::Body> {
    let request = post_form("/logout", accept, "");
    match cookie {
        Some(cookie) => with_cookie(request, cookie),
        None => request,
    }
}

#[tokio::test]
async fn test_revokes_both_tokens() {
    let app = app().await;
    let (access, refresh) = tokens(&app).await;
    assert_eq!(app.directory.memory.active_token_count().await, 2);

    let cookie = format!("access_token={}; refresh_token={}", access, refresh);
    let response = app
        .router
        .oneshot(logout("text/html", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    assert_eq!(app.directory.fetch_calls(), 2);
    assert_eq!(app.directory.memory.active_token_count().await, 0);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    assert!(cookies.iter().any(|c| c.starts_with("access_token=;")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=;")));
}

#[tokio::test]
async fn test_access_cookie_only() {
    let app = app().await;
    let (access, _) = tokens(&app).await;

    let cookie = format!("access_token={}", access);
    let response = app
        .router
        .oneshot(logout("application/json", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.directory.fetch_calls(), 1);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("access_token=;"));
    assert_eq!(body_json(response).await, serde_json::json!({}));
}

#[tokio::test]
async fn test_succeeds_when_revocation_fails() {
    let app = app().await;
    let (access, _) = tokens(&app).await;
    app.directory.fail_revocation();

    let cookie = format!("access_token={}", access);
    let response = app
        .router
        .oneshot(logout("application/json", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.directory.fetch_calls(), 1);
    assert_eq!(set_cookies(&response).len(), 1);
    // Nothing was deleted remotely, the local session still ends
    assert_eq!(app.directory.memory.active_token_count().await, 2);
}

#[tokio::test]
async fn test_invalid_cookies_skip_revocation() {
    let app = app().await;

    let response = app
        .router
        .oneshot(logout(
            "application/json",
            Some("access_token=not-a-jwt; refresh_token="),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.directory.fetch_calls(), 0);
    // Both cookies were sent, so both are deleted
    assert_eq!(set_cookies(&response).len(), 2);
}

#[tokio::test]
async fn test_without_cookies_is_a_no_op() {
    let app = app().await;

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(logout("application/json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
    }
    assert_eq!(app.directory.fetch_calls(), 0);
}

#[tokio::test]
async fn test_session_is_gone_after_logout() {
    let app = app().await;
    let (access, refresh) = tokens(&app).await;
    let cookie = format!("access_token={}; refresh_token={}", access, refresh);

    app.router
        .clone()
        .oneshot(logout("application/json", Some(&cookie)))
        .await
        .unwrap();

    // A client that ignores the deletion cookies is still logged out
    let response = app
        .router
        .oneshot(with_cookie(get("/me", "application/json"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_cookie_only_ends_session() {
    let app = app().await;
    let (_, refresh) = tokens(&app).await;
    let cookie = format!("refresh_token={}", refresh);

    let response = app
        .router
        .clone()
        .oneshot(logout("application/json", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Only the refresh cookie is deleted, no renewed access cookie is handed out
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("refresh_token=;"));
    assert!(cookie_value(&cookies, "access_token").is_none());

    // The refresh token and the access token renewed from it are both revoked
    assert_eq!(app.directory.fetch_calls(), 2);
    assert_eq!(app.directory.memory.active_token_count().await, 1);

    let response = app
        .router
        .oneshot(with_cookie(get("/me", "application/json"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_not_allowed() {
    let app = app().await;

    let response = app
        .router
        .oneshot(get("/logout", "application/json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
