//! Logout route.
//!
//! Logout always succeeds locally. Revoking the tokens at the identity
//! provider is best effort and never changes the response.

use axum::{
    Json,
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::{RouteError, hook_context, redirect};
use crate::auth::RequestCookies;
use crate::context::RequestContext;
use crate::gateway::GatewayState;
use crate::negotiate::ContentType;
use crate::tokens::{TokenLifecycle, delete_token_cookies};

pub(super) async fn handle(
    state: &GatewayState,
    ctx: &mut RequestContext,
    request: Request,
) -> Result<Response, RouteError> {
    let (parts, _body) = request.into_parts();
    if parts.method != Method::POST {
        return Err(RouteError::MethodNotAllowed("POST"));
    }
    let web = &state.config.web;

    let hook_ctx = hook_context(&parts, ctx);
    state.hooks.pre_logout(&hook_ctx, ctx.principal.as_ref()).await;

    let account = ctx.principal.take().map(|p| p.account.href);
    // A refresh during resolution must not outlive the session
    let refreshed = ctx.discard_refreshed_session();
    let cookies = RequestCookies::from_headers(&parts.headers);

    let report = TokenLifecycle::new(web, state.config.signing_secret(), ctx.client())
        .revoke(&cookies, refreshed.as_deref())
        .await;
    let deleted = delete_token_cookies(web, &cookies, ctx);

    info!(
        account = account.as_deref().unwrap_or("-"),
        attempted = report.attempted,
        revoked = report.revoked,
        deleted,
        "Logged out"
    );

    state.hooks.post_logout(&hook_ctx).await;

    Ok(match ctx.content_type {
        ContentType::Html => redirect(&web.logout.next_uri),
        ContentType::Json => Json(serde_json::json!({})).into_response(),
    })
}
