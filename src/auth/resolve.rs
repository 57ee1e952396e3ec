//! Resolve the principal for a request.
//!
//! Tries, in order: an `Authorization: Bearer` header, the access-token
//! cookie, and finally the refresh-token cookie. A refresh grant issues a new
//! access token whose cookie is queued on the context. Every failure simply
//! leaves the principal absent.

use axum::http::{HeaderMap, header};
use tracing::debug;

use super::cookie::RequestCookies;
use super::types::{AuthScheme, Principal};
use crate::config::WebConfig;
use crate::context::RequestContext;
use crate::identity::TokenPair;
use crate::tokens::write_token_cookies;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn resolve_principal(ctx: &mut RequestContext, headers: &HeaderMap, web: &WebConfig) {
    if let Some(token) = bearer_token(headers) {
        let result = ctx.client().authenticate_access_token(token).await;
        match result {
            Ok(account) => {
                ctx.principal = Some(Principal {
                    account,
                    scheme: AuthScheme::Bearer,
                });
                return;
            }
            Err(e) => debug!(error = %e, "Bearer token rejected"),
        }
    }

    let cookies = RequestCookies::from_headers(headers);

    if let Some(token) = cookies
        .get(&web.access_token_cookie.name)
        .filter(|t| !t.is_empty())
    {
        let result = ctx.client().authenticate_access_token(token).await;
        match result {
            Ok(account) => {
                ctx.principal = Some(Principal {
                    account,
                    scheme: AuthScheme::Cookie,
                });
                return;
            }
            Err(e) => debug!(error = %e, "Access token cookie rejected"),
        }
    }

    // Access token missing or invalid - try refresh token
    let Some(refresh_token) = cookies
        .get(&web.refresh_token_cookie.name)
        .filter(|t| !t.is_empty())
    else {
        return;
    };

    let result = ctx.client().refresh_grant(refresh_token).await;
    let grant = match result {
        Ok(grant) => grant,
        Err(e) => {
            debug!(error = %e, "Refresh token cookie rejected");
            return;
        }
    };

    // Only the access cookie changes, the refresh cookie stays as sent
    let access_only = TokenPair {
        access_token: grant.tokens.access_token,
        refresh_token: None,
        expires_in: grant.tokens.expires_in,
    };
    write_token_cookies(web, ctx, &access_only);
    ctx.record_refreshed_access_token(access_only.access_token);
    ctx.principal = Some(Principal {
        account: grant.account,
        scheme: AuthScheme::Cookie,
    });
}
