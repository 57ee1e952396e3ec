//! OAuth2 token endpoint (`password`, `refresh_token` and
//! `client_credentials` grants).
//!
//! Tokens are returned in the body only, no cookies are written. Errors use
//! the OAuth2 error format rather than the gateway's usual error body.

use axum::{
    Json,
    extract::Request,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use tracing::info;

use super::form::{field, read_form};
use super::{ResultExt, RouteError};
use crate::context::RequestContext;
use crate::gateway::GatewayState;
use crate::identity::Grant;
use crate::tokens::{GrantRequest, Issuance, TokenLifecycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
}

#[derive(Debug, Serialize)]
pub struct OAuthError {
    error: OAuthErrorCode,
    error_description: String,
}

impl OAuthError {
    fn new(error: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: description.into(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match self.error {
            OAuthErrorCode::InvalidClient => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, no_store(), Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    token_type: &'static str,
    expires_in: u64,
}

impl From<Grant> for TokenResponse {
    fn from(grant: Grant) -> Self {
        Self {
            access_token: grant.tokens.access_token,
            refresh_token: grant.tokens.refresh_token,
            token_type: "Bearer",
            expires_in: grant.tokens.expires_in.as_secs(),
        }
    }
}

fn no_store() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}

pub(super) async fn handle(
    state: &GatewayState,
    ctx: &RequestContext,
    request: Request,
) -> Result<Response, RouteError> {
    let (parts, body) = request.into_parts();
    if parts.method != Method::POST {
        return Err(RouteError::MethodNotAllowed("POST"));
    }
    let form = read_form(&parts.headers, body).await?;
    let oauth = &state.config.web.oauth2;

    let Some(grant_type) = field(&form, "grant_type") else {
        return Ok(OAuthError::new(OAuthErrorCode::InvalidRequest, "Missing grant_type").into_response());
    };

    let basic = basic_credentials(&parts.headers);
    let grant_request = match grant_type {
        "password" if oauth.password_grant => {
            let password = form.get("password").map(String::as_str).filter(|p| !p.is_empty());
            let (Some(login), Some(password)) = (field(&form, "username"), password) else {
                return Ok(OAuthError::new(
                    OAuthErrorCode::InvalidRequest,
                    "Missing username or password",
                )
                .into_response());
            };
            GrantRequest::Password { login, password }
        }
        "refresh_token" if oauth.refresh_token_grant => {
            let Some(token) = field(&form, "refresh_token") else {
                return Ok(OAuthError::new(OAuthErrorCode::InvalidRequest, "Missing refresh_token")
                    .into_response());
            };
            GrantRequest::RefreshToken(token)
        }
        "client_credentials" if oauth.client_credentials_grant => {
            let Some((ref id, ref secret)) = basic else {
                return Ok(OAuthError::new(
                    OAuthErrorCode::InvalidClient,
                    "Client credentials must be sent with HTTP Basic authentication",
                )
                .into_response());
            };
            GrantRequest::ClientCredentials {
                id: id.as_str(),
                secret: secret.as_str(),
            }
        }
        other => {
            info!(grant_type = %other, "Unsupported grant type requested");
            return Ok(OAuthError::new(
                OAuthErrorCode::UnsupportedGrantType,
                format!("Unsupported grant_type: {}", other),
            )
            .into_response());
        }
    };

    let outcome = TokenLifecycle::new(&state.config.web, state.config.signing_secret(), ctx.client())
        .issue(grant_request)
        .await
        .identity_err("Token exchange failed")?;

    match outcome {
        Issuance::Issued(grant) => {
            info!(account = %grant.account.href, grant_type = %grant_type, "Tokens issued");
            Ok((no_store(), Json(TokenResponse::from(grant))).into_response())
        }
        Issuance::Rejected(remote) => {
            let code = match grant_request {
                GrantRequest::ClientCredentials { .. } => OAuthErrorCode::InvalidClient,
                _ => OAuthErrorCode::InvalidGrant,
            };
            // Rejected client credentials are a bad request, not a missing header
            let mut response = OAuthError::new(code, remote.message).into_response();
            *response.status_mut() = StatusCode::BAD_REQUEST;
            Ok(response)
        }
    }
}

/// `(id, secret)` from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id.to_string(), secret.to_string()))
}
