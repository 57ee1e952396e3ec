//! Authentication gate for routes that require a principal.
//!
//! The gate never assumes a browser. Clients that prefer HTML are redirected
//! to the login page with a `next` parameter pointing back at the original
//! URI; everyone else gets a JSON 401.

use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::cookie::RequestCookies;
use super::errors::Unauthorized;
use super::types::{AuthScheme, Principal, RequiredScheme};
use crate::config::WebConfig;
use crate::context::RequestContext;
use crate::negotiate::{ContentType, select_best_content_type};
use crate::tokens::delete_token_cookies;

/// Representations the gate can answer with, HTML first.
const GATE_CONTENT_TYPES: [ContentType; 2] = [ContentType::Html, ContentType::Json];

/// Authorized iff there is a principal and the scheme it used is acceptable.
pub fn is_authorized(
    request_scheme: Option<AuthScheme>,
    required: RequiredScheme,
    principal: Option<&Principal>,
) -> bool {
    match (principal, request_scheme) {
        (Some(_), Some(scheme)) => required.accepts(scheme),
        _ => false,
    }
}

/// `{login_uri}?next={original_uri}` with the original URI percent-escaped.
pub fn login_redirect_location(login_uri: &str, original_uri: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", original_uri)
        .finish();
    let separator = if login_uri.contains('?') { '&' } else { '?' };
    format!("{}{}{}", login_uri, separator, query)
}

pub struct AuthenticationGate<'a> {
    web: &'a WebConfig,
}

impl<'a> AuthenticationGate<'a> {
    pub fn new(web: &'a WebConfig) -> Self {
        Self { web }
    }

    /// Let the request through, or produce the unauthenticated response.
    pub fn check(
        &self,
        ctx: &mut RequestContext,
        headers: &HeaderMap,
        required: RequiredScheme,
    ) -> Result<(), Response> {
        if is_authorized(ctx.scheme(), required, ctx.principal.as_ref()) {
            return Ok(());
        }

        tracing::info!(
            uri = %ctx.original_uri,
            "User attempted to access a protected endpoint with invalid credentials"
        );
        Err(self.on_unauthorized(ctx, headers))
    }

    pub fn on_unauthorized(&self, ctx: &mut RequestContext, headers: &HeaderMap) -> Response {
        if ctx.discard_refreshed_session().is_some() {
            tracing::debug!(uri = %ctx.original_uri, "Dropping access cookie renewed for a rejected request");
        }
        let cookies = RequestCookies::from_headers(headers);
        delete_token_cookies(self.web, &cookies, ctx);

        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok());
        match select_best_content_type(accept, &GATE_CONTENT_TYPES) {
            ContentType::Html => {
                let location = login_redirect_location(&self.web.login.uri, &ctx.original_uri);
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            ContentType::Json => Unauthorized.into_response(),
        }
    }
}
