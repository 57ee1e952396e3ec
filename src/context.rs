//! Per-request state owned by the dispatcher.

use axum::http::{HeaderValue, header};
use axum::response::Response;

use crate::auth::{AuthScheme, Principal};
use crate::identity::IdentityClient;
use crate::negotiate::ContentType;

/// State of one in-flight request. Dropped (and with it the identity
/// client) when the request finishes, whatever the outcome.
pub struct RequestContext {
    /// Representation negotiated for the matched route
    pub content_type: ContentType,
    pub principal: Option<Principal>,
    /// Identity client scoped to this request
    pub client: Box<dyn IdentityClient>,
    /// Path and query as received
    pub original_uri: String,
    pub is_https: bool,
    response_cookies: Vec<HeaderValue>,
    /// Access token minted from the refresh cookie while resolving the principal
    refreshed_access_token: Option<String>,
}

impl RequestContext {
    pub fn new(client: Box<dyn IdentityClient>, original_uri: String, is_https: bool) -> Self {
        Self {
            content_type: ContentType::Json,
            principal: None,
            client,
            original_uri,
            is_https,
            response_cookies: Vec::new(),
            refreshed_access_token: None,
        }
    }

    pub fn scheme(&self) -> Option<AuthScheme> {
        self.principal.as_ref().map(|p| p.scheme)
    }

    pub fn client(&self) -> &dyn IdentityClient {
        self.client.as_ref()
    }

    /// Queue a `Set-Cookie` value for the final response.
    pub fn set_cookie(&mut self, value: HeaderValue) {
        self.response_cookies.push(value);
    }

    pub fn pending_cookies(&self) -> &[HeaderValue] {
        &self.response_cookies
    }

    pub fn record_refreshed_access_token(&mut self, token: String) {
        self.refreshed_access_token = Some(token);
    }

    /// Drop every queued cookie and hand back the access token minted during
    /// resolution, if any. Used when the session ends in this request.
    pub fn discard_refreshed_session(&mut self) -> Option<String> {
        self.response_cookies.clear();
        self.refreshed_access_token.take()
    }

    /// Append every queued cookie to `response`.
    pub fn apply_cookies(&mut self, response: &mut Response) {
        let headers = response.headers_mut();
        for value in self.response_cookies.drain(..) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
