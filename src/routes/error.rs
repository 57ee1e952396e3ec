//! Shared error handling for route handlers.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::auth::error_response;
use crate::identity::IdentityError;

/// Extension trait for concise error mapping on identity results.
pub trait ResultExt<T> {
    fn identity_err(self, context: &str) -> Result<T, RouteError>;
}

impl<T> ResultExt<T> for Result<T, IdentityError> {
    fn identity_err(self, context: &str) -> Result<T, RouteError> {
        self.map_err(|e| RouteError::identity(context, e))
    }
}

/// Route error type with automatic response conversion.
#[derive(Debug)]
pub enum RouteError {
    BadRequest(String),
    /// Carries the value of the `Allow` header.
    MethodNotAllowed(&'static str),
    /// The identity provider could not be reached.
    BadGateway(String),
    Internal(String),
}

impl RouteError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn identity(context: &str, e: IdentityError) -> Self {
        match e {
            IdentityError::Rejected(remote) => Self::BadRequest(remote.message),
            IdentityError::InvalidToken(_) => Self::BadRequest("Token is invalid or has expired.".into()),
            IdentityError::Unavailable(detail) => {
                error!("{}: {}", context, detail);
                Self::BadGateway("Identity service unavailable".into())
            }
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            RouteError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            RouteError::MethodNotAllowed(allow) => {
                let mut response =
                    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(allow));
                return response;
            }
            RouteError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            RouteError::Internal(msg) => {
                error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        error_response(status, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RemoteError;

    #[test]
    fn test_identity_mapping() {
        let rejected = RouteError::identity(
            "ctx",
            IdentityError::Rejected(RemoteError::new(409, "Account already exists.")),
        );
        assert!(matches!(rejected, RouteError::BadRequest(ref m) if m == "Account already exists."));

        let down = RouteError::identity("ctx", IdentityError::Unavailable("timeout".into()));
        assert_eq!(down.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = RouteError::MethodNotAllowed("POST").into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }
}
