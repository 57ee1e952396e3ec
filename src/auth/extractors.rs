//! Axum extractors for application handlers mounted behind the gateway.
//!
//! The dispatcher stores the resolved [`Principal`] in the request extensions
//! before forwarding a request it does not handle itself. These extractors
//! only read it back, they never talk to the identity provider.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::Unauthorized;
use super::types::Principal;

/// Extractor for handlers that require an authenticated caller.
/// Rejects with the JSON 401 body.
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or(Unauthorized)
    }
}

/// Optional authentication extractor - never fails.
pub struct MaybeAuthenticated(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(parts.extensions.get::<Principal>().cloned()))
    }
}
