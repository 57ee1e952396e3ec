//! Authentication user types.

use serde::Deserialize;

use crate::identity::Account;

/// How the caller proved who they are on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Access (or refresh) token cookie
    Cookie,
    /// `Authorization: Bearer` header
    Bearer,
}

/// Scheme a protected route insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredScheme {
    #[default]
    Any,
    Cookie,
    Bearer,
}

impl RequiredScheme {
    pub fn accepts(&self, scheme: AuthScheme) -> bool {
        match self {
            RequiredScheme::Any => true,
            RequiredScheme::Cookie => scheme == AuthScheme::Cookie,
            RequiredScheme::Bearer => scheme == AuthScheme::Bearer,
        }
    }
}

/// Authenticated caller. Only constructed after the identity provider
/// verified a cookie or bearer token for the current request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account: Account,
    pub scheme: AuthScheme,
}
