//! Identity-provider client interface.
//!
//! The gateway never talks to an identity provider directly. It asks an
//! [`IdentityClientFactory`] for a client scoped to the current request and
//! drives account lookup, token issuance and revocation through
//! [`IdentityClient`]. [`MemoryDirectory`] is an in-process implementation
//! for local development and tests.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryDirectory;

/// An account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub href: String,
    pub username: String,
    pub email: String,
    pub given_name: String,
    pub surname: String,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Enabled,
    Unverified,
    Disabled,
}

/// Data for a new account, collected by the registration route.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub given_name: String,
    pub surname: String,
    pub username: Option<String>,
    /// Submitted values for fields the gateway does not interpret itself.
    pub custom_data: serde_json::Map<String, serde_json::Value>,
}

/// A social or directory account store the login page can offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStore {
    pub name: String,
    pub href: String,
    pub provider_id: String,
    pub client_id: Option<String>,
    pub scope: Option<String>,
}

/// Tokens issued by a successful grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent for grants that never issue one (client credentials).
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

/// Result of a successful grant: the tokens and the account they belong to.
#[derive(Debug, Clone)]
pub struct Grant {
    pub tokens: TokenPair,
    pub account: Account,
}

/// Verified JWT payload, as far as the gateway cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwtClaims {
    pub jti: String,
    pub sub: String,
    pub exp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    /// Path of the remote token resource for the given token id.
    pub fn resource_path(&self, jti: &str) -> String {
        match self {
            TokenKind::Access => format!("/accessTokens/{}", jti),
            TokenKind::Refresh => format!("/refreshTokens/{}", jti),
        }
    }
}

/// A remote token resource that can be deleted to revoke the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResource {
    pub kind: TokenKind,
    pub jti: String,
    pub href: String,
}

/// Error payload returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteError {
    pub status: u16,
    pub code: Option<u32>,
    /// Message safe to show to end users.
    pub message: String,
    #[serde(skip)]
    pub developer_message: Option<String>,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            developer_message: None,
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_developer_message(mut self, message: impl Into<String>) -> Self {
        self.developer_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// The provider understood the request and refused it (bad credentials,
    /// duplicate account, unknown token...).
    #[error("identity provider rejected the request: {}", .0.message)]
    Rejected(RemoteError),
    /// The provider could not be reached or failed internally.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    /// A token could not be parsed or its signature did not verify.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl IdentityError {
    /// Developer-facing detail, falling back to the display form.
    pub fn detail(&self) -> String {
        match self {
            IdentityError::Rejected(remote) => remote
                .developer_message
                .clone()
                .unwrap_or_else(|| remote.message.clone()),
            other => other.to_string(),
        }
    }
}

/// Options applied to a per-request client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedClientOptions {
    pub user_agent: String,
}

/// Operations the gateway needs from the identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Resolve the account an access token belongs to.
    async fn authenticate_access_token(&self, token: &str) -> Result<Account, IdentityError>;

    async fn password_grant(&self, login: &str, password: &str) -> Result<Grant, IdentityError>;

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Grant, IdentityError>;

    async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Grant, IdentityError>;

    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError>;

    async fn account_stores(&self) -> Result<Vec<AccountStore>, IdentityError>;

    /// Parse `token` and verify its signature with `signing_secret`.
    fn parse_jwt(&self, token: &str, signing_secret: &[u8]) -> Result<JwtClaims, IdentityError>;

    async fn fetch_token(&self, kind: TokenKind, jti: &str)
    -> Result<TokenResource, IdentityError>;

    async fn delete_token(&self, token: &TokenResource) -> Result<(), IdentityError>;
}

/// Creates one client per request. The client is dropped when the request ends.
pub trait IdentityClientFactory: Send + Sync + 'static {
    fn create(&self, options: ScopedClientOptions) -> Box<dyn IdentityClient>;
}
