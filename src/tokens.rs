//! Token lifecycle: issue tokens into cookies, recognise valid JWTs, revoke
//! tokens at the identity provider and delete their cookies.
//!
//! Revocation is best effort. Each of the two tokens is revoked on its own,
//! both run concurrently, and a failure on one never prevents or fails the
//! other. Failures are logged and otherwise ignored.

use futures::future;
use tracing::{debug, info};

use crate::auth::{RequestCookies, encode_deletion_cookie, encode_token_cookie};
use crate::config::WebConfig;
use crate::context::RequestContext;
use crate::identity::{
    Grant, IdentityClient, IdentityError, JwtClaims, RemoteError, TokenKind, TokenPair,
};

/// Outcome of checking a token string as a signed JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwtCheck {
    Valid(JwtClaims),
    Invalid,
}

/// Outcome of a grant the identity provider answered.
#[derive(Debug, Clone)]
pub enum Issuance {
    Issued(Grant),
    Rejected(RemoteError),
}

/// Credentials to exchange for tokens.
#[derive(Debug, Clone, Copy)]
pub enum GrantRequest<'a> {
    Password { login: &'a str, password: &'a str },
    RefreshToken(&'a str),
    ClientCredentials { id: &'a str, secret: &'a str },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevocationReport {
    /// Tokens that were valid JWTs and therefore revoked remotely
    pub attempted: usize,
    /// Tokens the provider confirmed deleted
    pub revoked: usize,
}

pub struct TokenLifecycle<'a> {
    web: &'a WebConfig,
    signing_secret: &'a [u8],
    client: &'a dyn IdentityClient,
}

impl<'a> TokenLifecycle<'a> {
    pub fn new(web: &'a WebConfig, signing_secret: &'a [u8], client: &'a dyn IdentityClient) -> Self {
        Self {
            web,
            signing_secret,
            client,
        }
    }

    /// Exchange credentials for tokens.
    ///
    /// A refusal by the provider is a normal outcome ([`Issuance::Rejected`]);
    /// only an unreachable provider is an error.
    pub async fn issue(&self, request: GrantRequest<'_>) -> Result<Issuance, IdentityError> {
        let result = match request {
            GrantRequest::Password { login, password } => {
                self.client.password_grant(login, password).await
            }
            GrantRequest::RefreshToken(token) => self.client.refresh_grant(token).await,
            GrantRequest::ClientCredentials { id, secret } => {
                self.client.client_credentials_grant(id, secret).await
            }
        };

        match result {
            Ok(grant) => Ok(Issuance::Issued(grant)),
            Err(IdentityError::Rejected(remote)) => Ok(Issuance::Rejected(remote)),
            Err(IdentityError::InvalidToken(detail)) => Ok(Issuance::Rejected(
                RemoteError::new(400, "Token is invalid or has expired.")
                    .with_developer_message(detail),
            )),
            Err(e @ IdentityError::Unavailable(_)) => Err(e),
        }
    }

    /// A token is valid when it is non-empty and its signature verifies.
    /// Parse failures are never propagated.
    pub fn validate_jwt(&self, token: Option<&str>) -> JwtCheck {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return JwtCheck::Invalid;
        };
        match self.client.parse_jwt(token, self.signing_secret) {
            Ok(claims) => JwtCheck::Valid(claims),
            Err(e) => {
                debug!(error = %e, "Token is not a valid JWT");
                JwtCheck::Invalid
            }
        }
    }

    /// Revoke the access and refresh tokens found in `cookies`, plus an
    /// access token minted during this request that the client never sent.
    ///
    /// Missing and invalid tokens are skipped alike.
    pub async fn revoke(
        &self,
        cookies: &RequestCookies,
        refreshed_access: Option<&str>,
    ) -> RevocationReport {
        let access = self.revocation_target(
            cookies.get(&self.web.access_token_cookie.name),
            TokenKind::Access,
        );
        let refresh = self.revocation_target(
            cookies.get(&self.web.refresh_token_cookie.name),
            TokenKind::Refresh,
        );
        let minted = self.revocation_target(refreshed_access, TokenKind::Access);
        let attempted = [&access, &refresh, &minted]
            .iter()
            .filter(|target| target.is_some())
            .count();

        let (access_revoked, refresh_revoked, minted_revoked) = future::join3(
            self.revoke_one(access),
            self.revoke_one(refresh),
            self.revoke_one(minted),
        )
        .await;

        RevocationReport {
            attempted,
            revoked: [access_revoked, refresh_revoked, minted_revoked]
                .into_iter()
                .filter(|&revoked| revoked)
                .count(),
        }
    }

    fn revocation_target(&self, token: Option<&str>, kind: TokenKind) -> Option<(TokenKind, String)> {
        match self.validate_jwt(token) {
            JwtCheck::Valid(claims) => Some((kind, claims.jti)),
            JwtCheck::Invalid => None,
        }
    }

    async fn revoke_one(&self, target: Option<(TokenKind, String)>) -> bool {
        let Some((kind, jti)) = target else {
            return false;
        };

        let resource = match self.client.fetch_token(kind, &jti).await {
            Ok(resource) => resource,
            Err(e) => {
                info!(kind = kind.as_str(), jti = %jti, error = %e.detail(), "Failed to look up token for revocation");
                return false;
            }
        };

        match self.client.delete_token(&resource).await {
            Ok(()) => {
                debug!(kind = kind.as_str(), jti = %jti, "Token revoked");
                true
            }
            Err(e) => {
                info!(kind = kind.as_str(), jti = %jti, error = %e.detail(), "Failed to revoke token");
                false
            }
        }
    }
}

/// Queue cookies for a freshly issued token pair.
///
/// The access cookie lives as long as configured, or as long as the token.
/// The refresh cookie lives as long as configured, or for the browser session.
pub fn write_token_cookies(web: &WebConfig, ctx: &mut RequestContext, tokens: &TokenPair) {
    let access_age = web
        .access_token_cookie
        .max_age
        .unwrap_or(tokens.expires_in.as_secs());
    if let Some(value) = encode_token_cookie(
        &web.access_token_cookie,
        &tokens.access_token,
        Some(access_age),
        ctx.is_https,
    ) {
        ctx.set_cookie(value);
    }

    if let Some(ref refresh) = tokens.refresh_token {
        if let Some(value) = encode_token_cookie(
            &web.refresh_token_cookie,
            refresh,
            web.refresh_token_cookie.max_age,
            ctx.is_https,
        ) {
            ctx.set_cookie(value);
        }
    }
}

/// Queue deletions for the token cookies the client actually sent.
/// Returns how many deletions were queued.
pub fn delete_token_cookies(
    web: &WebConfig,
    cookies: &RequestCookies,
    ctx: &mut RequestContext,
) -> usize {
    let mut deleted = 0;
    for config in [&web.access_token_cookie, &web.refresh_token_cookie] {
        if !cookies.contains(&config.name) {
            continue;
        }
        if let Some(value) = encode_deletion_cookie(config, ctx.is_https) {
            ctx.set_cookie(value);
            deleted += 1;
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MemoryDirectory, NewAccount};
    use axum::http::{HeaderMap, HeaderValue, header};
    use std::time::Duration;

    const SECRET: &[u8] = b"token-lifecycle-test-secret";

    async fn directory_with_alice() -> MemoryDirectory {
        let dir = MemoryDirectory::new(SECRET);
        dir.add_account(NewAccount {
            email: "alice@example.com".to_string(),
            password: "correct horse".to_string(),
            ..NewAccount::default()
        })
        .await
        .unwrap();
        dir
    }

    fn cookies(raw: &str) -> RequestCookies {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(raw).unwrap());
        RequestCookies::from_headers(&headers)
    }

    fn context(dir: &MemoryDirectory) -> RequestContext {
        RequestContext::new(Box::new(dir.clone()), "/logout".to_string(), false)
    }

    #[tokio::test]
    async fn test_issue_rejected_is_not_an_error() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);

        let outcome = lifecycle
            .issue(GrantRequest::Password {
                login: "alice@example.com",
                password: "nope",
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Issuance::Rejected(r) if r.status == 400));
    }

    #[tokio::test]
    async fn test_validate_jwt() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);

        let Issuance::Issued(grant) = lifecycle
            .issue(GrantRequest::Password {
                login: "alice@example.com",
                password: "correct horse",
            })
            .await
            .unwrap()
        else {
            panic!("expected tokens");
        };

        assert!(matches!(
            lifecycle.validate_jwt(Some(&grant.tokens.access_token)),
            JwtCheck::Valid(_)
        ));
        assert_eq!(lifecycle.validate_jwt(None), JwtCheck::Invalid);
        assert_eq!(lifecycle.validate_jwt(Some("")), JwtCheck::Invalid);
        assert_eq!(lifecycle.validate_jwt(Some("garbage")), JwtCheck::Invalid);

        let other = TokenLifecycle::new(&web, b"another-secret", &dir);
        assert_eq!(
            other.validate_jwt(Some(&grant.tokens.access_token)),
            JwtCheck::Invalid
        );
    }

    #[tokio::test]
    async fn test_revoke_both_tokens() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);
        let grant = dir
            .password_grant("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(dir.active_token_count().await, 2);

        let jar = cookies(&format!(
            "access_token={}; refresh_token={}",
            grant.tokens.access_token,
            grant.tokens.refresh_token.unwrap()
        ));
        let report = lifecycle.revoke(&jar, None).await;

        assert_eq!(report, RevocationReport { attempted: 2, revoked: 2 });
        assert_eq!(dir.active_token_count().await, 0);
    }

    #[tokio::test]
    async fn test_revoke_skips_missing_and_invalid() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);

        let report = lifecycle.revoke(&RequestCookies::default(), None).await;
        assert_eq!(report, RevocationReport::default());

        let report = lifecycle
            .revoke(&cookies("access_token=garbage; refresh_token="), Some("garbage"))
            .await;
        assert_eq!(report, RevocationReport::default());
    }

    #[tokio::test]
    async fn test_revoke_failure_is_isolated() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);
        let grant = dir
            .password_grant("alice@example.com", "correct horse")
            .await
            .unwrap();

        // Revoke the access token first so its second revocation fails remotely
        let jar = cookies(&format!("access_token={}", grant.tokens.access_token));
        assert_eq!(lifecycle.revoke(&jar, None).await.revoked, 1);

        let jar = cookies(&format!(
            "access_token={}; refresh_token={}",
            grant.tokens.access_token,
            grant.tokens.refresh_token.unwrap()
        ));
        let report = lifecycle.revoke(&jar, None).await;
        assert_eq!(report, RevocationReport { attempted: 2, revoked: 1 });
        assert_eq!(dir.active_token_count().await, 0);
    }

    #[tokio::test]
    async fn test_revoke_refreshed_access_token() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let lifecycle = TokenLifecycle::new(&web, SECRET, &dir);
        let grant = dir
            .password_grant("alice@example.com", "correct horse")
            .await
            .unwrap();
        let refresh = grant.tokens.refresh_token.unwrap();
        let renewed = dir.refresh_grant(&refresh).await.unwrap();
        assert_eq!(dir.active_token_count().await, 3);

        // The browser only holds the refresh cookie; the renewed access token
        // exists solely in this request
        let jar = cookies(&format!("refresh_token={}", refresh));
        let report = lifecycle
            .revoke(&jar, Some(&renewed.tokens.access_token))
            .await;

        assert_eq!(report, RevocationReport { attempted: 2, revoked: 2 });
        assert_eq!(dir.active_token_count().await, 1);
        assert!(dir
            .authenticate_access_token(&renewed.tokens.access_token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_write_token_cookies() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let mut ctx = context(&dir);

        let tokens = TokenPair {
            access_token: "aaa".to_string(),
            refresh_token: Some("rrr".to_string()),
            expires_in: Duration::from_secs(120),
        };
        write_token_cookies(&web, &mut ctx, &tokens);

        let written: Vec<&str> = ctx
            .pending_cookies()
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(written.len(), 2);
        assert!(written[0].starts_with("access_token=aaa"));
        assert!(written[0].contains("Max-Age=120"));
        assert!(written[1].starts_with("refresh_token=rrr"));
        assert!(!written[1].contains("Max-Age"));
    }

    #[tokio::test]
    async fn test_delete_only_present_cookies() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let mut ctx = context(&dir);

        let deleted = delete_token_cookies(&web, &cookies("access_token=x; other=1"), &mut ctx);
        assert_eq!(deleted, 1);
        assert_eq!(ctx.pending_cookies().len(), 1);
        assert!(ctx.pending_cookies()[0]
            .to_str()
            .unwrap()
            .starts_with("access_token=;"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_without_cookies() {
        let dir = directory_with_alice().await;
        let web = WebConfig::default();
        let mut ctx = context(&dir);
        let jar = cookies("other=1");

        assert_eq!(delete_token_cookies(&web, &jar, &mut ctx), 0);
        assert_eq!(delete_token_cookies(&web, &jar, &mut ctx), 0);
        assert!(ctx.pending_cookies().is_empty());
    }
}
