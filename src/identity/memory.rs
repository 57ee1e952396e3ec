//! In-process identity directory.
//!
//! Keeps accounts, API keys and issued token ids in memory. Tokens are
//! signed with [`TokenSigner`] so the gateway can verify them with the same
//! secret. Revoking a token removes its id, after which it no longer
//! authenticates even though its signature still verifies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Account, AccountStatus, AccountStore, Grant, IdentityClient, IdentityClientFactory,
    IdentityError, JwtClaims, NewAccount, RemoteError, ScopedClientOptions, TokenKind, TokenPair,
    TokenResource,
};
use crate::jwt::{TokenSigner, verify_with_secret};

const MIN_PASSWORD_LENGTH: usize = 8;

struct StoredAccount {
    account: Account,
    password: String,
}

struct ApiKey {
    secret: String,
    account_href: String,
}

#[derive(Default)]
struct State {
    /// Keyed by account href
    accounts: HashMap<String, StoredAccount>,
    api_keys: HashMap<String, ApiKey>,
    /// Active token ids
    tokens: HashMap<String, TokenKind>,
}

struct Inner {
    signer: TokenSigner,
    require_verification: bool,
    account_stores: Vec<AccountStore>,
    state: RwLock<State>,
}

/// Cheap to clone; all clones share the same directory.
#[derive(Clone)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl MemoryDirectory {
    pub fn new(signing_secret: &[u8]) -> Self {
        Self::build(signing_secret, false, Vec::new())
    }

    /// New accounts start out unverified instead of enabled.
    pub fn with_email_verification(signing_secret: &[u8]) -> Self {
        Self::build(signing_secret, true, Vec::new())
    }

    fn build(signing_secret: &[u8], require_verification: bool, stores: Vec<AccountStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                signer: TokenSigner::new(signing_secret),
                require_verification,
                account_stores: stores,
                state: RwLock::new(State::default()),
            }),
        }
    }

    /// Replace the advertised account stores. Only valid before the directory is shared.
    pub fn with_account_stores(self, stores: Vec<AccountStore>) -> Self {
        let require_verification = self.inner.require_verification;
        let signer = self.inner.signer.clone();
        Self {
            inner: Arc::new(Inner {
                signer,
                require_verification,
                account_stores: stores,
                state: RwLock::new(State::default()),
            }),
        }
    }

    /// Create an account directly, bypassing validation hooks.
    pub async fn add_account(&self, new: NewAccount) -> Result<Account, IdentityError> {
        self.create(new, self.inner.require_verification).await
    }

    /// Create an account that is enabled whatever the verification policy.
    pub async fn add_verified_account(&self, new: NewAccount) -> Result<Account, IdentityError> {
        self.create(new, false).await
    }

    /// Register an API key for client-credentials grants.
    pub async fn add_api_key(&self, id: &str, secret: &str, account_href: &str) {
        let mut state = self.inner.state.write().await;
        state.api_keys.insert(
            id.to_string(),
            ApiKey {
                secret: secret.to_string(),
                account_href: account_href.to_string(),
            },
        );
    }

    /// Whether the token id is still active (issued and not revoked).
    pub async fn is_token_active(&self, jti: &str) -> bool {
        self.inner.state.read().await.tokens.contains_key(jti)
    }

    pub async fn active_token_count(&self) -> usize {
        self.inner.state.read().await.tokens.len()
    }

    async fn create(
        &self,
        new: NewAccount,
        require_verification: bool,
    ) -> Result<Account, IdentityError> {
        if new.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(IdentityError::Rejected(
                RemoteError::new(
                    400,
                    format!(
                        "Password requires at least {} characters.",
                        MIN_PASSWORD_LENGTH
                    ),
                )
                .with_code(2007),
            ));
        }

        let email = new.email.trim().to_lowercase();
        let username = new
            .username
            .as_deref()
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| email.clone());

        let mut state = self.inner.state.write().await;
        let taken = state
            .accounts
            .values()
            .any(|s| s.account.email == email || s.account.username == username);
        if taken {
            return Err(IdentityError::Rejected(
                RemoteError::new(409, "Account with that email already exists.").with_code(2001),
            ));
        }

        let status = if require_verification {
            AccountStatus::Unverified
        } else {
            AccountStatus::Enabled
        };

        let account = Account {
            href: format!("/accounts/{}", uuid::Uuid::new_v4()),
            username,
            email,
            given_name: new.given_name,
            surname: new.surname,
            status,
        };

        state.accounts.insert(
            account.href.clone(),
            StoredAccount {
                account: account.clone(),
                password: new.password,
            },
        );

        Ok(account)
    }

    /// Sign tokens for an account and record their ids.
    async fn issue(&self, account: Account, with_refresh: bool) -> Result<Grant, IdentityError> {
        let sign = |kind| {
            self.inner
                .signer
                .sign(&account.href, kind)
                .map_err(|e| IdentityError::Unavailable(e.to_string()))
        };
        let access = sign(TokenKind::Access)?;
        let refresh = if with_refresh {
            Some(sign(TokenKind::Refresh)?)
        } else {
            None
        };

        let mut state = self.inner.state.write().await;
        state.tokens.insert(access.jti.clone(), TokenKind::Access);
        if let Some(ref refresh) = refresh {
            state.tokens.insert(refresh.jti.clone(), TokenKind::Refresh);
        }

        Ok(Grant {
            tokens: TokenPair {
                access_token: access.token,
                refresh_token: refresh.map(|r| r.token),
                expires_in: access.lifetime,
            },
            account,
        })
    }

    async fn account_for_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Account, IdentityError> {
        let claims = self
            .inner
            .signer
            .verify(token, kind)
            .map_err(|e| invalid_token().with_developer_message(e.to_string()))
            .map_err(IdentityError::Rejected)?;

        let state = self.inner.state.read().await;
        if !state.tokens.contains_key(&claims.jti) {
            return Err(IdentityError::Rejected(
                invalid_token().with_developer_message(format!("token {} is revoked", claims.jti)),
            ));
        }

        let stored = state
            .accounts
            .get(&claims.sub)
            .ok_or_else(|| IdentityError::Rejected(invalid_token()))?;
        Ok(stored.account.clone())
    }
}

fn invalid_token() -> RemoteError {
    RemoteError::new(401, "Token is invalid or has expired.").with_code(10017)
}

fn invalid_login() -> IdentityError {
    IdentityError::Rejected(RemoteError::new(400, "Invalid username or password.").with_code(7100))
}

fn not_found(href: &str) -> IdentityError {
    IdentityError::Rejected(
        RemoteError::new(404, "The requested resource does not exist.")
            .with_code(404)
            .with_developer_message(format!("{} does not exist", href)),
    )
}

impl IdentityClientFactory for MemoryDirectory {
    fn create(&self, options: ScopedClientOptions) -> Box<dyn IdentityClient> {
        tracing::trace!(user_agent = %options.user_agent, "Creating memory directory client");
        Box::new(self.clone())
    }
}

#[async_trait]
impl IdentityClient for MemoryDirectory {
    async fn authenticate_access_token(&self, token: &str) -> Result<Account, IdentityError> {
        self.account_for_token(token, TokenKind::Access).await
    }

    async fn password_grant(&self, login: &str, password: &str) -> Result<Grant, IdentityError> {
        let login = login.trim().to_lowercase();
        let account = {
            let state = self.inner.state.read().await;
            let stored = state
                .accounts
                .values()
                .find(|s| s.account.username == login || s.account.email == login)
                .filter(|s| s.password == password)
                .ok_or_else(invalid_login)?;

            match stored.account.status {
                AccountStatus::Enabled => stored.account.clone(),
                AccountStatus::Unverified => {
                    return Err(IdentityError::Rejected(
                        RemoteError::new(400, "Login attempt failed because the Account is not verified.")
                            .with_code(7102),
                    ));
                }
                AccountStatus::Disabled => {
                    return Err(IdentityError::Rejected(
                        RemoteError::new(400, "Login attempt failed because the Account is disabled.")
                            .with_code(7101),
                    ));
                }
            }
        };

        self.issue(account, true).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Grant, IdentityError> {
        let account = self
            .account_for_token(refresh_token, TokenKind::Refresh)
            .await?;
        let mut grant = self.issue(account, false).await?;
        grant.tokens.refresh_token = Some(refresh_token.to_string());
        Ok(grant)
    }

    async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Grant, IdentityError> {
        let account = {
            let state = self.inner.state.read().await;
            let key = state
                .api_keys
                .get(client_id)
                .filter(|k| k.secret == client_secret)
                .ok_or_else(|| {
                    IdentityError::Rejected(RemoteError::new(401, "Invalid API key credentials."))
                })?;
            state
                .accounts
                .get(&key.account_href)
                .map(|s| s.account.clone())
                .ok_or_else(|| not_found(&key.account_href))?
        };

        self.issue(account, false).await
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError> {
        self.create(account, self.inner.require_verification).await
    }

    async fn account_stores(&self) -> Result<Vec<AccountStore>, IdentityError> {
        Ok(self.inner.account_stores.clone())
    }

    fn parse_jwt(&self, token: &str, signing_secret: &[u8]) -> Result<JwtClaims, IdentityError> {
        verify_with_secret::<JwtClaims>(token, signing_secret)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))
    }

    async fn fetch_token(
        &self,
        kind: TokenKind,
        jti: &str,
    ) -> Result<TokenResource, IdentityError> {
        let href = kind.resource_path(jti);
        let state = self.inner.state.read().await;
        match state.tokens.get(jti) {
            Some(stored) if *stored == kind => Ok(TokenResource {
                kind,
                jti: jti.to_string(),
                href,
            }),
            _ => Err(not_found(&href)),
        }
    }

    async fn delete_token(&self, token: &TokenResource) -> Result<(), IdentityError> {
        let mut state = self.inner.state.write().await;
        state
            .tokens
            .remove(&token.jti)
            .map(|_| ())
            .ok_or_else(|| not_found(&token.href))
    }
}
