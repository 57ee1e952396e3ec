//! Extension points around login, logout and registration.
//!
//! Every method has a no-op default, so an application only overrides the
//! events it cares about. Hooks run inside the request and may suspend it.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::auth::Principal;
use crate::identity::{Account, NewAccount};
use crate::negotiate::ContentType;

/// What a hook can see of the current request.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub content_type: ContentType,
}

/// Decision of [`GatewayHooks::pre_registration`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreRegistrationResult {
    #[default]
    Continue,
    /// Refuse the registration and show `message` to the user.
    Reject(String),
}

#[async_trait]
pub trait GatewayHooks: Send + Sync + 'static {
    /// Runs before credentials are sent to the identity provider.
    async fn pre_login(&self, _ctx: &HookContext<'_>, _login: &str) {}

    async fn post_login(&self, _ctx: &HookContext<'_>, _account: &Account) {}

    async fn pre_logout(&self, _ctx: &HookContext<'_>, _principal: Option<&Principal>) {}

    async fn post_logout(&self, _ctx: &HookContext<'_>) {}

    /// May adjust the account before it is created, or reject it.
    async fn pre_registration(
        &self,
        _ctx: &HookContext<'_>,
        _account: &mut NewAccount,
    ) -> PreRegistrationResult {
        PreRegistrationResult::Continue
    }

    async fn post_registration(&self, _ctx: &HookContext<'_>, _account: &Account) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl GatewayHooks for NoHooks {}
