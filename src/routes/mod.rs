//! Gateway routes: the static route table and the handlers behind it.
//!
//! The table is built once from [`WebConfig`] and never changes afterwards.
//! Lookup is exact string equality on the request path, so `/login/` and
//! `/Login` do not match `/login`.

mod error;
mod form;
mod login;
mod logout;
mod me;
mod oauth;
mod register;

use std::collections::HashMap;

use axum::{
    extract::Request,
    http::{StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::RequiredScheme;
use crate::config::{ConfigError, WebConfig};
use crate::context::RequestContext;
use crate::gateway::GatewayState;
use crate::hooks::HookContext;
use crate::identity::Account;
use crate::negotiate::ContentType;

pub use error::{ResultExt, RouteError};
pub use form::{FormData, read_form};

/// The fixed set of routes the gateway can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteFamily {
    OAuth2,
    Register,
    Login,
    Me,
    Logout,
}

impl RouteFamily {
    /// Construction order of the route table.
    pub const ALL: [RouteFamily; 5] = [
        RouteFamily::OAuth2,
        RouteFamily::Register,
        RouteFamily::Login,
        RouteFamily::Me,
        RouteFamily::Logout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RouteFamily::OAuth2 => "oauth2",
            RouteFamily::Register => "register",
            RouteFamily::Login => "login",
            RouteFamily::Me => "me",
            RouteFamily::Logout => "logout",
        }
    }

    /// Whether this family takes credentials and is subject to rate limiting.
    pub fn accepts_credentials(&self) -> bool {
        matches!(
            self,
            RouteFamily::OAuth2 | RouteFamily::Register | RouteFamily::Login
        )
    }

    /// `(enabled, uri)` from the config.
    fn location<'a>(&self, web: &'a WebConfig) -> (bool, &'a str) {
        match self {
            RouteFamily::OAuth2 => (web.oauth2.enabled, &web.oauth2.uri),
            RouteFamily::Register => (web.register.enabled, &web.register.uri),
            RouteFamily::Login => (web.login.enabled, &web.login.uri),
            RouteFamily::Me => (web.me.enabled, &web.me.uri),
            RouteFamily::Logout => (web.logout.enabled, &web.logout.uri),
        }
    }

    fn produces(&self, web: &WebConfig) -> Vec<ContentType> {
        let configured = match self {
            // Token exchange is an API endpoint only
            RouteFamily::OAuth2 => return vec![ContentType::Json],
            RouteFamily::Register => &web.register.produces,
            RouteFamily::Login => &web.login.produces,
            RouteFamily::Me => &web.me.produces,
            RouteFamily::Logout => &web.logout.produces,
        };
        configured.clone().unwrap_or_else(|| web.produces.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub family: RouteFamily,
    pub authentication_required: bool,
    pub required_scheme: RequiredScheme,
    pub produces: Vec<ContentType>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: HashMap<String, RouteEntry>,
}

impl RouteTable {
    /// Build the table from the enabled route families.
    ///
    /// Fails on an empty or relative URI, on a family that produces nothing,
    /// and when two enabled families share a URI.
    pub fn build(web: &WebConfig) -> Result<Self, ConfigError> {
        let mut entries: HashMap<String, RouteEntry> = HashMap::new();

        for family in RouteFamily::ALL {
            let (enabled, uri) = family.location(web);
            if !enabled {
                continue;
            }
            if uri.is_empty() || !uri.starts_with('/') {
                return Err(ConfigError::InvalidUri {
                    family: family.name(),
                    uri: uri.to_string(),
                });
            }

            let produces = family.produces(web);
            if produces.is_empty() {
                return Err(ConfigError::EmptyProduces {
                    family: family.name(),
                });
            }

            if let Some(existing) = entries.get(uri) {
                return Err(ConfigError::DuplicateRoute {
                    uri: uri.to_string(),
                    first: existing.family.name(),
                    second: family.name(),
                });
            }

            let authentication_required = family == RouteFamily::Me;
            let required_scheme = if authentication_required {
                web.me.required_scheme
            } else {
                RequiredScheme::Any
            };

            entries.insert(
                uri.to_string(),
                RouteEntry {
                    family,
                    authentication_required,
                    required_scheme,
                    produces,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn lookup(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the handler of `family`.
pub(crate) async fn handle(
    family: RouteFamily,
    state: &GatewayState,
    ctx: &mut RequestContext,
    request: Request,
) -> Response {
    let result = match family {
        RouteFamily::OAuth2 => oauth::handle(state, ctx, request).await,
        RouteFamily::Register => register::handle(state, ctx, request).await,
        RouteFamily::Login => login::handle(state, ctx, request).await,
        RouteFamily::Me => me::handle(ctx, request),
        RouteFamily::Logout => logout::handle(state, ctx, request).await,
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

/// `{"account": {...}}`
#[derive(Serialize)]
struct AccountResponse<'a> {
    account: &'a Account,
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// The `next` query parameter, if it is a non-empty local path.
///
/// Browsers read `\` as `/` and drop tabs and newlines, so a path holding
/// either could still name another host.
fn next_param(uri: &Uri) -> Option<String> {
    query_param(uri, "next").filter(|next| {
        next.starts_with('/')
            && !next.starts_with("//")
            && !next.chars().any(|c| c == '\\' || c.is_control())
    })
}

fn hook_context<'a>(parts: &'a Parts, ctx: &RequestContext) -> HookContext<'a> {
    HookContext {
        path: parts.uri.path(),
        headers: &parts.headers,
        content_type: ctx.content_type,
    }
}
