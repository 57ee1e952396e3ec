//! The request dispatcher.
//!
//! [`Gateway`] is installed as an axum middleware in front of the
//! application. For every request it scopes an identity client to the
//! request, resolves the principal, and then either serves one of its own
//! routes or forwards the request with the principal attached.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::auth::{AuthenticationGate, error_response, resolve_principal};
use crate::config::{ConfigError, GatewayConfig};
use crate::context::RequestContext;
use crate::hooks::{GatewayHooks, NoHooks};
use crate::identity::{IdentityClientFactory, ScopedClientOptions};
use crate::negotiate::{accepts_any, select_best_content_type};
use crate::rate_limit::CredentialLimiter;
use crate::routes::{self, RouteTable};
use crate::views::{PlainHtmlRenderer, ViewRenderer};

/// Request header whose value is prepended to the identity client user agent.
pub const AGENT_HEADER: &str = "x-authgate-agent";

const USER_AGENT: &str = concat!("authgate/", env!("CARGO_PKG_VERSION"));

/// Everything a request needs, immutable after construction.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub routes: RouteTable,
    pub factory: Arc<dyn IdentityClientFactory>,
    pub hooks: Arc<dyn GatewayHooks>,
    pub renderer: Arc<dyn ViewRenderer>,
    pub limiter: Option<CredentialLimiter>,
}

#[derive(Clone)]
pub struct Gateway {
    state: Arc<GatewayState>,
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    factory: Arc<dyn IdentityClientFactory>,
    hooks: Arc<dyn GatewayHooks>,
    renderer: Arc<dyn ViewRenderer>,
}

impl GatewayBuilder {
    pub fn hooks(mut self, hooks: impl GatewayHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn renderer(mut self, renderer: impl ViewRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Validate the configuration and build the route table.
    pub fn build(self) -> Result<Gateway, ConfigError> {
        if self.config.signing_secret().is_empty() {
            return Err(ConfigError::MissingSigningSecret);
        }
        let routes = RouteTable::build(&self.config.web)?;
        let limiter = self
            .config
            .web
            .rate_limit
            .as_ref()
            .map(CredentialLimiter::new)
            .transpose()?;

        debug!(routes = routes.len(), rate_limited = limiter.is_some(), "Gateway configured");

        Ok(Gateway {
            state: Arc::new(GatewayState {
                config: self.config,
                routes,
                factory: self.factory,
                hooks: self.hooks,
                renderer: self.renderer,
                limiter,
            }),
        })
    }
}

impl Gateway {
    /// Gateway with no hooks and the plain HTML renderer.
    pub fn new(
        config: GatewayConfig,
        factory: impl IdentityClientFactory,
    ) -> Result<Self, ConfigError> {
        Self::builder(config, factory).build()
    }

    pub fn builder(config: GatewayConfig, factory: impl IdentityClientFactory) -> GatewayBuilder {
        GatewayBuilder {
            config,
            factory: Arc::new(factory),
            hooks: Arc::new(NoHooks),
            renderer: Arc::new(PlainHtmlRenderer),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.state.routes
    }

    /// Install the gateway in front of every route of `router`, including
    /// requests that match none of them.
    pub fn layer<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, dispatch))
    }
}

/// Middleware entry point.
pub async fn dispatch(State(gateway): State<Gateway>, request: Request, next: Next) -> Response {
    let state = gateway.state.as_ref();
    let web = &state.config.web;

    let path = request.uri().path().to_string();
    if path.is_empty() {
        error!(uri = %request.uri(), "Request has no path");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }

    let client = state.factory.create(ScopedClientOptions {
        user_agent: user_agent(request.headers()),
    });
    let original_uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let mut ctx = RequestContext::new(
        client,
        original_uri,
        is_https(request.uri(), request.headers()),
    );

    resolve_principal(&mut ctx, request.headers(), web).await;

    let Some(entry) = state.routes.lookup(&path) else {
        let mut request = request;
        if let Some(principal) = ctx.principal.clone() {
            request.extensions_mut().insert(principal);
        }
        let mut response = next.run(request).await;
        ctx.apply_cookies(&mut response);
        return response;
    };

    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    if !accepts_any(accept, &entry.produces) {
        debug!(path = %path, accept = ?accept, "No acceptable representation");
        let mut response = StatusCode::NOT_ACCEPTABLE.into_response();
        ctx.apply_cookies(&mut response);
        return response;
    }
    ctx.content_type = select_best_content_type(accept, &entry.produces);

    if entry.authentication_required {
        if let Err(mut response) =
            AuthenticationGate::new(web).check(&mut ctx, request.headers(), entry.required_scheme)
        {
            ctx.apply_cookies(&mut response);
            return response;
        }
    }

    if let Some(ref limiter) = state.limiter {
        if entry.family.accepts_credentials() && request.method() == Method::POST {
            if let Err(mut response) = limiter.check(request.headers(), request.extensions()) {
                ctx.apply_cookies(&mut response);
                return response;
            }
        }
    }

    debug!(path = %path, route = entry.family.name(), content_type = %ctx.content_type, "Handling gateway route");
    let mut response = routes::handle(entry.family, state, &mut ctx, request).await;
    ctx.apply_cookies(&mut response);
    response
}

/// `"{X-Authgate-Agent} authgate/{version}"`, trimmed.
fn user_agent(headers: &HeaderMap) -> String {
    let prefix = headers
        .get(AGENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    format!("{} {}", prefix, USER_AGENT).trim().to_string()
}

fn is_https(uri: &Uri, headers: &HeaderMap) -> bool {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
    forwarded || uri.scheme_str() == Some("https")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryDirectory;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_agent() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), USER_AGENT);

        headers.insert(AGENT_HEADER, HeaderValue::from_static("my-app/2.0"));
        assert_eq!(user_agent(&headers), format!("my-app/2.0 {}", USER_AGENT));
    }

    #[test]
    fn test_is_https() {
        let uri: Uri = "/login".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert!(!is_https(&uri, &headers));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("HTTPS"));
        assert!(is_https(&uri, &headers));

        let uri: Uri = "https://example.com/login".parse().unwrap();
        assert!(is_https(&uri, &HeaderMap::new()));
    }

    #[test]
    fn test_requires_signing_secret() {
        let result = Gateway::new(GatewayConfig::default(), MemoryDirectory::new(b"x"));
        assert!(matches!(result, Err(ConfigError::MissingSigningSecret)));
    }

    #[test]
    fn test_duplicate_routes_fail() {
        let mut config = GatewayConfig::default().with_signing_secret("gateway-test-secret");
        config.web.me.uri = "/login".to_string();
        let result = Gateway::new(config, MemoryDirectory::new(b"gateway-test-secret"));
        assert!(matches!(result, Err(ConfigError::DuplicateRoute { .. })));
    }
}
