//! Login route: show the form, exchange credentials for token cookies.

use axum::{
    Json,
    extract::Request,
    http::{Method, StatusCode, request::Parts},
    response::{Html, IntoResponse, Response},
};
use tracing::{info, warn};

use super::form::{FormData, field, read_form};
use super::{AccountResponse, ResultExt, RouteError, hook_context, next_param, query_param, redirect};
use crate::auth::{AuthScheme, Principal, error_response};
use crate::context::RequestContext;
use crate::gateway::GatewayState;
use crate::negotiate::ContentType;
use crate::tokens::{GrantRequest, Issuance, TokenLifecycle, write_token_cookies};
use crate::views::{LoginStatus, LoginViewModel, View};

pub const REQUIRED_FIELDS_MESSAGE: &str =
    "The 'Username or Email' and 'Password' fields are required.";

pub(super) async fn handle(
    state: &GatewayState,
    ctx: &mut RequestContext,
    request: Request,
) -> Result<Response, RouteError> {
    let (parts, body) = request.into_parts();
    match parts.method {
        Method::GET => Ok(show(state, ctx, &parts).await),
        Method::POST => {
            let form = read_form(&parts.headers, body).await?;
            submit(state, ctx, &parts, form).await
        }
        _ => Err(RouteError::MethodNotAllowed("GET, POST")),
    }
}

async fn show(state: &GatewayState, ctx: &RequestContext, parts: &Parts) -> Response {
    // Already logged in browsers go straight on
    if ctx.principal.is_some() && ctx.content_type == ContentType::Html {
        return redirect(&next_uri(state, parts));
    }

    let mut model = view_model(state, ctx).await;
    model.status = query_param(&parts.uri, "status").and_then(|s| LoginStatus::parse(&s));
    render(state, ctx, parts, model)
}

async fn submit(
    state: &GatewayState,
    ctx: &mut RequestContext,
    parts: &Parts,
    form: FormData,
) -> Result<Response, RouteError> {
    let web = &state.config.web;

    let login = field(&form, "login").or_else(|| field(&form, "username"));
    let password = form
        .get("password")
        .map(String::as_str)
        .filter(|p| !p.is_empty());
    let (Some(login), Some(password)) = (login, password) else {
        return Ok(reject(state, ctx, parts, &form, REQUIRED_FIELDS_MESSAGE).await);
    };

    let hook_ctx = hook_context(parts, ctx);
    state.hooks.pre_login(&hook_ctx, login).await;

    let outcome = TokenLifecycle::new(web, state.config.signing_secret(), ctx.client())
        .issue(GrantRequest::Password { login, password })
        .await
        .identity_err("Password grant failed")?;

    let grant = match outcome {
        Issuance::Issued(grant) => grant,
        Issuance::Rejected(remote) => {
            info!(login = %login, code = ?remote.code, "Login rejected");
            return Ok(reject(state, ctx, parts, &form, &remote.message).await);
        }
    };

    write_token_cookies(web, ctx, &grant.tokens);
    state.hooks.post_login(&hook_ctx, &grant.account).await;
    info!(account = %grant.account.href, "Login succeeded");

    let response = match ctx.content_type {
        ContentType::Html => redirect(&next_uri(state, parts)),
        ContentType::Json => Json(AccountResponse {
            account: &grant.account,
        })
        .into_response(),
    };
    ctx.principal = Some(Principal {
        account: grant.account,
        scheme: AuthScheme::Cookie,
    });
    Ok(response)
}

/// Redisplay the form with `message` (HTML), or a 400 (JSON).
async fn reject(
    state: &GatewayState,
    ctx: &RequestContext,
    parts: &Parts,
    form: &FormData,
    message: &str,
) -> Response {
    if ctx.content_type == ContentType::Json {
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    let mut model = view_model(state, ctx).await;
    model.errors.push(message.to_string());
    if let Some(login) = form.get("login").or_else(|| form.get("username")) {
        model.form_data.insert("login".to_string(), login.clone());
    }
    render(state, ctx, parts, model)
}

async fn view_model(state: &GatewayState, ctx: &RequestContext) -> LoginViewModel {
    let result = ctx.client().account_stores().await;
    let stores = match result {
        Ok(stores) => stores,
        Err(e) => {
            warn!(error = %e.detail(), "Failed to load account stores");
            Vec::new()
        }
    };
    LoginViewModel::new(&state.config.web, stores)
}

fn render(
    state: &GatewayState,
    ctx: &RequestContext,
    parts: &Parts,
    model: LoginViewModel,
) -> Response {
    match ctx.content_type {
        ContentType::Json => Json(model).into_response(),
        ContentType::Html => {
            // Post back to the same URI so `next` survives a failed attempt
            let action = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(&state.config.web.login.uri);
            Html(state.renderer.render(View::Login {
                action,
                model: &model,
            }))
            .into_response()
        }
    }
}

fn next_uri(state: &GatewayState, parts: &Parts) -> String {
    next_param(&parts.uri).unwrap_or_else(|| state.config.web.login.next_uri.clone())
}
