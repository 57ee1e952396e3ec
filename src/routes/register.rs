//! Registration route.

use axum::{
    Json,
    extract::Request,
    http::{Method, StatusCode, request::Parts},
    response::{Html, IntoResponse, Response},
};
use tracing::{info, warn};

use super::form::{FormData, field, read_form};
use super::{AccountResponse, ResultExt, RouteError, hook_context, redirect};
use crate::auth::{AuthScheme, Principal, error_response};
use crate::config::FormField;
use crate::context::RequestContext;
use crate::gateway::GatewayState;
use crate::hooks::PreRegistrationResult;
use crate::identity::{Account, AccountStatus, IdentityError, NewAccount};
use crate::negotiate::ContentType;
use crate::tokens::{GrantRequest, Issuance, TokenLifecycle, write_token_cookies};
use crate::views::{RegisterViewModel, View};

/// Fields mapped onto [`NewAccount`] directly. Anything else is custom data.
const ACCOUNT_FIELDS: [&str; 6] = [
    "givenName",
    "surname",
    "email",
    "password",
    "confirmPassword",
    "username",
];

/// Stand-in for optional name fields left empty.
const UNKNOWN_NAME: &str = "UNKNOWN";

pub(super) async fn handle(
    state: &GatewayState,
    ctx: &mut RequestContext,
    request: Request,
) -> Result<Response, RouteError> {
    let (parts, body) = request.into_parts();
    match parts.method {
        Method::GET => Ok(show(state, ctx, &parts)),
        Method::POST => {
            let form = read_form(&parts.headers, body).await?;
            submit(state, ctx, &parts, form).await
        }
        _ => Err(RouteError::MethodNotAllowed("GET, POST")),
    }
}

fn show(state: &GatewayState, ctx: &RequestContext, parts: &Parts) -> Response {
    if ctx.principal.is_some() && ctx.content_type == ContentType::Html {
        return redirect(&state.config.web.register.next_uri);
    }
    render(state, ctx, parts, RegisterViewModel::new(&state.config.web))
}

async fn submit(
    state: &GatewayState,
    ctx: &mut RequestContext,
    parts: &Parts,
    form: FormData,
) -> Result<Response, RouteError> {
    let web = &state.config.web;

    let errors = validate(&web.register.fields, &form);
    if !errors.is_empty() {
        return Ok(reject(state, ctx, parts, &form, errors));
    }

    let mut new_account = new_account(&form);
    let hook_ctx = hook_context(parts, ctx);
    if let PreRegistrationResult::Reject(message) =
        state.hooks.pre_registration(&hook_ctx, &mut new_account).await
    {
        info!(email = %new_account.email, "Registration rejected by hook");
        return Ok(reject(state, ctx, parts, &form, vec![message]));
    }

    let login = new_account.email.clone();
    let password = new_account.password.clone();
    let result = ctx.client().create_account(new_account).await;
    let account = match result {
        Ok(account) => account,
        Err(IdentityError::Rejected(remote)) => {
            info!(email = %login, code = ?remote.code, "Registration rejected");
            return Ok(reject(state, ctx, parts, &form, vec![remote.message]));
        }
        Err(e) => return Err(RouteError::identity("Account creation failed", e)),
    };

    info!(account = %account.href, status = ?account.status, "Account registered");
    state.hooks.post_registration(&hook_ctx, &account).await;

    let logged_in = account.status == AccountStatus::Enabled
        && web.register.auto_login
        && auto_login(state, ctx, &login, &password).await?;

    Ok(match ctx.content_type {
        ContentType::Json => Json(AccountResponse { account: &account }).into_response(),
        ContentType::Html => redirect(&next_location(state, &account, logged_in)),
    })
}

/// Where a browser goes after registering.
fn next_location(state: &GatewayState, account: &Account, logged_in: bool) -> String {
    let web = &state.config.web;
    if account.status == AccountStatus::Unverified {
        format!("{}?status=unverified", web.login.uri)
    } else if logged_in {
        web.register.next_uri.clone()
    } else {
        format!("{}?status=created", web.login.uri)
    }
}

async fn auto_login(
    state: &GatewayState,
    ctx: &mut RequestContext,
    login: &str,
    password: &str,
) -> Result<bool, RouteError> {
    let outcome = TokenLifecycle::new(&state.config.web, state.config.signing_secret(), ctx.client())
        .issue(GrantRequest::Password { login, password })
        .await
        .identity_err("Login after registration failed")?;

    match outcome {
        Issuance::Issued(grant) => {
            write_token_cookies(&state.config.web, ctx, &grant.tokens);
            ctx.principal = Some(Principal {
                account: grant.account,
                scheme: AuthScheme::Cookie,
            });
            Ok(true)
        }
        Issuance::Rejected(remote) => {
            warn!(login = %login, error = %remote.message, "Login after registration rejected");
            Ok(false)
        }
    }
}

/// One message per missing required field, plus a password mismatch.
fn validate(fields: &[FormField], form: &FormData) -> Vec<String> {
    let mut errors: Vec<String> = fields
        .iter()
        .filter(|f| f.enabled && f.required && field(form, &f.name).is_none())
        .map(|f| format!("{} is required.", f.label))
        .collect();

    let confirm = fields
        .iter()
        .any(|f| f.enabled && f.name == "confirmPassword");
    if confirm {
        if let (Some(password), Some(confirmation)) =
            (form.get("password"), form.get("confirmPassword"))
        {
            if !confirmation.is_empty() && password != confirmation {
                errors.push("Passwords do not match.".to_string());
            }
        }
    }

    errors
}

fn new_account(form: &FormData) -> NewAccount {
    let name = |key: &str| field(form, key).unwrap_or(UNKNOWN_NAME).to_string();
    NewAccount {
        email: field(form, "email").unwrap_or_default().to_string(),
        password: form.get("password").cloned().unwrap_or_default(),
        given_name: name("givenName"),
        surname: name("surname"),
        username: field(form, "username").map(str::to_string),
        custom_data: form
            .iter()
            .filter(|(key, _)| !ACCOUNT_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect(),
    }
}

fn reject(
    state: &GatewayState,
    ctx: &RequestContext,
    parts: &Parts,
    form: &FormData,
    errors: Vec<String>,
) -> Response {
    if ctx.content_type == ContentType::Json {
        let message = errors.first().map(String::as_str).unwrap_or("Invalid request");
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    let mut model = RegisterViewModel::new(&state.config.web);
    model.errors = errors;
    model.form_data = form
        .iter()
        .filter(|(key, _)| !key.to_ascii_lowercase().contains("password"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    render(state, ctx, parts, model)
}

fn render(
    state: &GatewayState,
    ctx: &RequestContext,
    parts: &Parts,
    model: RegisterViewModel,
) -> Response {
    match ctx.content_type {
        ContentType::Json => Json(model).into_response(),
        ContentType::Html => {
            let action = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(&state.config.web.register.uri);
            Html(state.renderer.render(View::Register {
                action,
                model: &model,
            }))
            .into_response()
        }
    }
}
