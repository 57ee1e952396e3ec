pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod gateway;
pub mod hooks;
pub mod identity;
pub mod jwt;
pub mod negotiate;
pub mod rate_limit;
pub mod routes;
pub mod tokens;
pub mod views;

pub use auth::{Authenticated, MaybeAuthenticated, Principal};
pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Gateway, GatewayBuilder};
pub use hooks::{GatewayHooks, HookContext, NoHooks, PreRegistrationResult};
pub use identity::{IdentityClient, IdentityClientFactory, MemoryDirectory};
pub use views::{PlainHtmlRenderer, ViewRenderer};

use axum::{Json, Router, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Demo application behind the gateway.
pub fn create_app(gateway: Gateway) -> Router {
    let app = Router::new()
        .route("/", get(index))
        .route("/private", get(private));
    gateway.layer(app)
}

async fn index(MaybeAuthenticated(principal): MaybeAuthenticated) -> Json<serde_json::Value> {
    Json(json!({
        "authenticated": principal.is_some(),
        "email": principal.map(|p| p.account.email),
    }))
}

async fn private(Authenticated(principal): Authenticated) -> Json<serde_json::Value> {
    Json(json!({ "hello": principal.account.given_name }))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(gateway: Gateway, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(gateway);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    gateway: Gateway,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(gateway, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
