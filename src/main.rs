use std::net::SocketAddr;

use authgate::cli::{
    Args, apply_client_ip_header, init_logging, load_config, load_jwt_secret, open_directory,
};
use authgate::{Gateway, create_app};
use clap::Parser;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(config) = load_config(args.config.as_ref()) else {
        std::process::exit(1);
    };
    let mut config = config.with_signing_secret(secret.into_bytes());
    if !apply_client_ip_header(&mut config, args.client_ip_header.as_deref()) {
        warn!("--client-ip-header ignored because rate limiting is not configured");
    }

    let directory = open_directory(
        config.signing_secret(),
        args.require_verification,
        &args.demo_accounts,
    )
    .await;

    let gateway = match Gateway::new(config, directory) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "Invalid gateway configuration");
            std::process::exit(1);
        }
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let app = create_app(gateway);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
