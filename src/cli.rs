//! CLI argument parsing, validation, and startup helpers for the demo server.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::identity::{MemoryDirectory, NewAccount};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Environment variable holding the token signing secret.
pub const SECRET_ENV: &str = "AUTHGATE_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "authgate",
    about = "Authentication gateway in front of an axum application"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "AUTHGATE_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to a JSON gateway config file. Defaults are used when omitted
    #[arg(short, long, env = "AUTHGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to file containing the signing secret. Prefer using AUTHGATE_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Account to create in the in-memory directory, as email:password (repeatable)
    #[arg(long = "demo-account", value_parser = parse_demo_account)]
    pub demo_accounts: Vec<DemoAccount>,

    /// Require email verification for accounts created through registration.
    /// Demo accounts are always enabled
    #[arg(long)]
    pub require_verification: bool,

    /// Header a trusted reverse proxy sets to the client IP (e.g. X-Forwarded-For).
    /// Overrides the config file. Without it the TCP peer address is used
    #[arg(long, env = "AUTHGATE_CLIENT_IP_HEADER")]
    pub client_ip_header: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
}

fn parse_demo_account(s: &str) -> Result<DemoAccount, String> {
    let (email, password) = s
        .split_once(':')
        .ok_or_else(|| format!("Demo account must be email:password: {}", s))?;

    if email.is_empty() || !email.contains('@') {
        return Err(format!("Demo account email is invalid: {}", email));
    }
    if password.is_empty() {
        return Err(format!("Demo account {} has an empty password", email));
    }

    Ok(DemoAccount {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the signing secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(SECRET_ENV) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(SECRET_ENV) };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read signing secret file");
                return None;
            }
        }
    } else {
        error!(
            "Signing secret is required. Set {} environment variable (recommended) or use --jwt-secret-file",
            SECRET_ENV
        );
        return None;
    };

    validate_secret(secret)
}

fn validate_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "Signing secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Load the gateway config file, or the defaults when no file is given.
/// Returns None and logs an error if the file is unreadable or invalid.
pub fn load_config(path: Option<&PathBuf>) -> Option<GatewayConfig> {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return Some(GatewayConfig::default());
    };

    match GatewayConfig::from_json_file(path) {
        Ok(config) => {
            info!(path = %path.display(), "Config loaded");
            Some(config)
        }
        Err(e) => {
            error!(error = %e, "Failed to load config");
            None
        }
    }
}

/// Apply `--client-ip-header` to the rate limit settings. Returns false when
/// rate limiting is not configured, in which case the flag has no effect.
pub fn apply_client_ip_header(config: &mut GatewayConfig, header: Option<&str>) -> bool {
    let Some(header) = header else {
        return true;
    };
    match config.web.rate_limit.as_mut() {
        Some(limit) => {
            limit.client_ip_header = Some(header.to_string());
            true
        }
        None => false,
    }
}

/// Build the in-memory directory and create the demo accounts in it.
pub async fn open_directory(
    secret: &[u8],
    require_verification: bool,
    accounts: &[DemoAccount],
) -> MemoryDirectory {
    let directory = if require_verification {
        MemoryDirectory::with_email_verification(secret)
    } else {
        MemoryDirectory::new(secret)
    };

    for demo in accounts {
        let result = directory
            .add_verified_account(NewAccount {
                email: demo.email.clone(),
                password: demo.password.clone(),
                given_name: "Demo".to_string(),
                surname: "User".to_string(),
                ..NewAccount::default()
            })
            .await;
        match result {
            Ok(account) => info!(email = %account.email, href = %account.href, "Demo account created"),
            Err(e) => error!(email = %demo.email, error = %e.detail(), "Failed to create demo account"),
        }
    }

    directory
}
