//! Gateway configuration.
//!
//! Built once at startup (usually from a JSON file, see [`GatewayConfig::from_json_file`]),
//! validated when the [`Gateway`](crate::Gateway) is constructed, and shared read-only
//! by every request afterwards.

use std::path::Path;

use serde::Deserialize;

use crate::auth::RequiredScheme;
use crate::negotiate::ContentType;

/// Errors detected while loading or validating configuration. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("route {family} has an invalid uri {uri:?}: must be non-empty and start with '/'")]
    InvalidUri { family: &'static str, uri: String },
    #[error("routes {first} and {second} are both configured at {uri}")]
    DuplicateRoute {
        uri: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("route {family} does not produce any content type")]
    EmptyProduces { family: &'static str },
    #[error("signing secret must not be empty")]
    MissingSigningSecret,
    #[error("rate limit must allow at least one request per minute and a burst of at least one")]
    InvalidRateLimit,
    #[error("invalid client IP header name {0:?}")]
    InvalidIpHeader(String),
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub web: WebConfig,
    /// Secret used to verify token signatures. Never read from the config file.
    #[serde(skip)]
    signing_secret: Vec<u8>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            signing_secret: Vec::new(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("web", &self.web)
            .field("signing_secret", &"<redacted>")
            .finish()
    }
}

impl GatewayConfig {
    /// Load a config file. Missing keys fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn with_signing_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.signing_secret = secret.into();
        self
    }

    pub fn signing_secret(&self) -> &[u8] {
        &self.signing_secret
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Representations the gateway serves, in order of preference.
    pub produces: Vec<ContentType>,
    pub access_token_cookie: CookieConfig,
    pub refresh_token_cookie: CookieConfig,
    pub oauth2: OAuth2Config,
    pub register: RegisterConfig,
    pub login: LoginConfig,
    pub logout: LogoutConfig,
    pub me: MeConfig,
    pub verify_email: LinkConfig,
    pub forgot_password: LinkConfig,
    /// Per-IP throttling of credential submissions. Disabled when absent.
    pub rate_limit: Option<RateLimitSettings>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            produces: vec![ContentType::Json, ContentType::Html],
            access_token_cookie: CookieConfig::named("access_token"),
            refresh_token_cookie: CookieConfig::named("refresh_token"),
            oauth2: OAuth2Config::default(),
            register: RegisterConfig::default(),
            login: LoginConfig::default(),
            logout: LogoutConfig::default(),
            me: MeConfig::default(),
            verify_email: LinkConfig {
                enabled: false,
                uri: "/verify".to_string(),
            },
            forgot_password: LinkConfig {
                enabled: false,
                uri: "/forgot".to_string(),
            },
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    /// `None` sets the Secure flag only when the request arrived over HTTPS.
    pub secure: Option<bool>,
    pub same_site: SameSite,
    /// Lifetime in seconds. `None` derives it from the token (access) or makes
    /// a session cookie (refresh).
    pub max_age: Option<u64>,
}

impl CookieConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            domain: None,
            path: "/".to_string(),
            http_only: true,
            secure: None,
            same_site: SameSite::Lax,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuth2Config {
    pub enabled: bool,
    pub uri: String,
    pub password_grant: bool,
    pub refresh_token_grant: bool,
    pub client_credentials_grant: bool,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "/oauth/token".to_string(),
            password_grant: true,
            refresh_token_grant: true,
            client_credentials_grant: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub enabled: bool,
    pub uri: String,
    pub next_uri: String,
    pub produces: Option<Vec<ContentType>>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "/login".to_string(),
            next_uri: "/".to_string(),
            produces: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogoutConfig {
    pub enabled: bool,
    pub uri: String,
    pub next_uri: String,
    pub produces: Option<Vec<ContentType>>,
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "/logout".to_string(),
            next_uri: "/".to_string(),
            produces: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub enabled: bool,
    pub uri: String,
    pub next_uri: String,
    /// Log the new account in right away (only when it needs no verification).
    pub auto_login: bool,
    pub fields: Vec<FormField>,
    pub produces: Option<Vec<ContentType>>,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "/register".to_string(),
            next_uri: "/".to_string(),
            auto_login: false,
            fields: FormField::default_registration(),
            produces: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeConfig {
    pub enabled: bool,
    pub uri: String,
    pub required_scheme: RequiredScheme,
    pub produces: Option<Vec<ContentType>>,
}

impl Default for MeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "/me".to_string(),
            required_scheme: RequiredScheme::Any,
            produces: None,
        }
    }
}

/// A page the gateway links to but does not serve itself.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub enabled: bool,
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Header a trusted reverse proxy sets to the client address. When absent
    /// the TCP peer address is used and client-supplied headers are ignored.
    #[serde(default)]
    pub client_ip_header: Option<String>,
}

fn default_burst() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub placeholder: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub enabled: bool,
}

impl Default for FormField {
    fn default() -> Self {
        Self {
            name: String::new(),
            label: String::new(),
            placeholder: String::new(),
            field_type: "text".to_string(),
            required: false,
            enabled: true,
        }
    }
}

impl FormField {
    fn new(name: &str, label: &str, field_type: &str, required: bool, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            placeholder: label.to_string(),
            field_type: field_type.to_string(),
            required,
            enabled,
        }
    }

    pub fn default_registration() -> Vec<Self> {
        vec![
            Self::new("givenName", "First Name", "text", true, true),
            Self::new("surname", "Last Name", "text", true, true),
            Self::new("email", "Email", "email", true, true),
            Self::new("password", "Password", "password", true, true),
            Self::new("confirmPassword", "Confirm Password", "password", true, false),
        ]
    }

    pub fn default_login() -> Vec<Self> {
        vec![
            Self::new("login", "Username or Email", "text", true, true),
            Self::new("password", "Password", "password", true, true),
        ]
    }
}
