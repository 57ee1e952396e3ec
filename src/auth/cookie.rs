//! Cookie parsing and `Set-Cookie` encoding for the token cookies.

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};

use crate::config::{CookieConfig, SameSite};

/// All cookies sent with a request, in order.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    pairs: Vec<(String, String)>,
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pairs = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|part| {
                let (key, value) = part.trim().split_once('=')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { pairs }
    }

    /// First value sent under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the client sent a cookie called `name`, even an empty one.
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(key, _)| key == name)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn same_site(value: SameSite) -> cookie::SameSite {
    match value {
        SameSite::Strict => cookie::SameSite::Strict,
        SameSite::Lax => cookie::SameSite::Lax,
        SameSite::None => cookie::SameSite::None,
    }
}

fn to_header(cookie: Cookie<'_>) -> Option<HeaderValue> {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(cookie = %cookie.name(), error = %e, "Cookie is not a valid header value");
            None
        }
    }
}

fn base_cookie(config: &CookieConfig, value: String, is_https: bool) -> cookie::CookieBuilder<'static> {
    let mut builder = Cookie::build((config.name.clone(), value))
        .path(config.path.clone())
        .http_only(config.http_only)
        .secure(config.secure.unwrap_or(is_https))
        .same_site(same_site(config.same_site));
    if let Some(ref domain) = config.domain {
        builder = builder.domain(domain.clone());
    }
    builder
}

/// Encode a token cookie. `max_age` of `None` makes it a session cookie.
pub fn encode_token_cookie(
    config: &CookieConfig,
    value: &str,
    max_age: Option<u64>,
    is_https: bool,
) -> Option<HeaderValue> {
    let mut builder = base_cookie(config, value.to_string(), is_https);
    if let Some(secs) = max_age {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        builder = builder.max_age(Duration::seconds(secs));
    }
    to_header(builder.build())
}

/// Encode a cookie that makes the browser drop `config.name` immediately.
pub fn encode_deletion_cookie(config: &CookieConfig, is_https: bool) -> Option<HeaderValue> {
    let cookie = base_cookie(config, String::new(), is_https)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build();
    to_header(cookie)
}
