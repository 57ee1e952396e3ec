//! Rate limiting for credential submissions.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down brute force
//! attempts against login, registration and token exchange.

use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::Response;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::net::IpAddr;
use std::num::NonZeroU32;
use tracing::warn;

use crate::auth::{ClientIpSource, error_response, extract_client_ip};
use crate::config::{ConfigError, RateLimitSettings};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

pub struct CredentialLimiter {
    limiter: IpLimiter,
    ip_source: ClientIpSource,
}

impl CredentialLimiter {
    pub fn new(settings: &RateLimitSettings) -> Result<Self, ConfigError> {
        let per_minute = NonZeroU32::new(settings.per_minute).ok_or(ConfigError::InvalidRateLimit)?;
        let burst = NonZeroU32::new(settings.burst).ok_or(ConfigError::InvalidRateLimit)?;
        Ok(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute).allow_burst(burst)),
            ip_source: ClientIpSource::from_header_name(settings.client_ip_header.as_deref())?,
        })
    }

    /// Take one request from the caller's bucket, or produce the rejection.
    pub fn check(&self, headers: &HeaderMap, extensions: &Extensions) -> Result<(), Response> {
        let ip = match extract_client_ip(headers, extensions, &self.ip_source) {
            Ok(ip) => ip,
            Err(reason) => {
                warn!(reason, "Rejecting credential submission without a client IP");
                return Err(error_response(
                    StatusCode::FORBIDDEN,
                    "Unable to determine client IP.",
                ));
            }
        };

        match self.limiter.check_key(&ip) {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(ip = %ip, "Credential submission rate limited");
                Err(error_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many authentication attempts. Please wait before trying again.",
                ))
            }
        }
    }
}
