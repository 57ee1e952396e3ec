//! Client IP extraction.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, HeaderName},
};

use crate::config::ConfigError;

/// Where the client address is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientIpSource {
    /// The TCP peer address from `ConnectInfo`
    #[default]
    Peer,
    /// A header written by a trusted reverse proxy. The last comma-separated
    /// entry is used, since that is the one the proxy appended.
    Header(HeaderName),
}

impl ClientIpSource {
    /// `None` selects the peer address.
    pub fn from_header_name(name: Option<&str>) -> Result<Self, ConfigError> {
        match name {
            None => Ok(Self::Peer),
            Some(name) => HeaderName::try_from(name.trim())
                .map(Self::Header)
                .map_err(|_| ConfigError::InvalidIpHeader(name.to_string())),
        }
    }
}

/// Client address for rate limiting.
///
/// With a header source, a missing or unparsable header is an error and the
/// peer address is NOT used instead. Without one, client headers are ignored.
pub fn extract_client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    source: &ClientIpSource,
) -> Result<IpAddr, &'static str> {
    match source {
        ClientIpSource::Header(name) => {
            let value = headers
                .get(name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            value
                .rsplit(',')
                .next()
                .map(str::trim)
                .and_then(|ip| ip.parse().ok())
                .ok_or("IP header does not hold an IP address")
        }
        ClientIpSource::Peer => extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .ok_or("No client IP available"),
    }
}
