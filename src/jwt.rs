//! HS256 signing for the tokens handed out by
//! [`MemoryDirectory`](crate::identity::MemoryDirectory).
//!
//! Access and refresh tokens share one claim set and are told apart by
//! `typ`, so a refresh token is never accepted where an access token is
//! expected.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::identity::TokenKind;

pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedClaims {
    pub jti: String,
    /// Account href
    pub sub: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub jti: String,
    pub lifetime: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Verify(#[source] jsonwebtoken::errors::Error),
    #[error("system clock is before the Unix epoch")]
    Clock,
    #[error("expected a {expected} token, got a {actual} token")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a fresh token of `kind` for `subject`, with a new random `jti`.
    pub fn sign(&self, subject: &str, kind: TokenKind) -> Result<SignedToken, JwtError> {
        let lifetime = match kind {
            TokenKind::Access => ACCESS_TOKEN_LIFETIME,
            TokenKind::Refresh => REFRESH_TOKEN_LIFETIME,
        };
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::Clock)?
            .as_secs();

        let claims = SignedClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            kind,
            iat: issued_at,
            exp: issued_at + lifetime.as_secs(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Sign)?;

        Ok(SignedToken {
            token,
            jti: claims.jti,
            lifetime,
        })
    }

    /// Verify signature, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<SignedClaims, JwtError> {
        let claims: SignedClaims = verify_with_key(token, &self.decoding_key)?;
        if claims.kind != kind {
            return Err(JwtError::WrongKind {
                expected: kind.as_str(),
                actual: claims.kind.as_str(),
            });
        }
        Ok(claims)
    }
}

/// Verify `token` against `secret` and decode whatever claims `T` needs.
pub fn verify_with_secret<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<T, JwtError> {
    verify_with_key(token, &DecodingKey::from_secret(secret))
}

fn verify_with_key<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    jsonwebtoken::decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(JwtError::Verify)
}
