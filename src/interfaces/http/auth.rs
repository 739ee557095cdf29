//! Bearer token authentication for the HTTP surface.
//!
//! Tokens are HS256 JWTs whose `sub` claim carries the owner id. The
//! registry does not manage accounts; any issuer sharing the secret can
//! mint tokens for its users.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::identity::OwnerId;
use crate::error::{RegistryError, Result};

/// Payload stored in a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owner id the token authenticates.
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// Verifies and mints bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
    ttl_seconds: u64,
}

impl TokenVerifier {
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: impl Into<String>, ttl_seconds: u64) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(RegistryError::InvalidInput(
                "auth secret is required".to_string(),
            ));
        }
        if secret.len() < 32 {
            return Err(RegistryError::InvalidInput(
                "auth secret must be at least 32 characters".to_string(),
            ));
        }
        Ok(Self {
            secret,
            ttl_seconds,
        })
    }

    /// Mints a token for `owner`, expiring after the configured ttl.
    pub fn mint(&self, owner: &OwnerId) -> Result<String> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: owner.as_str().to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| RegistryError::Unauthenticated(format!("failed to mint token: {e}")))
    }

    /// Verifies a token and returns the owner it authenticates.
    pub fn verify(&self, token: &str) -> Result<OwnerId> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidToken => "invalid token",
                ErrorKind::InvalidSignature => "invalid signature",
                _ => "token validation failed",
            };
            RegistryError::Unauthenticated(message.to_string())
        })?;
        if data.claims.sub.is_empty() {
            return Err(RegistryError::Unauthenticated(
                "token has no subject".to_string(),
            ));
        }
        Ok(OwnerId::new(data.claims.sub))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
