//! Bearer token construction and signing.
//!
//! Tokens are compact RS256 JWTs whose header carries the signing key's
//! `kid`. Each token is good for two minutes and its `nbf` is backdated one
//! minute to absorb clock skew between this server and the registry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, Header};
use rand::RngExt;
use serde::{Deserialize, Serialize};

use super::keys::SigningKey;
use super::scope::ResourceActions;
use crate::Result;

/// How long an issued token stays valid.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(120);

/// How far `nbf` is set before the issue time.
pub const NOT_BEFORE_SKEW: Duration = Duration::from_secs(60);

/// Registered and private claims of an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer name configured on both this server and the registry.
    pub iss: String,
    /// Authenticated username, or empty for anonymous callers.
    pub sub: String,
    /// Requested service.
    pub aud: String,
    /// Expiry (Unix seconds).
    pub exp: u64,
    /// Not-before (Unix seconds).
    pub nbf: u64,
    /// Issued-at (Unix seconds).
    pub iat: u64,
    /// Random token identifier.
    pub jti: String,
    /// Approved scope items, possibly empty.
    pub access: Vec<ResourceActions>,
}

/// Signs claims with the server key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    signing_key: Arc<SigningKey>,
    issuer: String,
}

impl TokenIssuer {
    /// Create an issuer that signs with `signing_key` and stamps `iss`.
    pub fn new(signing_key: Arc<SigningKey>, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Key identifier placed in token headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        self.signing_key.key_id()
    }

    /// Build and sign a token for the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`](crate::Error::Signing) if the JWT cannot be
    /// encoded.
    pub fn issue(&self, subject: &str, audience: &str, access: &[ResourceActions]) -> Result<String> {
        let claims = self.claims_at(unix_now(), subject, audience, access);
        self.sign(&claims)
    }

    /// Claims for a token issued at `now` (Unix seconds).
    #[must_use]
    pub fn claims_at(
        &self,
        now: u64,
        subject: &str,
        audience: &str,
        access: &[ResourceActions],
    ) -> Claims {
        Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            exp: now + TOKEN_LIFETIME.as_secs(),
            nbf: now.saturating_sub(NOT_BEFORE_SKEW.as_secs()),
            iat: now,
            jti: generate_jti(),
            access: access.to_vec(),
        }
    }

    /// Sign claims into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`](crate::Error::Signing) if encoding fails.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.signing_key.key_id().to_string());
        Ok(jsonwebtoken::encode(
            &header,
            claims,
            self.signing_key.encoding_key(),
        )?)
    }
}

/// Something that can hand out registry tokens for internal use.
///
/// Lets other components inside the process talk to the registry without a
/// round trip through the HTTP endpoint.
pub trait TokenProvider: Send + Sync {
    /// Obtain a token granting `pull` on each repository, or `registry:catalog:*`
    /// when `repositories` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    fn obtain_token(&self, repositories: &[String]) -> Result<String>;
}

/// Decimal rendering of a random non-negative 63-bit integer.
fn generate_jti() -> String {
    let value: u64 = rand::rng().random();
    (value >> 1).to_string()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
