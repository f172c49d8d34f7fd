// ABOUTME: RS256 JWT encode/decode with numeric key ids embedded in the header
// ABOUTME: Verification uses an injectable clock so expiry checks are deterministic in tests
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Token Codec
//!
//! Issues and verifies RS256 JWTs. The signing key's registry id travels in
//! the JWT `kid` header as a decimal string; a token with no `kid` is treated
//! as id 0, which keeps tokens minted before key-id support verifiable.

use crate::errors::{AuthError, AuthResult};
use crate::keys::{SigningKey, KEY_ID_ZERO};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Time source for issuance and expiry checks
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// JWT claims carried by issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Tenant the subject belongs to, if multi-tenant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Issued-at timestamp (seconds)
    pub iat: i64,
    /// Expiry timestamp (seconds)
    pub exp: i64,
    /// Session ID
    pub jti: String,
}

/// Encodes, signs, and verifies tokens
pub struct TokenCodec {
    issuer: String,
    expiration: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec issuing tokens valid for `expiration_secs`
    #[must_use]
    pub fn new(issuer: String, expiration_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer,
            expiration: Duration::seconds(expiration_secs),
            clock,
        }
    }

    /// Mint a signed token for a user session.
    ///
    /// The signing key's id is embedded in the `kid` header so verification
    /// can resolve the right key after rotations.
    ///
    /// # Errors
    /// Returns [`AuthError::Signing`] when the key material cannot sign.
    pub fn issue(
        &self,
        user_id: Uuid,
        tenant: Option<String>,
        session_id: Uuid,
        key: &SigningKey,
    ) -> AuthResult<String> {
        let now = self.clock.now();
        let expiry = now + self.expiration;

        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            tenant,
            iat: now.timestamp(),
            exp: expiry.timestamp(),
            jti: session_id.to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.id.to_string());

        encode(&header, &claims, key.encoding_key())
            .map_err(|e| AuthError::Signing(format!("JWT encoding failed: {e}")))
    }

    /// Verify a presented token and return its claims.
    ///
    /// Nothing in the token is trusted before its signature verifies. The
    /// `kid` header is extracted first (absent → id 0), the verification key
    /// comes from `resolve`, then `fallback` when `resolve` has no match.
    /// Expiry is checked against the injected clock, after the signature.
    ///
    /// # Errors
    /// - [`AuthError::MalformedToken`]: not a JWT, non-decimal `kid`, or
    ///   missing required claims
    /// - [`AuthError::UnknownKey`]: no registry or fallback key for the id
    /// - [`AuthError::InvalidToken`]: signature mismatch
    /// - [`AuthError::ExpiredToken`]: validity window passed
    pub fn verify<'a, F>(
        &self,
        token: &str,
        resolve: F,
        fallback: Option<&'a SigningKey>,
    ) -> AuthResult<Claims>
    where
        F: Fn(u32) -> Option<&'a SigningKey>,
    {
        let header = decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("undecodable header: {e}")))?;

        let kid = match header.kid {
            None => KEY_ID_ZERO,
            Some(raw) => raw.parse().map_err(|_| {
                AuthError::MalformedToken(format!("non-numeric kid {raw:?} in header"))
            })?,
        };

        let key = resolve(kid)
            .or(fallback)
            .ok_or(AuthError::UnknownKey { kid })?;

        // Expiry is validated manually against the injected clock; the
        // library's own exp check would consult the system clock.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| convert_jwt_error(&e))?;
        let claims = data.claims;

        let now = self.clock.now();
        if claims.exp <= now.timestamp() {
            let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or(now);
            return Err(AuthError::ExpiredToken { expired_at });
        }

        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(AuthError::MalformedToken(
                "required claims sub/jti are empty".into(),
            ));
        }

        Ok(claims)
    }

    /// Configured token lifetime
    #[must_use]
    pub const fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Time source shared with the rest of the subsystem
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

/// Map jsonwebtoken error kinds onto the crate taxonomy
fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match e.kind() {
        ErrorKind::InvalidSignature => {
            AuthError::InvalidToken("signature verification failed".into())
        }
        ErrorKind::InvalidIssuer => AuthError::InvalidToken("issuer mismatch".into()),
        ErrorKind::InvalidToken => AuthError::MalformedToken("invalid token format".into()),
        ErrorKind::Base64(err) => AuthError::MalformedToken(format!("invalid base64: {err}")),
        ErrorKind::Json(err) => AuthError::MalformedToken(format!("invalid claims JSON: {err}")),
        ErrorKind::Utf8(err) => AuthError::MalformedToken(format!("invalid UTF-8: {err}")),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::MalformedToken(format!("missing required claim {claim}"))
        }
        _ => AuthError::InvalidToken(format!("token validation failed: {e}")),
    }
}
