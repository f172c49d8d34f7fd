// ABOUTME: Authentication facade wiring keys, token codec, limits, rate limiting, and tenant checks
// ABOUTME: Owns the login/authenticate/logout flows and their rollback and deadline behavior
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Authentication Facade
//!
//! [`UserAdm`] is the single entry point the transport layer calls. It holds
//! the immutable key registry, the token codec, the session limiter, and the
//! optional rate limiter and tenant verifier, and composes them into the
//! three request flows: login, token verification, logout.
//!
//! Every store, limiter, rate-limiter, and tenant call runs under the
//! configured deadline. Login is
//! transactional in effect: if anything fails after a session was admitted,
//! the session is revoked before the error propagates, so a failed login
//! never leaves a session consuming a cap slot.

use crate::config::AuthConfig;
use crate::errors::{AuthError, AuthResult};
use crate::keys::KeyRegistry;
use crate::limits::{LimitsConfig, SessionLimiter};
use crate::models::{Principal, TokenRecord, User};
use crate::ratelimit::RateLimiter;
use crate::store::AuthStore;
use crate::tenant::{TenantAdmClient, TenantVerifier};
use crate::token::{Clock, TokenCodec};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Hash burned on the unknown-email path so a lookup miss costs the same as
/// a wrong password, leaving no timing signal for account enumeration.
fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| bcrypt::hash("useradm-timing-pad", bcrypt::DEFAULT_COST).unwrap_or_default())
}

/// User-administration authentication core
pub struct UserAdm {
    registry: Arc<KeyRegistry>,
    codec: TokenCodec,
    limiter: SessionLimiter,
    store: Arc<dyn AuthStore>,
    rate_limiter: RateLimiter,
    tenant: Option<Arc<dyn TenantVerifier>>,
    op_timeout: Duration,
}

impl UserAdm {
    /// Assemble the core from already-built components, without tenant
    /// verification
    #[must_use]
    pub fn new(
        registry: Arc<KeyRegistry>,
        codec: TokenCodec,
        limiter: SessionLimiter,
        store: Arc<dyn AuthStore>,
        rate_limiter: RateLimiter,
        op_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            codec,
            limiter,
            store,
            rate_limiter,
            tenant: None,
            op_timeout,
        }
    }

    /// Enable tenant status checks on login and token verification
    #[must_use]
    pub fn with_tenant_verification(mut self, verifier: Arc<dyn TenantVerifier>) -> Self {
        self.tenant = Some(verifier);
        self
    }

    /// Build the full core from configuration: load keys, connect the rate
    /// limiter, and construct the tenant client when an address is set.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] on any startup-fatal setting: unusable
    /// key material, a malformed rate-limit connection string, or a bad
    /// tenant-administration address.
    pub async fn from_config(
        config: &AuthConfig,
        store: Arc<dyn AuthStore>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let registry = Arc::new(KeyRegistry::load(&config.keys_config())?);
        info!(key_ids = ?registry.key_ids(), "key registry loaded");

        let codec = TokenCodec::new(
            config.jwt_issuer.clone(),
            config.jwt_expiration_secs,
            Arc::clone(&clock),
        );

        let limiter = SessionLimiter::new(
            Arc::clone(&store),
            LimitsConfig {
                max_sessions_per_user: config.limit_sessions_per_user,
                max_tokens_per_user: config.limit_tokens_per_user,
                last_used_refresh_interval: config.last_used_refresh_interval(),
            },
            clock,
        );

        let rate_limiter = RateLimiter::connect(&config.rate_limit_config()).await?;

        let core = Self::new(
            registry,
            codec,
            limiter,
            store,
            rate_limiter,
            config.op_timeout(),
        );

        match &config.tenantadm_addr {
            Some(addr) => {
                let client = TenantAdmClient::new(addr, config.op_timeout())?;
                Ok(core.with_tenant_verification(Arc::new(client)))
            }
            None => Ok(core),
        }
    }

    /// Authenticate credentials and mint a signed token.
    ///
    /// # Errors
    /// - [`AuthError::TooManyRequests`]: attempt throttled for this email
    /// - [`AuthError::InvalidCredentials`]: unknown email or wrong password
    ///   (indistinguishable from the outside)
    /// - [`AuthError::TenantVerification`]: the user's tenant is suspended
    ///   or could not be verified
    /// - [`AuthError::LimitExceeded`], [`AuthError::Store`],
    ///   [`AuthError::Signing`], [`AuthError::DeadlineExceeded`]: admission
    ///   or minting failed; no session survives these
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<String> {
        let decision = self
            .with_deadline(self.rate_limiter.allow(&format!("login:{email}")))
            .await?;
        if !decision.allowed {
            warn!(email = %email, "login attempt throttled");
            return Err(AuthError::TooManyRequests {
                retry_after: decision.retry_after,
            });
        }

        let Some(user) = self
            .with_deadline(self.store.get_user_by_email(email))
            .await?
        else {
            let _ = bcrypt::verify(password, dummy_password_hash());
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| AuthError::Store(format!("password hash verification failed: {e}")))?;
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        self.verify_tenant_active(user.tenant_id.as_deref()).await?;

        let session = self.with_deadline(self.limiter.admit(user.id)).await?;

        // Anything failing past this point must not leave the admitted
        // session occupying a cap slot.
        match self.mint(&user, session.id).await {
            Ok(token) => {
                info!(user_id = %user.id, session_id = %session.id, "login succeeded");
                Ok(token)
            }
            Err(e) => {
                if let Err(revoke_err) = self.with_deadline(self.limiter.revoke(session.id)).await {
                    warn!(
                        session_id = %session.id,
                        "session rollback failed after login error: {revoke_err}"
                    );
                }
                Err(e)
            }
        }
    }

    async fn mint(&self, user: &User, session_id: Uuid) -> AuthResult<String> {
        let key = self.registry.default_key()?;
        let token = self
            .codec
            .issue(user.id, user.tenant_id.clone(), session_id, key)?;

        let now = self.codec.clock().now();
        let record = TokenRecord {
            id: session_id,
            user_id: user.id,
            issued_at: now,
            expires_at: now + self.codec.expiration(),
        };
        self.with_deadline(self.limiter.record_token(record)).await?;
        Ok(token)
    }

    /// Verify a presented token and return the authenticated principal.
    ///
    /// The `last_used_at` refresh is fire-and-forget: a store hiccup there
    /// is logged but never turns a valid token into a 401.
    ///
    /// # Errors
    /// Token-rejection kinds per [`TokenCodec::verify`], plus
    /// [`AuthError::TenantVerification`] for a suspended tenant.
    pub async fn authenticate(&self, token: &str) -> AuthResult<Principal> {
        let claims = self.codec.verify(
            token,
            |kid| self.registry.lookup(kid),
            self.registry.fallback(),
        )?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::MalformedToken("sub is not a UUID".into()))?;
        let session_id = Uuid::parse_str(&claims.jti)
            .map_err(|_| AuthError::MalformedToken("jti is not a UUID".into()))?;

        self.verify_tenant_active(claims.tenant.as_deref()).await?;

        let now = self.codec.clock().now();
        if let Err(e) = self.with_deadline(self.limiter.touch(session_id, now)).await {
            warn!(session_id = %session_id, "last-used refresh failed: {e}");
        }

        Ok(Principal {
            user_id,
            tenant: claims.tenant,
            session_id,
        })
    }

    /// Verify a token and tear down its session.
    ///
    /// # Errors
    /// Token-rejection kinds per [`TokenCodec::verify`];
    /// [`AuthError::Store`] when the teardown writes fail.
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        let claims = self.codec.verify(
            token,
            |kid| self.registry.lookup(kid),
            self.registry.fallback(),
        )?;
        let session_id = Uuid::parse_str(&claims.jti)
            .map_err(|_| AuthError::MalformedToken("jti is not a UUID".into()))?;

        self.with_deadline(self.limiter.revoke(session_id)).await?;
        self.with_deadline(self.store.delete_token(session_id))
            .await?;
        info!(session_id = %session_id, "logout completed");
        Ok(())
    }

    /// Administrative revocation of every session and token a user holds
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] or [`AuthError::DeadlineExceeded`] when
    /// the store cannot complete the deletes.
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<()> {
        self.with_deadline(self.limiter.revoke_all(user_id)).await?;
        info!(user_id = %user_id, "all sessions and tokens revoked");
        Ok(())
    }

    async fn verify_tenant_active(&self, tenant_id: Option<&str>) -> AuthResult<()> {
        let (Some(verifier), Some(tenant_id)) = (&self.tenant, tenant_id) else {
            return Ok(());
        };
        let active = self
            .with_deadline(verifier.verify_tenant(tenant_id))
            .await?;
        if active {
            Ok(())
        } else {
            Err(AuthError::TenantVerification(format!(
                "tenant {tenant_id} is not active"
            )))
        }
    }

    /// Run a store or tenant call under the configured deadline.
    ///
    /// Cancellation is drop-driven: when the timeout fires the inner future
    /// is dropped, which abandons the in-flight call.
    async fn with_deadline<T, F>(&self, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| AuthError::DeadlineExceeded)?
    }
}
