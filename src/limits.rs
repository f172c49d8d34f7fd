// ABOUTME: Per-user session and token caps with oldest-first eviction
// ABOUTME: Bounds last-used refresh writes to one update per configured interval per session
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Session/Token Limiter
//!
//! Tracks live sessions and issued tokens per user and enforces the
//! configured caps by evicting the oldest entries. Admission and eviction run
//! under a per-user async mutex so two concurrent logins cannot both observe
//! `count == cap - 1` and exceed the cap. The contract is only that the cap
//! is never exceeded; which session survives a race at the boundary is
//! unspecified.

use crate::errors::{AuthError, AuthResult};
use crate::models::{Session, TokenRecord};
use crate::store::AuthStore;
use crate::token::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Limiter settings
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Max live sessions per user; 0 disables enforcement
    pub max_sessions_per_user: usize,
    /// Max issued tokens per user; 0 disables enforcement
    pub max_tokens_per_user: usize,
    /// Minimum interval between `last_used_at` refreshes
    pub last_used_refresh_interval: Duration,
}

/// Enforces per-user session/token caps against the backing store
pub struct SessionLimiter {
    store: Arc<dyn AuthStore>,
    config: LimitsConfig,
    clock: Arc<dyn Clock>,
    // Per-user critical sections; entries are created on first admission and
    // kept for the process lifetime (user count is operator-scale, not
    // internet-scale).
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SessionLimiter {
    /// Create a limiter over the given store
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: LimitsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop token records past their expiry, and the sessions they belong
    /// to. Runs under the caller's per-user lock; expired rows must not
    /// count against the caps or linger when caps are disabled.
    async fn purge_expired(&self, user_id: Uuid) -> AuthResult<()> {
        let now = self.clock.now();
        for token in self.store.tokens_by_user(user_id).await? {
            if token.expires_at <= now {
                debug!(user_id = %user_id, token_id = %token.id, "purging expired token");
                self.store.delete_token(token.id).await?;
                self.store.delete_session(token.id).await?;
            }
        }
        Ok(())
    }

    /// Admit a new session for a user, evicting the oldest-created sessions
    /// when the cap is reached.
    ///
    /// Expired sessions are purged first and never occupy cap slots.
    ///
    /// # Errors
    /// - [`AuthError::Store`] when the store is unavailable (limits are never
    ///   bypassed on store failure)
    /// - [`AuthError::LimitExceeded`] when the cap is reached and eviction
    ///   itself failed
    pub async fn admit(&self, user_id: Uuid) -> AuthResult<Session> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.purge_expired(user_id).await?;

        if self.config.max_sessions_per_user > 0 {
            let mut sessions = self.store.sessions_by_user(user_id).await?;
            sessions.sort_by_key(|s| s.created_at);
            while sessions.len() >= self.config.max_sessions_per_user {
                let oldest = sessions.remove(0);
                debug!(user_id = %user_id, session_id = %oldest.id, "evicting oldest session at cap");
                self.store
                    .delete_session(oldest.id)
                    .await
                    .map_err(|_| AuthError::LimitExceeded)?;
            }
        }

        let session = Session::new(user_id, self.clock.now());
        self.store.create_session(&session).await?;
        Ok(session)
    }

    /// Record an issued token, evicting the oldest-issued records when the
    /// token cap is reached. Independent of the session cap.
    ///
    /// # Errors
    /// Same contract as [`SessionLimiter::admit`].
    pub async fn record_token(&self, token: TokenRecord) -> AuthResult<()> {
        let lock = self.user_lock(token.user_id);
        let _guard = lock.lock().await;

        self.purge_expired(token.user_id).await?;

        if self.config.max_tokens_per_user > 0 {
            let mut tokens = self.store.tokens_by_user(token.user_id).await?;
            tokens.sort_by_key(|t| t.issued_at);
            while tokens.len() >= self.config.max_tokens_per_user {
                let oldest = tokens.remove(0);
                debug!(user_id = %token.user_id, token_id = %oldest.id, "evicting oldest token at cap");
                self.store
                    .delete_token(oldest.id)
                    .await
                    .map_err(|_| AuthError::LimitExceeded)?;
            }
        }

        self.store.create_token(&token).await
    }

    /// Refresh a session's `last_used_at`, at most once per configured
    /// interval.
    ///
    /// Skipping updates inside the interval is a deliberate staleness
    /// tolerance that bounds write amplification against the store. A
    /// session that has disappeared (evicted or expired) is a no-op.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] on store failure; callers on the hot
    /// path treat this as fire-and-forget and only log it.
    pub async fn touch(&self, session_id: Uuid, now: DateTime<Utc>) -> AuthResult<()> {
        let Some(session) = self.store.get_session(session_id).await? else {
            return Ok(());
        };
        if now - session.last_used_at > self.config.last_used_refresh_interval {
            self.store.update_session_last_used(session_id, now).await?;
        }
        Ok(())
    }

    /// Delete one session, used on logout
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] on store failure.
    pub async fn revoke(&self, session_id: Uuid) -> AuthResult<()> {
        self.store.delete_session(session_id).await
    }

    /// Delete all of a user's sessions and token records, used on
    /// administrative revocation
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] on store failure.
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.store.delete_sessions_by_user(user_id).await?;
        self.store.delete_tokens_by_user(user_id).await
    }
}
