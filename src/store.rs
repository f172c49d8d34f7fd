// ABOUTME: Persistent store interface for users, sessions, and token records
// ABOUTME: Includes an in-memory implementation for tests and single-node development
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Store abstraction consumed by the limiter and the authentication facade.
//!
//! The real deployment backs this with a document store; the subsystem only
//! depends on this narrow interface. Store failures surface as
//! [`AuthError::Store`] and are retryable by the caller — limits are never
//! silently bypassed when the store is down.

use crate::errors::{AuthError, AuthResult};
use crate::models::{Session, TokenRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Persistence operations required by the authentication core
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Look a user up by login email
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Persist a new session
    async fn create_session(&self, session: &Session) -> AuthResult<()>;

    /// All live sessions for a user
    async fn sessions_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>>;

    /// Fetch one session
    async fn get_session(&self, session_id: Uuid) -> AuthResult<Option<Session>>;

    /// Overwrite a session's `last_used_at`
    async fn update_session_last_used(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Delete one session; deleting a missing session is not an error
    async fn delete_session(&self, session_id: Uuid) -> AuthResult<()>;

    /// Delete every session a user owns
    async fn delete_sessions_by_user(&self, user_id: Uuid) -> AuthResult<()>;

    /// Persist an issued-token record
    async fn create_token(&self, token: &TokenRecord) -> AuthResult<()>;

    /// All token records for a user
    async fn tokens_by_user(&self, user_id: Uuid) -> AuthResult<Vec<TokenRecord>>;

    /// Delete one token record; deleting a missing record is not an error
    async fn delete_token(&self, token_id: Uuid) -> AuthResult<()>;

    /// Delete every token record a user owns
    async fn delete_tokens_by_user(&self, user_id: Uuid) -> AuthResult<()>;
}

/// In-memory store backed by concurrent maps.
///
/// Suitable for tests and single-node development; production deployments
/// implement [`AuthStore`] against their document store.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    sessions: DashMap<Uuid, Session>,
    tokens: DashMap<Uuid, TokenRecord>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user account, keyed by email
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.email.clone(), user);
    }

    /// Number of live sessions across all users, for test assertions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(email).map(|u| u.clone()))
    }

    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn sessions_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn get_session(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.sessions.get(&session_id).map(|s| s.clone()))
    }

    async fn update_session_last_used(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> AuthResult<()> {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => {
                session.last_used_at = at;
                Ok(())
            }
            None => Err(AuthError::Store(format!("session {session_id} not found"))),
        }
    }

    async fn delete_session(&self, session_id: Uuid) -> AuthResult<()> {
        self.sessions.remove(&session_id);
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: Uuid) -> AuthResult<()> {
        self.sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn create_token(&self, token: &TokenRecord) -> AuthResult<()> {
        self.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn tokens_by_user(&self, user_id: Uuid) -> AuthResult<Vec<TokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn delete_token(&self, token_id: Uuid) -> AuthResult<()> {
        self.tokens.remove(&token_id);
        Ok(())
    }

    async fn delete_tokens_by_user(&self, user_id: Uuid) -> AuthResult<()> {
        self.tokens.retain(|_, t| t.user_id != user_id);
        Ok(())
    }
}
