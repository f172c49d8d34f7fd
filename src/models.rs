// ABOUTME: Core data structures for users, sessions, and issued tokens
// ABOUTME: Shared between the store interface, limiter, and authentication facade
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Data model for the authentication core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human operator account, surfaced through the persistent store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: Uuid,
    /// Login email, unique per store
    pub email: String,
    /// bcrypt password hash
    pub password_hash: String,
    /// Tenant this user belongs to, if running multi-tenant
    pub tenant_id: Option<String>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user record
    #[must_use]
    pub fn new(email: String, password_hash: String, tenant_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            tenant_id,
            created_at: Utc::now(),
        }
    }
}

/// A live login session, created on token issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID, carried in the token's `jti` claim
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Creation time; eviction order is oldest-created-first
    pub created_at: DateTime<Utc>,
    /// Last verified use, refreshed at a bounded frequency
    pub last_used_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session for a user
    #[must_use]
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// Record of an issued token, tracked for the per-user token cap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token ID, equal to the `jti` claim
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Issuance time; eviction order is oldest-issued-first
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

/// Authenticated identity returned by token verification
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Verified user ID
    pub user_id: Uuid,
    /// Tenant from the token claims, if any
    pub tenant: Option<String>,
    /// Session the token belongs to
    pub session_id: Uuid,
}
