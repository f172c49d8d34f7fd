// ABOUTME: Multi-key JWT authentication core for the user-administration service
// ABOUTME: Key rotation via directory scan, session/token caps, rate limiting, tenant checks
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # useradm
//!
//! Authentication and token-lifecycle core of the user-administration
//! service. Tokens are RS256 JWTs whose `kid` header carries a numeric key
//! id; verification keys are loaded once at startup from a directory whose
//! filenames encode the ids, so key rotation is a file drop plus a restart.
//!
//! The crate is transport-agnostic: [`useradm::UserAdm`] exposes the login,
//! verification, logout, and revocation flows, and the HTTP layer maps
//! [`errors::AuthError`] onto status codes via
//! [`errors::AuthError::http_status`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Environment-based configuration
pub mod config;
/// Unified error taxonomy
pub mod errors;
/// RSA signing key registry with filename-derived key ids
pub mod keys;
/// Per-user session and token caps
pub mod limits;
/// Structured logging setup
pub mod logging;
/// Core data structures
pub mod models;
/// Redis-backed login rate limiting
pub mod ratelimit;
/// Persistent store interface and in-memory implementation
pub mod store;
/// Tenant status verification
pub mod tenant;
/// JWT encode/decode with key-id resolution
pub mod token;
/// Authentication facade
pub mod useradm;

pub use errors::{AuthError, AuthResult};
