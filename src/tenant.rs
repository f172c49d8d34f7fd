// ABOUTME: Tenant status verification against the tenant-administration service
// ABOUTME: Trait seam so multi-tenant checks can be stubbed out in tests and single-tenant deployments
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tenant verification for multi-tenant deployments.
//!
//! When a tenant-administration address is configured, every login and every
//! token verification confirms that the subject's tenant is still active. A
//! suspended tenant turns valid credentials and valid tokens into 401s
//! without touching the tokens themselves.

use crate::errors::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Checks whether a tenant is currently allowed to authenticate
#[async_trait]
pub trait TenantVerifier: Send + Sync {
    /// Returns `Ok(true)` when the tenant exists and is active, `Ok(false)`
    /// when it exists but is suspended or is unknown.
    ///
    /// # Errors
    /// Returns [`AuthError::TenantVerification`] when the verification call
    /// itself fails; callers must treat that as a rejection, not an allow.
    async fn verify_tenant(&self, tenant_id: &str) -> AuthResult<bool>;
}

#[derive(Debug, Deserialize)]
struct TenantInfo {
    status: String,
}

/// HTTP client for the internal tenant-administration API
pub struct TenantAdmClient {
    http: reqwest::Client,
    base: Url,
}

impl TenantAdmClient {
    /// Build a client for the tenant-administration service at `addr`.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] when `addr` is not a valid base URL or
    /// the HTTP client cannot be constructed.
    pub fn new(addr: &str, timeout: Duration) -> AuthResult<Self> {
        let base = Url::parse(addr)
            .map_err(|e| AuthError::Config(format!("invalid tenantadm address {addr:?}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("tenantadm client build failed: {e}")))?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl TenantVerifier for TenantAdmClient {
    async fn verify_tenant(&self, tenant_id: &str) -> AuthResult<bool> {
        let url = self
            .base
            .join(&format!("api/internal/v1/tenantadm/tenants/{tenant_id}"))
            .map_err(|e| AuthError::TenantVerification(format!("bad tenant URL: {e}")))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::TenantVerification(format!("tenantadm unreachable: {e}")))?;

        match response.status().as_u16() {
            200 => {
                let info: TenantInfo = response.json().await.map_err(|e| {
                    AuthError::TenantVerification(format!("undecodable tenant response: {e}"))
                })?;
                let active = info.status == "active";
                debug!(tenant_id = %tenant_id, status = %info.status, "tenant status checked");
                Ok(active)
            }
            404 => Ok(false),
            code => Err(AuthError::TenantVerification(format!(
                "tenantadm returned status {code}"
            ))),
        }
    }
}
