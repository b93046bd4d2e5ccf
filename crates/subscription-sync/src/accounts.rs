//! Account provider seams

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Caller resolved from a bearer credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves a bearer credential to a user. Token verification itself is
/// left to the account provider.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Fails with `Unauthorized` when the token is rejected
    async fn authenticate(&self, bearer: &str) -> Result<AuthenticatedUser>;
}

/// Account profile lookups
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile_email(&self, user_id: &str) -> Result<Option<String>>;
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(authorization: Option<&str>) -> Result<&str> {
    let value = authorization
        .ok_or_else(|| BillingError::Unauthorized("missing Authorization header".into()))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| BillingError::Unauthorized("expected a Bearer token".into()))?;

    if token.is_empty() {
        return Err(BillingError::Unauthorized("empty Bearer token".into()));
    }
    Ok(token)
}
