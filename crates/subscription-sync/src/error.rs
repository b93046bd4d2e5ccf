//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors raised by the writer, the reconciler and their adapters
#[derive(Error, Debug)]
pub enum BillingError {
    /// Caller credential missing or rejected by the account provider
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed tier, missing field or undecodable payload
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Webhook signature did not verify
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Required configuration is missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// Billing provider or database call failed
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl BillingError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Upstream(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            BillingError::Unauthorized(_) => "Not authenticated.",
            BillingError::InvalidArgument(_) => "The request was invalid.",
            BillingError::InvalidSignature(_) => "Webhook signature could not be verified.",
            BillingError::Config(_) => "Service configuration error.",
            BillingError::Upstream(_) => "Payment processing failed. Please try again.",
        }
    }

    /// Short machine-readable code for error bodies
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Unauthorized(_) => "UNAUTHORIZED",
            BillingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BillingError::InvalidSignature(_) => "INVALID_SIGNATURE",
            BillingError::Config(_) => "CONFIGURATION_ERROR",
            BillingError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Upstream(err.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::Upstream(err.to_string())
    }
}
