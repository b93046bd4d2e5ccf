//! Billing provider seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tier::Tier;

/// Metadata key linking a provider customer back to a user
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Subscription to open at the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSubscription {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: String,
    pub tier: Tier,
    pub payment_method_id: Option<String>,
}

/// Provider response to a subscription creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSubscription {
    pub id: String,
    /// Secret the client confirms the first payment with
    pub client_secret: Option<String>,
}

/// Operations the writer and reconciler need from the billing provider
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer tagged with the user id; returns the customer id
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String>;

    /// Create a subscription that stays incomplete until payment is confirmed
    async fn create_subscription(&self, request: NewSubscription) -> Result<CreatedSubscription>;

    /// User id stored in the customer's metadata, if any
    async fn customer_user_id(&self, customer_id: &str) -> Result<Option<String>>;
}
