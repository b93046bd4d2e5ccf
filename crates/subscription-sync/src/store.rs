//! Subscription Records
//!
//! The one record per user shared by the writer and the reconciler, and the
//! storage seam both of them write through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::tier::{SubscriptionStatus, Tier};

/// Persisted subscription state for one user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Account the subscription belongs to (unique)
    pub user_id: String,

    /// Entitlement level
    pub tier: Tier,

    /// Local status
    pub status: SubscriptionStatus,

    /// Provider customer id, stable once assigned
    pub billing_customer_id: String,

    /// Provider subscription id
    pub billing_subscription_id: String,

    /// When the subscription was started
    pub started_at: DateTime<Utc>,

    /// Period end or cancellation time
    pub expires_at: Option<DateTime<Utc>>,
}

/// Insert-or-update keyed on `user_id`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionUpsert {
    pub user_id: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    /// `None` keeps the stored value; a fresh row gets the write time
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionUpsert {
    /// Apply onto an existing record, or build the first one
    pub fn apply(self, existing: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> SubscriptionRecord {
        let started_at = self
            .started_at
            .or_else(|| existing.map(|r| r.started_at))
            .unwrap_or(now);

        SubscriptionRecord {
            user_id: self.user_id,
            tier: self.tier,
            status: self.status,
            billing_customer_id: self.billing_customer_id,
            billing_subscription_id: self.billing_subscription_id,
            started_at,
            expires_at: self.expires_at,
        }
    }
}

/// Subscription storage trait
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get the record for a user
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>>;

    /// Stored provider customer id for a user, if any
    async fn find_customer_id(&self, user_id: &str) -> Result<Option<String>>;

    /// Remember a newly created provider customer for a user. Keeps the
    /// first id saved so a user never gets a second customer.
    async fn save_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()>;

    /// Insert or update the record keyed on `user_id`
    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<()>;

    /// Set `cancelled` and `expires_at` on an existing record. Returns
    /// `false` (and writes nothing) when the user has no record.
    async fn mark_cancelled(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// In-memory subscription store (for development and tests)
#[derive(Default)]
pub struct MemorySubscriptionStore {
    records: RwLock<HashMap<String, SubscriptionRecord>>,
    customers: RwLock<HashMap<String, String>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly
    pub async fn insert(&self, record: SubscriptionRecord) {
        self.records.write().await.insert(record.user_id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn find_customer_id(&self, user_id: &str) -> Result<Option<String>> {
        if let Some(record) = self.records.read().await.get(user_id) {
            return Ok(Some(record.billing_customer_id.clone()));
        }
        Ok(self.customers.read().await.get(user_id).cloned())
    }

    async fn save_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
        self.customers
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| customer_id.to_string());
        Ok(())
    }

    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<()> {
        let mut records = self.records.write().await;
        let user_id = upsert.user_id.clone();
        let record = upsert.apply(records.get(&user_id), Utc::now());
        records.insert(user_id, record);
        Ok(())
    }

    async fn mark_cancelled(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(user_id) else {
            return Ok(false);
        };
        record.status = SubscriptionStatus::Cancelled;
        record.expires_at = Some(at);
        Ok(true)
    }
}
