//! Stripe Webhook Handling
//!
//! Projects subscription lifecycle events onto the local subscription
//! record. Events are verified, decoded into [`ProviderEvent`], then applied
//! by the [`Reconciler`].

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::provider::BillingProvider;
use crate::signature::WebhookVerifier;
use crate::store::{SubscriptionStore, SubscriptionUpsert};
use crate::tier::{PriceTable, SubscriptionStatus};

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Verified provider event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    /// Provider-side creation time (unix seconds)
    pub created: i64,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    /// Anything else; acknowledged without effect
    Unrecognized { event_type: String },
}

impl EventKind {
    pub fn event_type(&self) -> &str {
        match self {
            EventKind::SubscriptionCreated(_) => SUBSCRIPTION_CREATED,
            EventKind::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            EventKind::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            EventKind::Unrecognized { event_type } => event_type,
        }
    }
}

/// The subscription fields the reconciler reads
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: CustomerRef,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

/// `customer` arrives as an id, or as an object when expanded
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CustomerRef {
    Id(String),
    Expanded { id: String },
}

impl CustomerRef {
    pub fn id(&self) -> &str {
        match self {
            CustomerRef::Id(id) | CustomerRef::Expanded { id } => id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Price {
    pub id: String,
}

impl SubscriptionObject {
    /// Period end, falling back to the first item on newer API versions
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_end))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn price(&self) -> Option<&Price> {
        self.items.data.first().map(|item| &item.price)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    created: i64,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

impl ProviderEvent {
    /// Decode a verified payload
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidArgument(format!("malformed event payload: {e}")))?;

        let subscription = |object: serde_json::Value| -> Result<SubscriptionObject> {
            serde_json::from_value(object)
                .map_err(|e| BillingError::InvalidArgument(format!("malformed subscription object: {e}")))
        };

        let kind = match raw.type_.as_str() {
            SUBSCRIPTION_CREATED => EventKind::SubscriptionCreated(subscription(raw.data.object)?),
            SUBSCRIPTION_UPDATED => EventKind::SubscriptionUpdated(subscription(raw.data.object)?),
            SUBSCRIPTION_DELETED => EventKind::SubscriptionDeleted(subscription(raw.data.object)?),
            other => EventKind::Unrecognized { event_type: other.to_string() },
        };

        Ok(Self {
            id: raw.id,
            created: raw.created,
            kind,
        })
    }
}

/// What applying an event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Record written from a created/updated event
    Upserted { user_id: String },
    /// Record marked cancelled from a deleted event
    Cancelled { user_id: String },
    /// Deleted event for a user with no record; nothing written
    NothingToCancel { user_id: String },
    /// Customer has no user id in its metadata
    UnknownCustomer { customer_id: String },
    /// Price maps to no tier
    UnmappedPrice { price_id: Option<String> },
    /// Event type not handled
    Ignored { event_type: String },
}

/// Applies provider lifecycle events to the subscription store
pub struct Reconciler {
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
    prices: PriceTable,
    verifier: WebhookVerifier,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn BillingProvider>,
        prices: PriceTable,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            store,
            provider,
            prices,
            verifier,
        }
    }

    /// Check the `Stripe-Signature` header against the raw body
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<()> {
        self.verifier.verify(payload, signature)
    }

    /// Decode and apply a payload that already passed [`Self::verify`]
    pub async fn process(&self, payload: &[u8]) -> Result<ReconcileOutcome> {
        let event = ProviderEvent::from_json(payload)?;
        self.handle(event).await
    }

    /// Process an event at the current time
    pub async fn handle(&self, event: ProviderEvent) -> Result<ReconcileOutcome> {
        self.handle_at(event, Utc::now()).await
    }

    /// Process an event; `now` stamps cancellations
    pub async fn handle_at(&self, event: ProviderEvent, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        tracing::info!(event_id = %event.id, event_type = %event.kind.event_type(), "Processing Stripe webhook");

        match event.kind {
            EventKind::SubscriptionCreated(sub) | EventKind::SubscriptionUpdated(sub) => {
                let customer_id = sub.customer.id().to_string();
                let Some(user_id) = self.provider.customer_user_id(&customer_id).await? else {
                    tracing::warn!(customer_id = %customer_id, "No user linked to customer, dropping event");
                    return Ok(ReconcileOutcome::UnknownCustomer { customer_id });
                };

                let price = sub.price();
                let Some(tier) = price.and_then(|p| self.prices.tier_for_price(&p.id)) else {
                    let price_id = price.map(|p| p.id.clone());
                    tracing::warn!(
                        subscription_id = %sub.id,
                        price_id = ?price_id,
                        "Subscription price maps to no tier, dropping event"
                    );
                    return Ok(ReconcileOutcome::UnmappedPrice { price_id });
                };

                let status = SubscriptionStatus::from_provider(&sub.status);
                let expires_at = sub.period_end();

                self.store
                    .upsert(SubscriptionUpsert {
                        user_id: user_id.clone(),
                        tier,
                        status,
                        billing_customer_id: customer_id,
                        billing_subscription_id: sub.id.clone(),
                        started_at: None,
                        expires_at,
                    })
                    .await?;

                tracing::info!(
                    user_id = %user_id,
                    subscription_id = %sub.id,
                    tier = %tier,
                    status = status.as_str(),
                    "Synced subscription"
                );
                Ok(ReconcileOutcome::Upserted { user_id })
            }

            EventKind::SubscriptionDeleted(sub) => {
                let customer_id = sub.customer.id().to_string();
                let Some(user_id) = self.provider.customer_user_id(&customer_id).await? else {
                    tracing::warn!(customer_id = %customer_id, "No user linked to customer, dropping event");
                    return Ok(ReconcileOutcome::UnknownCustomer { customer_id });
                };

                if !self.store.mark_cancelled(&user_id, now).await? {
                    tracing::warn!(user_id = %user_id, subscription_id = %sub.id, "No subscription record to cancel");
                    return Ok(ReconcileOutcome::NothingToCancel { user_id });
                }

                tracing::info!(user_id = %user_id, subscription_id = %sub.id, "Cancelled subscription");
                Ok(ReconcileOutcome::Cancelled { user_id })
            }

            EventKind::Unrecognized { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(ReconcileOutcome::Ignored { event_type })
            }
        }
    }
}
