//! Subscription Creation
//!
//! Opens a provider subscription for an authenticated caller and records it
//! locally. Nothing here is transactional across Stripe and the database: a
//! failure after the subscription is created leaves it without a local
//! record until the next webhook for it arrives.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::accounts::{bearer_token, Authenticator, ProfileDirectory};
use crate::error::{BillingError, Result};
use crate::provider::{BillingProvider, NewSubscription};
use crate::store::{SubscriptionStore, SubscriptionUpsert};
use crate::tier::{PriceTable, SubscriptionStatus, Tier};

/// Request body for creating a subscription
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// `pro` or `business`; validated after the caller is resolved
    #[serde(default)]
    pub tier: Option<String>,

    #[serde(default)]
    pub payment_method_id: Option<String>,
}

/// Returned to the client so it can confirm the first payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCreated {
    pub subscription_id: String,
    pub client_secret: Option<String>,
}

pub struct SubscriptionWriter {
    auth: Arc<dyn Authenticator>,
    profiles: Arc<dyn ProfileDirectory>,
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
    prices: PriceTable,
}

impl SubscriptionWriter {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        profiles: Arc<dyn ProfileDirectory>,
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn BillingProvider>,
        prices: PriceTable,
    ) -> Self {
        Self {
            auth,
            profiles,
            store,
            provider,
            prices,
        }
    }

    /// `authorization` is the raw `Authorization` header value
    pub async fn create(
        &self,
        authorization: Option<&str>,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionCreated> {
        let user = self.auth.authenticate(bearer_token(authorization)?).await?;

        let email = match self.profiles.profile_email(&user.id).await? {
            Some(email) => email,
            None => user
                .email
                .clone()
                .ok_or_else(|| BillingError::InvalidArgument("no email on file for user".into()))?,
        };

        let tier: Tier = request
            .tier
            .as_deref()
            .ok_or_else(|| BillingError::InvalidArgument("tier is required".into()))?
            .parse()?;

        let customer_id = match self.store.find_customer_id(&user.id).await? {
            Some(existing) => {
                tracing::debug!(user_id = %user.id, customer_id = %existing, "Reusing Stripe customer");
                existing
            }
            None => {
                let created = self.provider.create_customer(&email, &user.id).await?;
                self.store.save_customer_id(&user.id, &created).await?;
                tracing::info!(user_id = %user.id, customer_id = %created, "Created Stripe customer");
                created
            }
        };

        let price_id = self.prices.price_for(tier)?.to_string();

        let created = self
            .provider
            .create_subscription(NewSubscription {
                customer_id: customer_id.clone(),
                price_id,
                user_id: user.id.clone(),
                tier,
                payment_method_id: request.payment_method_id,
            })
            .await?;

        self.store
            .upsert(SubscriptionUpsert {
                user_id: user.id.clone(),
                tier,
                status: SubscriptionStatus::Active,
                billing_customer_id: customer_id,
                billing_subscription_id: created.id.clone(),
                started_at: Some(Utc::now()),
                expires_at: None,
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    user_id = %user.id,
                    subscription_id = %created.id,
                    error = %e,
                    "Subscription created at Stripe but local record was not written"
                );
            })?;

        tracing::info!(
            user_id = %user.id,
            subscription_id = %created.id,
            tier = %tier,
            "Created subscription"
        );

        Ok(SubscriptionCreated {
            subscription_id: created.id,
            client_secret: created.client_secret,
        })
    }
}
