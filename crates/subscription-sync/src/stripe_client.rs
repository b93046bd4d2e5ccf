//! Stripe Integration
//!
//! `BillingProvider` backed by the Stripe API through async-stripe.

use async_trait::async_trait;
use std::collections::HashMap;
use stripe::{
    Client, CreateCustomer, CreateSubscription, CreateSubscriptionItems,
    CreateSubscriptionPaymentSettings, CreateSubscriptionPaymentSettingsSaveDefaultPaymentMethod,
    Customer, CustomerId, Expandable, Subscription, SubscriptionPaymentBehavior,
};

use crate::config::StripeConfig;
use crate::error::{BillingError, Result};
use crate::provider::{BillingProvider, CreatedSubscription, NewSubscription, USER_ID_METADATA_KEY};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
        }
    }
}

fn parse_customer_id(customer_id: &str) -> Result<CustomerId> {
    customer_id
        .parse()
        .map_err(|_| BillingError::InvalidArgument(format!("malformed customer id '{customer_id}'")))
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String> {
        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.metadata = Some(HashMap::from([(
            USER_ID_METADATA_KEY.to_string(),
            user_id.to_string(),
        )]));

        let customer = Customer::create(&self.client, params).await?;

        tracing::info!(customer_id = %customer.id, user_id = %user_id, "Created Stripe customer");
        Ok(customer.id.to_string())
    }

    async fn create_subscription(&self, request: NewSubscription) -> Result<CreatedSubscription> {
        let mut params = CreateSubscription::new(parse_customer_id(&request.customer_id)?);
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(request.price_id.clone()),
            ..Default::default()
        }]);
        params.payment_behavior = Some(SubscriptionPaymentBehavior::DefaultIncomplete);
        params.payment_settings = Some(CreateSubscriptionPaymentSettings {
            save_default_payment_method: Some(
                CreateSubscriptionPaymentSettingsSaveDefaultPaymentMethod::OnSubscription,
            ),
            ..Default::default()
        });
        params.default_payment_method = request.payment_method_id.as_deref();
        params.expand = &["latest_invoice.payment_intent"];
        params.metadata = Some(HashMap::from([
            (USER_ID_METADATA_KEY.to_string(), request.user_id.clone()),
            ("tier".to_string(), request.tier.as_str().to_string()),
        ]));

        let subscription = Subscription::create(&self.client, params).await?;

        let client_secret = subscription
            .latest_invoice
            .as_ref()
            .and_then(Expandable::as_object)
            .and_then(|invoice| invoice.payment_intent.as_ref())
            .and_then(Expandable::as_object)
            .and_then(|intent| intent.client_secret.clone());

        if client_secret.is_none() {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Subscription created without a payment intent client secret"
            );
        }

        Ok(CreatedSubscription {
            id: subscription.id.to_string(),
            client_secret,
        })
    }

    async fn customer_user_id(&self, customer_id: &str) -> Result<Option<String>> {
        let customer = Customer::retrieve(&self.client, &parse_customer_id(customer_id)?, &[]).await?;

        Ok(customer
            .metadata
            .as_ref()
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .filter(|id| !id.is_empty())
            .cloned())
    }
}
