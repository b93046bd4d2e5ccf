//! In-process fakes for tests. Enabled with the `testing` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::accounts::{AuthenticatedUser, Authenticator, ProfileDirectory};
use crate::error::{BillingError, Result};
use crate::provider::{BillingProvider, CreatedSubscription, NewSubscription};
use crate::store::{MemorySubscriptionStore, SubscriptionRecord, SubscriptionStore, SubscriptionUpsert};

/// Billing provider that records calls instead of talking to Stripe
#[derive(Default)]
pub struct FakeBillingProvider {
    customers: Mutex<HashMap<String, String>>,
    subscriptions: Mutex<Vec<NewSubscription>>,
    customers_created: AtomicUsize,
    customer_lookups: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_subscriptions: AtomicBool,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a customer whose metadata points at `user_id`
    pub fn with_customer(self, customer_id: &str, user_id: &str) -> Self {
        self.customers
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), user_id.to_string());
        self
    }

    pub fn fail_customer_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    /// Reject subscription creation, as a declined card would
    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub fn customer_lookups(&self) -> usize {
        self.customer_lookups.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<NewSubscription> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingProvider for FakeBillingProvider {
    async fn create_customer(&self, _email: &str, user_id: &str) -> Result<String> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        let customer_id = format!("cus_fake_{n}");
        self.customers
            .lock()
            .unwrap()
            .insert(customer_id.clone(), user_id.to_string());
        Ok(customer_id)
    }

    async fn create_subscription(&self, request: NewSubscription) -> Result<CreatedSubscription> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(BillingError::Upstream("Your card was declined.".into()));
        }
        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.push(request);
        let n = subscriptions.len();
        Ok(CreatedSubscription {
            id: format!("sub_fake_{n}"),
            client_secret: Some(format!("pi_fake_{n}_secret_fake")),
        })
    }

    async fn customer_user_id(&self, customer_id: &str) -> Result<Option<String>> {
        self.customer_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(BillingError::Upstream("customer lookup failed".into()));
        }
        Ok(self.customers.lock().unwrap().get(customer_id).cloned())
    }
}

/// Account provider with fixed tokens and profiles
#[derive(Default)]
pub struct FakeAccounts {
    tokens: HashMap<String, AuthenticatedUser>,
    profiles: HashMap<String, String>,
    profile_lookups: AtomicUsize,
}

impl FakeAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user with a profile email
    pub fn with_user(mut self, token: &str, user_id: &str, email: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            AuthenticatedUser {
                id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        );
        self.profiles.insert(user_id.to_string(), email.to_string());
        self
    }

    /// Register a token whose user has no email anywhere
    pub fn with_anonymous_user(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            AuthenticatedUser {
                id: user_id.to_string(),
                email: None,
            },
        );
        self
    }

    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FakeAccounts {
    async fn authenticate(&self, bearer: &str) -> Result<AuthenticatedUser> {
        self.tokens
            .get(bearer)
            .cloned()
            .ok_or_else(|| BillingError::Unauthorized("invalid token".into()))
    }
}

#[async_trait]
impl ProfileDirectory for FakeAccounts {
    async fn profile_email(&self, user_id: &str) -> Result<Option<String>> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.get(user_id).cloned())
    }
}

/// Memory store whose upserts can be switched to fail
#[derive(Default)]
pub struct FlakySubscriptionStore {
    inner: MemorySubscriptionStore,
    fail_upserts: AtomicBool,
}

impl FlakySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }
}

#[async_trait]
impl SubscriptionStore for FlakySubscriptionStore {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        self.inner.get(user_id).await
    }

    async fn find_customer_id(&self, user_id: &str) -> Result<Option<String>> {
        self.inner.find_customer_id(user_id).await
    }

    async fn save_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
        self.inner.save_customer_id(user_id, customer_id).await
    }

    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(BillingError::Upstream("subscription upsert failed with status 503".into()));
        }
        self.inner.upsert(upsert).await
    }

    async fn mark_cancelled(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_cancelled(user_id, at).await
    }
}
