//! Supabase Adapter
//!
//! Account lookups and subscription persistence over Supabase Auth and
//! PostgREST, authenticated with the service-role key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::IgnoredAny, Deserialize, Serialize};

use crate::accounts::{AuthenticatedUser, Authenticator, ProfileDirectory};
use crate::config::SupabaseConfig;
use crate::error::{BillingError, Result};
use crate::store::{SubscriptionRecord, SubscriptionStore, SubscriptionUpsert};
use crate::tier::{SubscriptionStatus, Tier};

const SUBSCRIPTIONS_TABLE: &str = "subscriptions";
const PROFILES_TABLE: &str = "profiles";
const CUSTOMERS_TABLE: &str = "billing_customers";

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

/// Row shape of the `subscriptions` table
#[derive(Debug, Deserialize)]
struct SubscriptionRow {
    user_id: String,
    tier: Tier,
    status: SubscriptionStatus,
    #[serde(default)]
    stripe_customer_id: Option<String>,
    #[serde(default)]
    stripe_subscription_id: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            user_id: row.user_id,
            tier: row.tier,
            status: row.status,
            billing_customer_id: row.stripe_customer_id.unwrap_or_default(),
            billing_subscription_id: row.stripe_subscription_id.unwrap_or_default(),
            started_at: row.started_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    user_id: &'a str,
    tier: Tier,
    status: SubscriptionStatus,
    stripe_customer_id: &'a str,
    stripe_subscription_id: &'a str,
    // Omitted so the column default applies on insert and updates keep it
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CancelPatch {
    status: SubscriptionStatus,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CustomerIdRow {
    #[serde(default)]
    stripe_customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CustomerRow<'a> {
    user_id: &'a str,
    stripe_customer_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    fn table(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn with_service_role(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn ensure_success(resp: Response, context: &str) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        tracing::error!(status = %status, response_body = %body, context = %context, "supabase request failed");

        Err(BillingError::Upstream(format!("{context} failed with status {status}: {body}")))
    }
}

#[async_trait]
impl Authenticator for SupabaseClient {
    async fn authenticate(&self, bearer: &str) -> Result<AuthenticatedUser> {
        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(bearer)
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BillingError::Unauthorized("invalid or expired token".into()))
            }
            _ => {
                let resp = Self::ensure_success(resp, "auth user lookup").await?;
                Ok(resp.json().await?)
            }
        }
    }
}

#[async_trait]
impl ProfileDirectory for SupabaseClient {
    async fn profile_email(&self, user_id: &str) -> Result<Option<String>> {
        let resp = self
            .with_service_role(self.http.get(self.table(PROFILES_TABLE)))
            .query(&[("id", format!("eq.{user_id}")), ("select", "email".into())])
            .send()
            .await?;
        let rows: Vec<ProfileRow> = Self::ensure_success(resp, "profile lookup").await?.json().await?;

        Ok(rows.into_iter().next().and_then(|row| row.email))
    }
}

#[async_trait]
impl SubscriptionStore for SupabaseClient {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        let resp = self
            .with_service_role(self.http.get(self.table(SUBSCRIPTIONS_TABLE)))
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".into())])
            .send()
            .await?;
        let rows: Vec<SubscriptionRow> = Self::ensure_success(resp, "subscription lookup").await?.json().await?;

        Ok(rows.into_iter().next().map(SubscriptionRecord::from))
    }

    async fn find_customer_id(&self, user_id: &str) -> Result<Option<String>> {
        // Subscription rows first, then customers saved before any subscription existed
        for table in [SUBSCRIPTIONS_TABLE, CUSTOMERS_TABLE] {
            let resp = self
                .with_service_role(self.http.get(self.table(table)))
                .query(&[
                    ("user_id", format!("eq.{user_id}")),
                    ("select", "stripe_customer_id".into()),
                ])
                .send()
                .await?;
            let rows: Vec<CustomerIdRow> = Self::ensure_success(resp, "customer id lookup").await?.json().await?;

            let found = rows
                .into_iter()
                .next()
                .and_then(|row| row.stripe_customer_id)
                .filter(|id| !id.is_empty());
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    async fn save_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
        let row = CustomerRow {
            user_id,
            stripe_customer_id: customer_id,
        };

        let resp = self
            .with_service_role(self.http.post(self.table(CUSTOMERS_TABLE)))
            .query(&[("on_conflict", "user_id")])
            .header("prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::ensure_success(resp, "customer id save").await?;

        Ok(())
    }

    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<()> {
        let row = UpsertRow {
            user_id: &upsert.user_id,
            tier: upsert.tier,
            status: upsert.status,
            stripe_customer_id: &upsert.billing_customer_id,
            stripe_subscription_id: &upsert.billing_subscription_id,
            started_at: upsert.started_at,
            expires_at: upsert.expires_at,
        };

        let resp = self
            .with_service_role(self.http.post(self.table(SUBSCRIPTIONS_TABLE)))
            .query(&[("on_conflict", "user_id")])
            .header("prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::ensure_success(resp, "subscription upsert").await?;

        Ok(())
    }

    async fn mark_cancelled(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let patch = CancelPatch {
            status: SubscriptionStatus::Cancelled,
            expires_at: at,
        };

        let resp = self
            .with_service_role(self.http.patch(self.table(SUBSCRIPTIONS_TABLE)))
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "user_id".into())])
            .header("prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let matched: Vec<IgnoredAny> = Self::ensure_success(resp, "subscription cancel").await?.json().await?;

        Ok(!matched.is_empty())
    }
}
