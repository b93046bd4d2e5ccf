//! Configuration
//!
//! Built once at startup and handed to each component.

use std::fmt;

use crate::error::{BillingError, Result};
use crate::tier::{PriceTable, Tier};

const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Stripe credentials
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Maximum age of a signed webhook, in seconds
    pub webhook_tolerance_secs: i64,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

/// Supabase project access (auth + PostgREST)
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &"<redacted>")
            .finish()
    }
}

/// Everything the server needs
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub stripe: StripeConfig,
    pub supabase: SupabaseConfig,
    pub prices: PriceTable,
    pub bind_addr: String,
}

impl AppConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| BillingError::Config(format!("{key} not set")));

        let webhook_tolerance_secs = match get("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                BillingError::Config(format!("STRIPE_WEBHOOK_TOLERANCE_SECS is not a number: {raw}"))
            })?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        let stripe = StripeConfig {
            secret_key: require("STRIPE_SECRET_KEY")?,
            webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_secs,
        };

        let supabase = SupabaseConfig {
            url: require("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            service_role_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
        };

        // Price ids are optional here; an unmapped tier fails when it is requested.
        let mut prices = PriceTable::new();
        for (tier, key) in [(Tier::Pro, "STRIPE_PRICE_PRO"), (Tier::Business, "STRIPE_PRICE_BUSINESS")] {
            if let Some(price_id) = get(key) {
                prices = prices.with_price(tier, price_id);
            }
        }

        Ok(Self {
            stripe,
            supabase,
            prices,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        })
    }
}
