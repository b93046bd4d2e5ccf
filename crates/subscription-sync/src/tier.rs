//! Tiers, statuses and price mapping

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, Result};

/// Paid entitlement level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Pro,
    Business,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Pro, Tier::Business];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pro => "pro",
            Tier::Business => "business",
        }
    }
}

impl FromStr for Tier {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pro" => Ok(Tier::Pro),
            "business" => Ok(Tier::Business),
            other => Err(BillingError::InvalidArgument(format!(
                "tier must be 'pro' or 'business', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    /// Project a provider status string. Only `active` counts as active;
    /// trialing, past_due, incomplete and the rest are all cancelled.
    pub fn from_provider(status: &str) -> Self {
        if status == "active" {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Cancelled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

/// Tier <-> provider price id mapping
#[derive(Clone, Debug, Default)]
pub struct PriceTable {
    prices: HashMap<Tier, String>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, tier: Tier, price_id: impl Into<String>) -> Self {
        self.prices.insert(tier, price_id.into());
        self
    }

    /// Price id to subscribe a tier to
    pub fn price_for(&self, tier: Tier) -> Result<&str> {
        self.prices
            .get(&tier)
            .map(String::as_str)
            .ok_or_else(|| BillingError::Config(format!("no price configured for tier '{tier}'")))
    }

    /// Reverse lookup used by the reconciler. Only configured price ids
    /// resolve; price labels are never consulted.
    pub fn tier_for_price(&self, price_id: &str) -> Option<Tier> {
        self.prices
            .iter()
            .find(|(_, id)| id.as_str() == price_id)
            .map(|(tier, _)| *tier)
    }
}
