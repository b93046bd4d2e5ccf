//! # subscription-sync
//!
//! Keeps one local subscription record per user consistent with Stripe.
//!
//! ## Components
//!
//! ```text
//!   client ──Bearer──▶ SubscriptionWriter ──▶ Stripe (customer, subscription)
//!                             │
//!                             ▼
//!                     SubscriptionStore  ◀── Reconciler ◀──signed── Stripe webhooks
//! ```
//!
//! - [`SubscriptionWriter`] resolves the caller, reuses or creates the Stripe
//!   customer, opens an incomplete subscription and upserts the record.
//! - [`Reconciler`] verifies webhook signatures and projects
//!   `customer.subscription.{created,updated,deleted}` onto the same record.
//!
//! Both write through [`SubscriptionStore`] with last-write-wins semantics;
//! there is no ordering guard between them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use subscription_sync::{AppConfig, StripeClient, SupabaseClient, SubscriptionWriter};
//!
//! let config = AppConfig::from_env()?;
//! let supabase = Arc::new(SupabaseClient::new(&config.supabase));
//! let stripe = Arc::new(StripeClient::new(&config.stripe));
//!
//! let writer = SubscriptionWriter::new(
//!     supabase.clone(), supabase.clone(), supabase, stripe, config.prices.clone(),
//! );
//! let created = writer.create(Some("Bearer <jwt>"), request).await?;
//! ```

mod accounts;
mod config;
mod error;
mod provider;
mod signature;
mod store;
mod stripe_client;
mod supabase;
mod tier;
mod webhook;
mod writer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accounts::{bearer_token, AuthenticatedUser, Authenticator, ProfileDirectory};
pub use config::{AppConfig, StripeConfig, SupabaseConfig};
pub use error::{BillingError, Result};
pub use provider::{BillingProvider, CreatedSubscription, NewSubscription};
#[cfg(any(test, feature = "testing"))]
pub use signature::sign;
pub use signature::WebhookVerifier;
pub use store::{MemorySubscriptionStore, SubscriptionRecord, SubscriptionStore, SubscriptionUpsert};
pub use stripe_client::StripeClient;
pub use supabase::SupabaseClient;
pub use tier::{PriceTable, SubscriptionStatus, Tier};
pub use webhook::{EventKind, ProviderEvent, ReconcileOutcome, Reconciler, SubscriptionObject};
pub use writer::{CreateSubscriptionRequest, SubscriptionCreated, SubscriptionWriter};
