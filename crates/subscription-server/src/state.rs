//! Application State

use std::sync::Arc;

use subscription_sync::{Reconciler, SubscriptionWriter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Creates subscriptions for authenticated callers
    pub writer: Arc<SubscriptionWriter>,

    /// Applies verified Stripe webhook events
    pub reconciler: Arc<Reconciler>,
}
