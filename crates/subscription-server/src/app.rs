//! Router assembly

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{create_subscription, health_check, stripe_webhook, STRIPE_SIGNATURE_HEADER};
use crate::state::AppState;

/// Preflight answers for browser callers of both endpoints
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static(STRIPE_SIGNATURE_HEADER),
        ])
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/subscriptions", post(create_subscription))
        .route("/webhook/stripe", post(stripe_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use subscription_sync::testing::{FakeAccounts, FakeBillingProvider};
    use subscription_sync::{
        sign, MemorySubscriptionStore, PriceTable, Reconciler, SubscriptionStatus, SubscriptionStore,
        SubscriptionWriter, Tier, WebhookVerifier,
    };

    const SECRET: &str = "whsec_router_test";

    struct TestApp {
        store: Arc<MemorySubscriptionStore>,
        provider: Arc<FakeBillingProvider>,
        router: Router,
    }

    fn app() -> TestApp {
        let accounts = Arc::new(FakeAccounts::new().with_user("token_1", "user_1", "one@example.com"));
        let store = Arc::new(MemorySubscriptionStore::new());
        let provider = Arc::new(FakeBillingProvider::new().with_customer("cus_known", "user_1"));
        let prices = PriceTable::new()
            .with_price(Tier::Pro, "price_pro")
            .with_price(Tier::Business, "price_biz");

        let state = AppState {
            writer: Arc::new(SubscriptionWriter::new(
                accounts.clone(),
                accounts,
                store.clone(),
                provider.clone(),
                prices.clone(),
            )),
            reconciler: Arc::new(Reconciler::new(
                store.clone(),
                provider.clone(),
                prices,
                WebhookVerifier::new(SECRET, 300),
            )),
        };

        TestApp {
            store,
            provider,
            router: router(state),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn webhook_payload(event_type: &str, customer: &str) -> String {
        json!({
            "id": "evt_1",
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": { "object": {
                "id": "sub_1",
                "customer": customer,
                "status": "canceled",
                "items": { "data": [{ "price": { "id": "price_pro" } }] }
            }}
        })
        .to_string()
    }

    fn webhook_request(payload: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook/stripe")
            .header(CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(STRIPE_SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    fn subscribe_request(auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/subscriptions")
            .header(CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_create_subscription_success() {
        let app = app();
        let response = app
            .router
            .oneshot(subscribe_request(
                Some("Bearer token_1"),
                json!({ "tier": "pro", "payment_method_id": "pm_1" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["subscription_id"], "sub_fake_1");
        assert!(body["client_secret"].is_string());

        let record = app.store.get("user_1").await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Pro);
        assert_eq!(record.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_create_subscription_failures_are_400() {
        let cases = [
            (None, json!({ "tier": "pro" })),
            (Some("Bearer wrong"), json!({ "tier": "pro" })),
            (Some("Bearer token_1"), json!({ "tier": "enterprise" })),
            (Some("Bearer token_1"), json!({})),
            (Some("Bearer token_1"), json!({ "tier": 7 })),
        ];

        for (auth, body) in cases {
            let app = app();
            let response = app.router.oneshot(subscribe_request(auth, body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(body_json(response).await["error"].is_string());
            assert!(app.store.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_create_subscription_declined_card_is_400() {
        let app = app();
        app.provider.fail_subscriptions(true);

        let response = app
            .router
            .oneshot(subscribe_request(
                Some("Bearer token_1"),
                json!({ "tier": "business", "payment_method_id": "pm_declined" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UPSTREAM_ERROR");
        assert!(body["error"].as_str().unwrap().contains("declined"));
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_webhook_missing_signature() {
        let app = app();
        let payload = webhook_payload("customer.subscription.deleted", "cus_known");
        let response = app.router.oneshot(webhook_request(&payload, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No signature");
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_writes_nothing() {
        let app = app();
        app.store
            .upsert(subscription_sync::SubscriptionUpsert {
                user_id: "user_1".into(),
                tier: Tier::Pro,
                status: SubscriptionStatus::Active,
                billing_customer_id: "cus_known".into(),
                billing_subscription_id: "sub_1".into(),
                started_at: None,
                expires_at: None,
            })
            .await
            .unwrap();

        let payload = webhook_payload("customer.subscription.deleted", "cus_known");
        let signature = sign(payload.as_bytes(), "whsec_forged", Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Webhook Error: "), "{error}");

        let record = app.store.get("user_1").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(app.provider.customer_lookups(), 0);
    }

    #[tokio::test]
    async fn test_webhook_unrecognized_event_acknowledged() {
        let app = app();
        let payload = webhook_payload("invoice.finalized", "cus_known");
        let signature = sign(payload.as_bytes(), SECRET, Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_webhook_deleted_event_cancels() {
        let app = app();
        app.store
            .upsert(subscription_sync::SubscriptionUpsert {
                user_id: "user_1".into(),
                tier: Tier::Business,
                status: SubscriptionStatus::Active,
                billing_customer_id: "cus_known".into(),
                billing_subscription_id: "sub_1".into(),
                started_at: None,
                expires_at: None,
            })
            .await
            .unwrap();

        let before = Utc::now();
        let payload = webhook_payload("customer.subscription.deleted", "cus_known");
        let signature = sign(payload.as_bytes(), SECRET, Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let record = app.store.get("user_1").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Cancelled);
        let expires_at = record.expires_at.unwrap();
        assert!(expires_at >= before && expires_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_webhook_unknown_customer_acknowledged() {
        let app = app();
        let payload = webhook_payload("customer.subscription.updated", "cus_stranger");
        let signature = sign(payload.as_bytes(), SECRET, Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_webhook_upstream_failure_still_acknowledged() {
        let app = app();
        app.provider.fail_customer_lookups();

        let payload = webhook_payload("customer.subscription.updated", "cus_known");
        let signature = sign(payload.as_bytes(), SECRET, Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
        assert_eq!(app.provider.customer_lookups(), 1);
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_webhook_undecodable_signed_event_acknowledged() {
        let app = app();
        let payload = json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "created": Utc::now().timestamp(),
            "data": { "object": { "id": "sub_1" } }
        })
        .to_string();
        let signature = sign(payload.as_bytes(), SECRET, Utc::now().timestamp());
        let response = app
            .router
            .oneshot(webhook_request(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
        assert_eq!(app.provider.customer_lookups(), 0);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/subscriptions")
            .header("origin", "https://app.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "authorization,content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let allowed = response
            .headers()
            .get("access-control-allow-methods")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(allowed.contains("POST"), "{allowed}");
        assert!(response.headers().contains_key("access-control-allow-headers"));
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }
}
