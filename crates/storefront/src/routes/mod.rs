//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                       - Liveness
//! GET   /health/ready                 - Order store reachable (or disabled)
//!
//! # Upstream proxies (credentials injected server-side)
//! GET   /api/registrar?command=...    - Registrar command passthrough
//! GET   /api/fulfillment/products     - Sellable items
//! POST  /api/fulfillment/orders       - Create a fulfillment order
//!
//! # Orders (503 when remote persistence is disabled)
//! GET   /api/orders/{buyer}           - Order history for a wallet
//! POST  /api/orders                   - Record an order
//! PATCH /api/orders/{id}/status       - Processing -> Confirmed | Failed
//! PUT   /api/domains/{full_name}      - Save an owned domain
//!
//! # Chain
//! GET   /api/network                  - Chain id, token contract, merchant
//! ```

pub mod fulfillment;
pub mod health;
pub mod network;
pub mod orders;
pub mod registrar;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{api_rate_limiter, proxy_rate_limiter, request_id_middleware};
use crate::state::AppState;

/// Create the upstream proxy routes router.
pub fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/registrar", get(registrar::proxy))
        .route("/fulfillment/products", get(fulfillment::list_products))
        .route("/fulfillment/orders", post(fulfillment::create_order))
        .layer(proxy_rate_limiter())
}

/// Create the order and domain routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::create))
        // Same parameter name at the same depth: buyer address or order id
        .route("/orders/{key}", get(orders::list_for_buyer))
        .route("/orders/{key}/status", patch(orders::update_status))
        .route("/domains/{full_name}", put(orders::upsert_domain))
        .layer(api_rate_limiter())
}

/// Create all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(proxy_routes())
        .merge(order_routes())
        .route("/network", get(network::show))
}

/// Create the full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use async_trait::async_trait;
    use chainmart_core::{Domain, Order, OrderId, OrderStatus, WalletAddress};

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::store::remote::postgres::rejected_status_update;
    use crate::store::{DisabledRemoteStore, RemoteOrderStore, StoreError};

    /// Order store whose only row has already been confirmed.
    struct SettledOrderStore;

    const SETTLED_ID: &str = "ORD-1767225600000-000001";

    #[async_trait]
    impl RemoteOrderStore for SettledOrderStore {
        async fn insert_order(&self, _order: &Order) -> Result<(), StoreError> {
            Ok(())
        }

        async fn query_orders_by_buyer(
            &self,
            _buyer: &WalletAddress,
        ) -> Result<Vec<Order>, StoreError> {
            Ok(Vec::new())
        }

        async fn upsert_domain(&self, _domain: &Domain) -> Result<(), StoreError> {
            Ok(())
        }

        async fn update_order_status(
            &self,
            id: &OrderId,
            status: OrderStatus,
        ) -> Result<(), StoreError> {
            let current = (id.as_str() == SETTLED_ID).then_some("confirmed");
            Err(rejected_status_update(id, current, status))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn app_without_database() -> Router {
        let state =
            AppState::with_order_store(StorefrontConfig::for_tests(), Arc::new(DisabledRemoteStore))
                .unwrap();
        app(state)
    }

    fn patch_status(id: &str, status: &str) -> Request<Body> {
        Request::builder()
            .method("PATCH")
            .uri(format!("/api/orders/{id}/status"))
            .header("x-forwarded-for", "203.0.113.9")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"status":"{status}"}}"#)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app_without_database().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_ready_without_database() {
        let response = app_without_database()
            .oneshot(get("/health/ready"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_network_describes_chain() {
        let response = app_without_database()
            .oneshot(get("/api/network"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["chain_id"], 56);
        assert_eq!(json["currencies"][1]["code"], "USDT");
        assert_eq!(json["currencies"][0]["native"], true);
    }

    #[tokio::test]
    async fn test_order_history_unavailable_without_database() {
        let response = app_without_database()
            .oneshot(get("/api/orders/0x52908400098527886e0f7030069857d2e4169ee7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_registrar_proxy_requires_command() {
        let response = app_without_database()
            .oneshot(get("/api/registrar?domain0=example.io&key=stolen"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_update_on_settled_order_is_rejected() {
        let state =
            AppState::with_order_store(StorefrontConfig::for_tests(), Arc::new(SettledOrderStore))
                .unwrap();

        let response = app(state.clone())
            .oneshot(patch_status(SETTLED_ID, "failed"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app(state)
            .oneshot(patch_status("ORD-404", "confirmed"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
