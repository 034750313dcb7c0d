//! Order mirror reached through the storefront server's API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::instrument;

use chainmart_core::{Domain, Order, OrderId, OrderStatus, WalletAddress};

use super::RemoteOrderStore;
use crate::store::StoreError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

/// Client for `/api/orders` and `/api/domains` on the storefront server.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a store for the API rooted at `base_url`
    /// (e.g. `http://127.0.0.1:3000/api`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::SERVICE_UNAVAILABLE => Err(StoreError::Unavailable(
                "server has no remote persistence".to_owned(),
            )),
            StatusCode::CONFLICT => Err(StoreError::Conflict(
                response.text().await.unwrap_or_default(),
            )),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(
                response.text().await.unwrap_or_default(),
            )),
            status => Err(StoreError::Remote(format!("HTTP {status}"))),
        }
    }
}

#[async_trait]
impl RemoteOrderStore for HttpRemoteStore {
    #[instrument(skip_all, fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let url = format!("{}/orders", self.base_url);
        self.send(self.client.post(url).json(order)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(buyer = %buyer.short()))]
    async fn query_orders_by_buyer(
        &self,
        buyer: &WalletAddress,
    ) -> Result<Vec<Order>, StoreError> {
        let url = format!("{}/orders/{}", self.base_url, buyer);
        let response = self.send(self.client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))
    }

    #[instrument(skip_all, fields(domain = %domain.full_name))]
    async fn upsert_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        let url = format!(
            "{}/domains/{}",
            self.base_url,
            urlencoding::encode(&domain.full_name)
        );
        self.send(self.client.put(url).json(domain)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/orders/{}/status",
            self.base_url,
            urlencoding::encode(id.as_str())
        );
        self.send(self.client.patch(url).json(&StatusUpdate { status }))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/health/ready", self.base_url.trim_end_matches("/api"));
        self.send(self.client.get(url)).await?;
        Ok(())
    }
}
