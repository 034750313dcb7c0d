//! Print-on-demand fulfillment.
//!
//! Physical goods are produced and shipped by a Printful-style service.
//! Only cart items carrying a fulfillment variant id are sent; everything
//! else is handled outside the storefront.
//!
//! [`FulfillmentClient`] talks to the storefront's own proxy
//! (`/api/fulfillment/*`), which adds the service's bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use chainmart_core::{CartItem, FulfillmentOrderId, OrderId, ShippingInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to the fulfillment service.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Fulfillment API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The service could not be reached.
    #[error("Fulfillment service unavailable: {0}")]
    Unavailable(String),

    /// The response could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A product the fulfillment service can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellableItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub variants: u32,
}

/// Delivery address block sent with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub zip: String,
    pub phone: String,
    pub email: String,
}

impl From<&ShippingInfo> for Recipient {
    fn from(shipping: &ShippingInfo) -> Self {
        Self {
            name: shipping.full_name.clone(),
            address1: shipping.address.clone(),
            city: shipping.city.clone(),
            country_code: shipping.country_code.clone(),
            zip: shipping.zip.clone(),
            phone: shipping.phone.clone(),
            email: shipping.email.to_string(),
        }
    }
}

/// One line of a fulfillment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sync_variant_id: i64,
    pub quantity: u32,
}

/// A fulfillment order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentOrderRequest {
    /// Storefront order id, echoed back by the service.
    pub external_id: String,
    pub recipient: Recipient,
    pub items: Vec<OrderLine>,
}

impl FulfillmentOrderRequest {
    /// Build a request for the eligible items of `items`.
    ///
    /// Returns `None` when no item can be fulfilled.
    #[must_use]
    pub fn for_items(
        order_id: &OrderId,
        shipping: &ShippingInfo,
        items: &[CartItem],
    ) -> Option<Self> {
        let lines = eligible_lines(items);
        if lines.is_empty() {
            return None;
        }
        Some(Self {
            external_id: order_id.to_string(),
            recipient: Recipient::from(shipping),
            items: lines,
        })
    }
}

/// Order lines for the fulfillment-eligible items.
#[must_use]
pub fn eligible_lines(items: &[CartItem]) -> Vec<OrderLine> {
    items
        .iter()
        .filter_map(|item| {
            item.product
                .fulfillment_variant_id
                .map(|sync_variant_id| OrderLine {
                    sync_variant_id,
                    quantity: item.quantity,
                })
        })
        .collect()
}

/// The fulfillment service.
#[async_trait]
pub trait FulfillmentService: Send + Sync {
    /// Products the service can produce.
    async fn list_products(&self) -> Result<Vec<SellableItem>, FulfillmentError>;

    /// Place an order. Returns the service's order id.
    async fn create_order(
        &self,
        request: &FulfillmentOrderRequest,
    ) -> Result<FulfillmentOrderId, FulfillmentError>;
}

/// Response envelope: `{"code": 200, "result": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: serde_json::Value,
}

/// HTTP client for the storefront's fulfillment proxy.
#[derive(Clone)]
pub struct FulfillmentClient {
    client: reqwest::Client,
    base_url: String,
}

impl FulfillmentClient {
    /// Create a client for the proxy rooted at `base_url`
    /// (e.g. `http://127.0.0.1:3000/api/fulfillment`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FulfillmentError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FulfillmentError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FulfillmentError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        serde_json::from_str::<Envelope<T>>(&body)
            .map(|envelope| envelope.result)
            .map_err(|e| FulfillmentError::Parse(e.to_string()))
    }
}

#[async_trait]
impl FulfillmentService for FulfillmentClient {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<SellableItem>, FulfillmentError> {
        let response = self
            .client
            .get(format!("{}/products", self.base_url))
            .send()
            .await?;
        Self::read(response).await
    }

    #[instrument(skip_all, fields(external_id = %request.external_id, lines = request.items.len()))]
    async fn create_order(
        &self,
        request: &FulfillmentOrderRequest,
    ) -> Result<FulfillmentOrderId, FulfillmentError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .json(request)
            .send()
            .await?;
        let created: CreatedOrder = Self::read(response).await?;

        let id = match created.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => return Err(FulfillmentError::Parse(format!("unexpected order id {other}"))),
        };
        info!(fulfillment_order_id = %id, "Fulfillment order created");
        Ok(FulfillmentOrderId::new(id))
    }
}
