//! Fulfillment service proxy.
//!
//! Adds `Authorization: Bearer <FULFILLMENT_API_TOKEN>` and passes the
//! upstream response through.

use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::fulfillment::FulfillmentOrderRequest;
use crate::state::AppState;

/// Upstream path listing sync products.
const PRODUCTS_PATH: &str = "/store/products";
/// Upstream path creating orders.
const ORDERS_PATH: &str = "/orders";

fn upstream_url(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

async fn forward(request: reqwest::RequestBuilder, state: &AppState) -> Result<Response> {
    let response = request
        .bearer_auth(state.config().fulfillment.api_token.expose_secret())
        .send()
        .await
        .map_err(|error| {
            tracing::warn!(error = %error, "Fulfillment service unreachable");
            AppError::Upstream(format!("fulfillment: {error}"))
        })?;

    let status = response.status();
    let body = response.text().await?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `GET /api/fulfillment/products`
#[instrument(skip_all)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response> {
    let url = upstream_url(&state.config().fulfillment.api_url, PRODUCTS_PATH);
    forward(state.http().get(url), &state).await
}

/// `POST /api/fulfillment/orders`
#[instrument(skip_all, fields(external_id = %order.external_id))]
pub async fn create_order(
    State(state): State<AppState>,
    Json(order): Json<FulfillmentOrderRequest>,
) -> Result<Response> {
    if order.items.is_empty() {
        return Err(AppError::BadRequest("order has no items".to_string()));
    }
    let url = upstream_url(&state.config().fulfillment.api_url, ORDERS_PATH);
    forward(state.http().post(url).json(&order), &state).await
}
