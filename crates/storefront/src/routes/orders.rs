//! Order and domain persistence endpoints.
//!
//! Backed by the server's order store. Every route answers 503 when remote
//! persistence is disabled so clients fall back to their local cache.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use chainmart_core::{Domain, Order, OrderId, OrderStatus, WalletAddress};

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

fn ensure_enabled(state: &AppState) -> Result<()> {
    if state.orders().is_enabled() {
        Ok(())
    } else {
        Err(AppError::Unavailable(
            "remote persistence is not configured".to_string(),
        ))
    }
}

/// `GET /api/orders/{buyer}`
#[instrument(skip(state))]
pub async fn list_for_buyer(
    State(state): State<AppState>,
    Path(buyer): Path<String>,
) -> Result<Json<Vec<Order>>> {
    ensure_enabled(&state)?;
    let buyer = WalletAddress::parse(&buyer)
        .map_err(|error| AppError::BadRequest(format!("invalid wallet address: {error}")))?;
    let orders = state.orders().query_orders_by_buyer(&buyer).await?;
    Ok(Json(orders))
}

/// `POST /api/orders`
#[instrument(skip_all, fields(order_id = %order.id))]
pub async fn create(State(state): State<AppState>, Json(order): Json<Order>) -> Result<StatusCode> {
    ensure_enabled(&state)?;
    if order.status != OrderStatus::Processing {
        return Err(AppError::BadRequest(
            "new orders must be processing".to_string(),
        ));
    }
    state.orders().insert_order(&order).await?;
    tracing::info!(buyer = %order.buyer.short(), "Order mirrored");
    Ok(StatusCode::CREATED)
}

/// `PATCH /api/orders/{id}/status`
#[instrument(skip(state))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<StatusCode> {
    ensure_enabled(&state)?;
    state
        .orders()
        .update_order_status(&OrderId::new(id), update.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/domains/{full_name}`
#[instrument(skip(state, domain))]
pub async fn upsert_domain(
    State(state): State<AppState>,
    Path(full_name): Path<String>,
    Json(domain): Json<Domain>,
) -> Result<StatusCode> {
    ensure_enabled(&state)?;
    if !domain.full_name.eq_ignore_ascii_case(&full_name) {
        return Err(AppError::BadRequest(format!(
            "path names {full_name} but body names {}",
            domain.full_name
        )));
    }
    state.orders().upsert_domain(&domain).await?;
    Ok(StatusCode::NO_CONTENT)
}
