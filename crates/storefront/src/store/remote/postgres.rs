//! Postgres order mirror.
//!
//! # Tables (schema `chainmart`)
//!
//! - `orders` - one row per order; `record` holds the full order as JSONB
//! - `domains` - one row per domain full name; `record` holds the domain
//!
//! Migrations live in `crates/storefront/migrations/` and are applied
//! out-of-band.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tracing::instrument;

use chainmart_core::{Domain, Order, OrderError, OrderId, OrderStatus, WalletAddress};

use super::RemoteOrderStore;
use crate::store::StoreError;

/// Create a lazily connecting pool.
///
/// No connection is made until the first query, so an unreachable database
/// never blocks startup.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection string is malformed.
pub fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_lazy(database_url.expose_secret())
}

/// Orders and domains in Postgres.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteOrderStore for PgRemoteStore {
    #[instrument(skip_all, fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO chainmart.orders (id, buyer, kind, status, total, currency, tx_hash, created_at, record)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(&order.id)
        .bind(order.buyer.as_str())
        .bind(order.kind.as_str())
        .bind(order.status.as_str())
        .bind(order.total)
        .bind(order.currency.code())
        .bind(order.tx_hash.as_str())
        .bind(order.created_at)
        .bind(Json(order))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(buyer = %buyer.short()))]
    async fn query_orders_by_buyer(
        &self,
        buyer: &WalletAddress,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<Json<Order>> = sqlx::query_scalar(
            r"
            SELECT record
            FROM chainmart.orders
            WHERE buyer = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(buyer.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|Json(order)| order).collect())
    }

    #[instrument(skip_all, fields(domain = %domain.full_name))]
    async fn upsert_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO chainmart.domains (full_name, owner, record, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (full_name)
            DO UPDATE SET owner = EXCLUDED.owner, record = EXCLUDED.record, updated_at = NOW()
            ",
        )
        .bind(&domain.full_name)
        .bind(domain.owner.as_ref().map(WalletAddress::as_str))
        .bind(Json(domain))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if OrderStatus::Processing.can_transition_to(status) {
            let result = sqlx::query(
                r"
                UPDATE chainmart.orders
                SET status = $2, record = jsonb_set(record, '{status}', to_jsonb($2::text))
                WHERE id = $1 AND status = $3
                ",
            )
            .bind(id)
            .bind(status.as_str())
            .bind(OrderStatus::Processing.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(());
            }
        }

        // Nothing moved: either the row is missing or it already left `processing`.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM chainmart.orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Err(rejected_status_update(id, current.as_deref(), status))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Explain why a status update touched no row, given the stored status.
pub(crate) fn rejected_status_update(
    id: &OrderId,
    current: Option<&str>,
    to: OrderStatus,
) -> StoreError {
    let Some(current) = current else {
        return StoreError::NotFound(format!("order {id}"));
    };
    match current.parse::<OrderStatus>() {
        Ok(from) => StoreError::Order(OrderError::InvalidTransition {
            id: id.clone(),
            from,
            to,
        }),
        Err(e) => StoreError::DataCorruption(format!("invalid order status: {e}")),
    }
}
