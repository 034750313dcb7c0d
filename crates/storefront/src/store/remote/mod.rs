//! Remote order mirror.
//!
//! # Implementations
//!
//! - [`PgRemoteStore`] - Postgres, used by the server
//! - [`HttpRemoteStore`] - the server's `/api/orders` endpoints, used by
//!   the checkout client
//! - [`DisabledRemoteStore`] - no remote persistence configured

pub mod http;
pub mod postgres;

use async_trait::async_trait;

use chainmart_core::{Domain, Order, OrderId, OrderStatus, WalletAddress};

use super::StoreError;

pub use http::HttpRemoteStore;
pub use postgres::PgRemoteStore;

/// Best-effort mirror of orders and domains.
#[async_trait]
pub trait RemoteOrderStore: Send + Sync {
    /// Whether writes are attempted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Orders paid by `buyer`, newest first.
    async fn query_orders_by_buyer(&self, buyer: &WalletAddress)
    -> Result<Vec<Order>, StoreError>;

    async fn upsert_domain(&self, domain: &Domain) -> Result<(), StoreError>;

    async fn update_order_status(&self, id: &OrderId, status: OrderStatus)
    -> Result<(), StoreError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Stand-in when no remote store is configured.
///
/// Reads return nothing; writes report [`StoreError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRemoteStore;

const DISABLED: &str = "remote persistence is not configured";

#[async_trait]
impl RemoteOrderStore for DisabledRemoteStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn insert_order(&self, _order: &Order) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(DISABLED.to_owned()))
    }

    async fn query_orders_by_buyer(
        &self,
        _buyer: &WalletAddress,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(Vec::new())
    }

    async fn upsert_domain(&self, _domain: &Domain) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(DISABLED.to_owned()))
    }

    async fn update_order_status(
        &self,
        _id: &OrderId,
        _status: OrderStatus,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(DISABLED.to_owned()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
