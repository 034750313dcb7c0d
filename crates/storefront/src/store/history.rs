//! Buyer order history across the local book and the remote mirror.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{instrument, warn};

use chainmart_core::{Order, WalletAddress};

use super::{OrderBook, RemoteOrderStore, StoreError};

/// Merged view of a buyer's orders.
///
/// Local records win over remote copies of the same order. When the remote
/// store fails the local records are returned alone.
#[derive(Clone)]
pub struct OrderHistory {
    local: OrderBook,
    remote: Arc<dyn RemoteOrderStore>,
}

impl OrderHistory {
    #[must_use]
    pub fn new(local: OrderBook, remote: Arc<dyn RemoteOrderStore>) -> Self {
        Self { local, remote }
    }

    /// Orders paid by `buyer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error only if the local store cannot be read.
    #[instrument(skip(self), fields(buyer = %buyer.short()))]
    pub async fn for_buyer(&self, buyer: &WalletAddress) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.local.orders_for(buyer).await?;

        if self.remote.is_enabled() {
            match self.remote.query_orders_by_buyer(buyer).await {
                Ok(remote) => {
                    let known: HashSet<_> = orders.iter().map(|order| order.id.clone()).collect();
                    orders.extend(
                        remote
                            .into_iter()
                            .filter(|order| !known.contains(&order.id)),
                    );
                }
                Err(error) => {
                    warn!(error = %error, "Remote order history unavailable, showing local orders");
                }
            }
        }

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
