//! In-memory [`LocalStore`].

use async_trait::async_trait;
use tokio::sync::Mutex;

use chainmart_core::{Cart, Domain, Order};

use super::{LocalStore, StoreError};

#[derive(Debug, Default)]
struct Snapshot {
    cart: Cart,
    orders: Vec<Order>,
    domains: Vec<Domain>,
}

/// Process-lifetime store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load_cart(&self) -> Result<Cart, StoreError> {
        Ok(self.snapshot.lock().await.cart.clone())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.snapshot.lock().await.cart = cart.clone();
        Ok(())
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.snapshot.lock().await.orders.clone())
    }

    async fn save_orders(&self, orders: &[Order]) -> Result<(), StoreError> {
        self.snapshot.lock().await.orders = orders.to_vec();
        Ok(())
    }

    async fn load_domains(&self) -> Result<Vec<Domain>, StoreError> {
        Ok(self.snapshot.lock().await.domains.clone())
    }

    async fn save_domains(&self, domains: &[Domain]) -> Result<(), StoreError> {
        self.snapshot.lock().await.domains = domains.to_vec();
        Ok(())
    }
}
