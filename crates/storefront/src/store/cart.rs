//! Cart service.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use chainmart_core::{Cart, Product, ProductId};

use super::{LocalStore, StoreError, StoreEvent, StoreEvents};

/// Reads and mutates the buyer's cart.
///
/// Every mutation is load → change → save under a write lock, followed by
/// a [`StoreEvent::CartChanged`] when the cart actually changed.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn LocalStore>,
    events: StoreEvents,
    write_lock: Arc<Mutex<()>>,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, events: StoreEvents) -> Self {
        Self {
            store,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Receive cart (and order) change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// The current cart.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn get_cart(&self) -> Result<Cart, StoreError> {
        self.store.load_cart().await
    }

    /// Replace the cart.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written.
    pub async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.save_cart(cart).await?;
        self.notify(cart);
        Ok(())
    }

    /// Add `quantity` units of `product`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cart`] for a zero quantity, or a store error.
    pub async fn add_to_cart(&self, product: Product, quantity: u32) -> Result<Cart, StoreError> {
        self.mutate(|cart| {
            cart.add(product, quantity)?;
            Ok(true)
        })
        .await
    }

    /// Remove a product's line entirely.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or written.
    pub async fn remove_from_cart(&self, id: &ProductId) -> Result<Cart, StoreError> {
        self.mutate(|cart| Ok(cart.remove(id))).await
    }

    /// Remove `quantity` units; a line that drops below one unit is removed.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or written.
    pub async fn remove_quantity(&self, id: &ProductId, quantity: u32) -> Result<Cart, StoreError> {
        self.mutate(|cart| Ok(cart.remove_quantity(id, quantity)))
            .await
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or written.
    pub async fn set_quantity(&self, id: &ProductId, quantity: u32) -> Result<Cart, StoreError> {
        self.mutate(|cart| Ok(cart.set_quantity(id, quantity)))
            .await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or written.
    pub async fn clear_cart(&self) -> Result<(), StoreError> {
        self.mutate(|cart| {
            let changed = !cart.is_empty();
            cart.clear();
            Ok(changed)
        })
        .await
        .map(|_| ())
    }

    async fn mutate<F>(&self, change: F) -> Result<Cart, StoreError>
    where
        F: FnOnce(&mut Cart) -> Result<bool, StoreError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut cart = self.store.load_cart().await?;
        if change(&mut cart)? {
            self.store.save_cart(&cart).await?;
            self.notify(&cart);
        }
        Ok(cart)
    }

    fn notify(&self, cart: &Cart) {
        debug!(item_count = cart.item_count(), total = %cart.total(), "Cart changed");
        self.events.publish(StoreEvent::CartChanged {
            item_count: cart.item_count(),
            total: cart.total(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use chainmart_core::{CartError, Currency};

    use super::*;
    use crate::store::MemoryStore;

    fn product(id: &str, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: id.to_owned(),
            price: Decimal::new(cents, 2),
            currency: Currency::Usdt,
            image_url: None,
            fulfillment_variant_id: None,
        }
    }

    fn service() -> CartService {
        CartService::new(Arc::new(MemoryStore::new()), StoreEvents::new())
    }

    #[tokio::test]
    async fn test_add_and_total() {
        let carts = service();
        carts.add_to_cart(product("tee", 2500), 2).await.unwrap();
        let cart = carts.add_to_cart(product("mug", 1299), 1).await.unwrap();

        assert_eq!(cart.total(), Decimal::new(6299, 2));
        assert_eq!(carts.get_cart().await.unwrap(), cart);
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let carts = service();
        let err = carts.add_to_cart(product("tee", 2500), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Cart(CartError::ZeroQuantity)));
        assert!(carts.get_cart().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let carts = service();
        let mut events = carts.subscribe();

        carts.add_to_cart(product("tee", 2500), 2).await.unwrap();
        carts
            .remove_quantity(&ProductId::new("tee"), 1)
            .await
            .unwrap();
        carts.clear_cart().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::CartChanged {
                item_count: 2,
                total: Decimal::new(5000, 2)
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::CartChanged {
                item_count: 1,
                total: Decimal::new(2500, 2)
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::CartChanged {
                item_count: 0,
                total: Decimal::ZERO
            }
        );
    }

    #[tokio::test]
    async fn test_no_event_without_change() {
        let carts = service();
        let mut events = carts.subscribe();

        carts.remove_from_cart(&ProductId::new("ghost")).await.unwrap();
        carts.clear_cart().await.unwrap();

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_removing_zero_units_publishes_nothing() {
        let carts = service();
        carts.add_to_cart(product("tee", 2500), 2).await.unwrap();
        let mut events = carts.subscribe();

        let cart = carts
            .remove_quantity(&ProductId::new("tee"), 0)
            .await
            .unwrap();

        assert_eq!(cart.item_count(), 2);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_set_quantity_zero_removes() {
        let carts = service();
        carts.add_to_cart(product("tee", 2500), 3).await.unwrap();
        let cart = carts
            .set_quantity(&ProductId::new("tee"), 0)
            .await
            .unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let carts = service();
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let carts = carts.clone();
            tasks.push(tokio::spawn(async move {
                carts.add_to_cart(product("tee", 2500), 1).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let cart = carts.get_cart().await.unwrap();
        assert_eq!(cart.item_count(), 20);
    }
}
