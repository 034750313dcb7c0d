//! Local order and domain book.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::info;

use chainmart_core::{Domain, Order, OrderId, OrderStatus, WalletAddress};

use super::{LocalStore, StoreError, StoreEvent, StoreEvents};

/// The buyer's order history and owned domains.
///
/// Orders are append-only; the only change allowed afterwards is a status
/// transition out of `Processing`. Domains are keyed by full name.
#[derive(Clone)]
pub struct OrderBook {
    store: Arc<dyn LocalStore>,
    events: StoreEvents,
    write_lock: Arc<Mutex<()>>,
}

impl OrderBook {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, events: StoreEvents) -> Self {
        Self {
            store,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Append a new order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if an order with the same id exists,
    /// or a store error.
    pub async fn record_order(&self, order: Order) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut orders = self.store.load_orders().await?;
        if orders.iter().any(|existing| existing.id == order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }

        let id = order.id.clone();
        orders.push(order);
        self.store.save_orders(&orders).await?;
        info!(order_id = %id, "Order recorded");
        self.events.publish(StoreEvent::OrderRecorded(id));
        Ok(())
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.store.load_orders().await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Orders paid by `buyer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn orders_for(&self, buyer: &WalletAddress) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.orders().await?;
        orders.retain(|order| &order.buyer == buyer);
        Ok(orders)
    }

    /// Look up one order.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self
            .store
            .load_orders()
            .await?
            .into_iter()
            .find(|order| &order.id == id))
    }

    /// Move an order to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Order`] for a disallowed transition.
    pub async fn set_status(&self, id: &OrderId, status: OrderStatus) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut orders = self.store.load_orders().await?;
        let order = orders
            .iter_mut()
            .find(|order| &order.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        order.transition_to(status)?;
        let updated = order.clone();
        self.store.save_orders(&orders).await?;

        info!(order_id = %id, status = %status, "Order status changed");
        self.events.publish(StoreEvent::OrderStatusChanged {
            id: id.clone(),
            status,
        });
        Ok(updated)
    }

    /// Insert or replace a domain by full name.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read or written.
    pub async fn save_domain(&self, domain: Domain) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut domains = self.store.load_domains().await?;
        let full_name = domain.full_name.clone();
        domains.retain(|existing| existing.full_name != full_name);
        domains.push(domain);
        self.store.save_domains(&domains).await?;

        self.events.publish(StoreEvent::DomainSaved(full_name));
        Ok(())
    }

    /// Every saved domain.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn domains(&self) -> Result<Vec<Domain>, StoreError> {
        self.store.load_domains().await
    }

    /// Look up a domain by full name.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn domain(&self, full_name: &str) -> Result<Option<Domain>, StoreError> {
        Ok(self
            .store
            .load_domains()
            .await?
            .into_iter()
            .find(|domain| domain.full_name == full_name))
    }

    /// Domains owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn domains_owned_by(&self, owner: &WalletAddress) -> Result<Vec<Domain>, StoreError> {
        let mut domains = self.store.load_domains().await?;
        domains.retain(|domain| domain.owner.as_ref() == Some(owner));
        Ok(domains)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use chainmart_core::{
        Currency, DomainName, OrderError, OrderKind, Provenance, TxHash,
    };

    use super::*;
    use crate::store::MemoryStore;

    fn buyer(digit: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", digit.to_string().repeat(40))).unwrap()
    }

    fn order(id: &str, buyer: WalletAddress, minutes_ago: i64) -> Order {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        Order {
            id: OrderId::new(id),
            kind: OrderKind::Goods,
            buyer,
            total: Decimal::new(2500, 2),
            currency: Currency::Usdt,
            items: Vec::new(),
            created_at: at,
            tx_hash: TxHash::parse(&format!("0x{}", "1".repeat(64))).unwrap(),
            status: OrderStatus::Processing,
            shipping: None,
            invoice_number: Order::invoice_number(at, 1),
            estimated_delivery: None,
            domain: None,
            registration: None,
            fulfillment_order_id: None,
        }
    }

    fn book() -> OrderBook {
        OrderBook::new(Arc::new(MemoryStore::new()), StoreEvents::new())
    }

    #[tokio::test]
    async fn test_orders_newest_first_and_by_buyer() {
        let book = book();
        book.record_order(order("ORD-1", buyer('a'), 10)).await.unwrap();
        book.record_order(order("ORD-2", buyer('b'), 5)).await.unwrap();
        book.record_order(order("ORD-3", buyer('a'), 1)).await.unwrap();

        let ids: Vec<_> = book
            .orders()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id.into_inner())
            .collect();
        assert_eq!(ids, ["ORD-3", "ORD-2", "ORD-1"]);

        let mine = book.orders_for(&buyer('a')).await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_order_conflicts() {
        let book = book();
        book.record_order(order("ORD-1", buyer('a'), 0)).await.unwrap();
        assert!(matches!(
            book.record_order(order("ORD-1", buyer('a'), 0)).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_status_transition_rules() {
        let book = book();
        book.record_order(order("ORD-1", buyer('a'), 0)).await.unwrap();
        let mut events = book.subscribe();

        let updated = book
            .set_status(&OrderId::new("ORD-1"), OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::OrderStatusChanged {
                id: OrderId::new("ORD-1"),
                status: OrderStatus::Confirmed
            }
        );

        assert!(matches!(
            book.set_status(&OrderId::new("ORD-1"), OrderStatus::Failed)
                .await,
            Err(StoreError::Order(OrderError::InvalidTransition { .. }))
        ));
        assert!(matches!(
            book.set_status(&OrderId::new("ORD-404"), OrderStatus::Failed)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_domain_replaces_by_name() {
        let book = book();
        let name = DomainName::from_keyword("example.io").unwrap();
        let mut domain = Domain::listing(&name, Decimal::new(3999, 2), Currency::Usdt, true, Provenance::Live);
        book.save_domain(domain.clone()).await.unwrap();

        domain.assign_owner(buyer('a'), Utc::now(), 1).unwrap();
        book.save_domain(domain).await.unwrap();

        assert_eq!(book.domains().await.unwrap().len(), 1);
        let saved = book.domain("example.io").await.unwrap().unwrap();
        assert_eq!(saved.owner, Some(buyer('a')));
        assert_eq!(book.domains_owned_by(&buyer('a')).await.unwrap().len(), 1);
        assert!(book.domains_owned_by(&buyer('b')).await.unwrap().is_empty());
    }
}
