//! Cart, order and domain storage.
//!
//! # Local state
//!
//! The buyer's cart, order history and owned domains live in a
//! [`LocalStore`] ([`MemoryStore`] or [`FileStore`]). [`CartService`] and
//! [`OrderBook`] own all reads and writes, serialize writers within the
//! process, and publish a [`StoreEvent`] after every change.
//!
//! # Remote mirror
//!
//! Orders and domains are also mirrored to a [`RemoteOrderStore`]
//! (Postgres on the server, HTTP from the client). The mirror is best
//! effort: a failed remote write never fails a checkout.

pub mod cart;
pub mod file;
pub mod history;
pub mod memory;
pub mod orders;
pub mod remote;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::broadcast;

use chainmart_core::{Cart, CartError, Domain, Order, OrderError, OrderId, OrderStatus};

pub use cart::CartService;
pub use file::FileStore;
pub use history::OrderHistory;
pub use memory::MemoryStore;
pub use orders::OrderBook;
pub use remote::{DisabledRemoteStore, HttpRemoteStore, PgRemoteStore, RemoteOrderStore};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing local files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The remote store answered with an error or could not be reached.
    #[error("remote store error: {0}")]
    Remote(String),

    /// Remote persistence is not configured.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    /// Requested entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with the same id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Change notification published after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    CartChanged { item_count: u32, total: Decimal },
    OrderRecorded(OrderId),
    OrderStatusChanged { id: OrderId, status: OrderStatus },
    DomainSaved(String),
}

/// Broadcast channel shared by the cart and order services.
///
/// Publishing never waits for or requires subscribers.
#[derive(Debug, Clone)]
pub struct StoreEvents {
    sender: broadcast::Sender<StoreEvent>,
}

impl StoreEvents {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for StoreEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable local state, one collection per method pair.
///
/// Implementations only load and replace whole collections. Merging,
/// validation and locking live in [`CartService`] and [`OrderBook`].
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load_cart(&self) -> Result<Cart, StoreError>;
    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError>;
    async fn load_orders(&self) -> Result<Vec<Order>, StoreError>;
    async fn save_orders(&self, orders: &[Order]) -> Result<(), StoreError>;
    async fn load_domains(&self) -> Result<Vec<Domain>, StoreError>;
    async fn save_domains(&self, domains: &[Domain]) -> Result<(), StoreError>;
}
