//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::StorefrontConfig;
use crate::store::remote::postgres::create_pool;
use crate::store::{DisabledRemoteStore, PgRemoteStore, RemoteOrderStore};

/// Upstream request timeout for the proxy routes.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid database url: {0}")]
    Database(#[from] sqlx::Error),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the order store and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    http: reqwest::Client,
    orders: Arc<dyn RemoteOrderStore>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Uses Postgres for orders when `DATABASE_URL` is set; otherwise order
    /// persistence is disabled and the order routes answer 503.
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL is malformed or the HTTP client
    /// cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let orders: Arc<dyn RemoteOrderStore> = match &config.database_url {
            Some(url) => Arc::new(PgRemoteStore::new(create_pool(url)?)),
            None => Arc::new(DisabledRemoteStore),
        };
        Self::with_order_store(config, orders)
    }

    /// Create application state around an existing order store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_order_store(
        config: StorefrontConfig,
        orders: Arc<dyn RemoteOrderStore>,
    ) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                http,
                orders,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// HTTP client for upstream APIs.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// The order store.
    #[must_use]
    pub fn orders(&self) -> &dyn RemoteOrderStore {
        self.inner.orders.as_ref()
    }
}
