//! JSON-file [`LocalStore`].
//!
//! Each collection is one pretty-printed JSON file in the data directory.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash never leaves a half-written file. Several processes sharing a
//! directory are last-write-wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use chainmart_core::{Cart, Domain, Order};

use super::{LocalStore, StoreError};

const CART_FILE: &str = "cart.json";
const ORDERS_FILE: &str = "orders.json";
const DOMAINS_FILE: &str = "domains.json";

/// Store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, StoreError> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!(".{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Store file written");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load_cart(&self) -> Result<Cart, StoreError> {
        self.read(CART_FILE).await
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.write(CART_FILE, cart).await
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.read(ORDERS_FILE).await
    }

    async fn save_orders(&self, orders: &[Order]) -> Result<(), StoreError> {
        self.write(ORDERS_FILE, orders).await
    }

    async fn load_domains(&self) -> Result<Vec<Domain>, StoreError> {
        self.read(DOMAINS_FILE).await
    }

    async fn save_domains(&self, domains: &[Domain]) -> Result<(), StoreError> {
        self.write(DOMAINS_FILE, domains).await
    }
}
