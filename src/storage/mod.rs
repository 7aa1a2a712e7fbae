//! Storage implementations for different backends

pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;
pub mod uploads;

pub use in_memory::{
    InMemoryCartService, InMemoryOrderStore, InMemoryPaymentRecordStore, InMemoryProductCatalog,
    InMemoryUserDirectory,
};
#[cfg(feature = "mongodb_backend")]
pub use mongodb::{
    MongoCartService, MongoOrderStore, MongoPaymentRecordStore, MongoProductCatalog, MongoStores,
    MongoUserDirectory,
};
pub use uploads::{LocalDiskUploader, UploadError};

use crate::config::{MartConfig, StorageBackend};
use crate::core::error::Result;
use crate::core::service::{
    CartService, OrderStore, PaymentRecordStore, ProductCatalog, UserDirectory,
};
use std::sync::Arc;

/// The set of services the server is assembled from
#[derive(Clone)]
pub struct StorageBackends {
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentRecordStore>,
    pub carts: Arc<dyn CartService>,
    /// When present, line-item sellers are checked against it
    pub catalog: Option<Arc<dyn ProductCatalog>>,
    pub users: Option<Arc<dyn UserDirectory>>,
}

impl StorageBackends {
    /// Fresh in-memory stores without catalog or user directory
    pub fn in_memory(id_prefix: &str) -> Self {
        Self {
            orders: Arc::new(InMemoryOrderStore::with_id_prefix(id_prefix)),
            payments: Arc::new(InMemoryPaymentRecordStore::new()),
            carts: Arc::new(InMemoryCartService::new()),
            catalog: None,
            users: None,
        }
    }

    /// Build the backend named by `storage.backend`
    pub async fn from_config(config: &MartConfig) -> Result<Self> {
        let id_prefix = config.orders.id_prefix.as_str();
        match config.storage.backend {
            StorageBackend::InMemory => {
                tracing::info!("using in-memory storage");
                Ok(Self::in_memory(id_prefix))
            }
            StorageBackend::Mongodb => Self::mongodb(config, id_prefix).await,
        }
    }

    #[cfg(feature = "mongodb_backend")]
    async fn mongodb(config: &MartConfig, id_prefix: &str) -> Result<Self> {
        use crate::core::error::{MartError, StorageError};

        let uri = config.storage.mongodb_uri.as_deref().ok_or_else(|| {
            MartError::Storage(StorageError::ConnectionError {
                backend: "mongodb".to_string(),
                message: "storage.mongodb_uri is not set".to_string(),
            })
        })?;
        let stores = MongoStores::connect(uri, &config.storage.mongodb_database, id_prefix).await?;

        Ok(Self {
            orders: Arc::new(stores.orders),
            payments: Arc::new(stores.payments),
            carts: Arc::new(stores.carts),
            catalog: Some(Arc::new(stores.catalog)),
            users: Some(Arc::new(stores.users)),
        })
    }

    #[cfg(not(feature = "mongodb_backend"))]
    async fn mongodb(_config: &MartConfig, _id_prefix: &str) -> Result<Self> {
        Err(crate::core::error::StorageError::Unavailable {
            backend: "mongodb (built without the mongodb_backend feature)".to_string(),
        }
        .into())
    }
}
