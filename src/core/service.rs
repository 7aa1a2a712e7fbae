//! Service traits the order core is written against
//!
//! Every collaborator sits behind one of these traits so storage backends can
//! be swapped without touching the lifecycle rules.

use crate::cart::Cart;
use crate::catalog::{ProductSummary, UserProfile};
use crate::core::error::{MartError, Result};
use crate::core::query::QueryOptions;
use crate::orders::model::{Order, OrderDraft, OrderPatch};
use crate::payments::{PaymentRecord, PaymentRecordFields};
use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::HashMap;
use uuid::Uuid;

/// Durable order persistence
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Validate and persist a draft
    ///
    /// Assigns the id, a unique human order code and version 1, and seeds the
    /// first tracking entry.
    async fn create(&self, draft: OrderDraft) -> Result<Order>;

    /// Get an order by id
    async fn get(&self, id: &Uuid) -> Result<Option<Order>>;

    /// Get an order by its human-readable code
    async fn get_by_human_id(&self, human_order_id: &str) -> Result<Option<Order>>;

    /// Apply a patch if the stored version still equals `patch.expected_version`
    ///
    /// Fails with `ORDER_NOT_FOUND` if the order is absent and
    /// `ORDER_VERSION_CONFLICT` on a stale version; nothing is written then.
    async fn update(&self, id: &Uuid, patch: OrderPatch) -> Result<Order>;

    /// Orders placed by a buyer
    async fn query_by_buyer(&self, buyer_id: &Uuid, options: &QueryOptions) -> Result<Vec<Order>>;

    /// Orders with at least one line item sold by `seller_id`
    async fn query_by_seller(&self, seller_id: &Uuid, options: &QueryOptions)
    -> Result<Vec<Order>>;

    /// Every order, newest first unless `options` says otherwise
    async fn query_all(&self, options: &QueryOptions) -> Result<Vec<Order>>;

    /// Number of persisted orders
    async fn count(&self) -> Result<u64>;

    /// Get an order or fail with `ORDER_NOT_FOUND`
    async fn get_required(&self, id: &Uuid) -> Result<Order> {
        self.get(id)
            .await?
            .ok_or_else(|| MartError::order_not_found(*id))
    }
}

/// The secondary payment record tied 1:1 to an order
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// Create the order's record or overwrite its mutable fields
    async fn upsert_for_order(
        &self,
        order_id: &Uuid,
        fields: PaymentRecordFields,
    ) -> Result<PaymentRecord>;

    async fn get_for_order(&self, order_id: &Uuid) -> Result<Option<PaymentRecord>>;
}

/// Per-buyer cart, owned by the cart feature
///
/// The order core reads a cart at checkout and asks for it to be cleared,
/// nothing more.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn get_cart(&self, buyer_id: &Uuid) -> Result<Cart>;

    /// Empty the buyer's cart; clearing an empty cart succeeds
    async fn clear_cart(&self, buyer_id: &Uuid) -> Result<()>;
}

/// Read access to the product catalog
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up several products; unknown ids are simply absent from the map
    async fn get_products(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, ProductSummary>>;
}

/// Read access to user profiles
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &Uuid) -> Result<Option<UserProfile>>;
}

/// An uploaded payment screenshot
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Stores payment proof images and hands back a reference string
#[async_trait]
pub trait ProofUploader: Send + Sync {
    /// Persist the upload and return the reference saved on the order
    async fn store(&self, upload: ProofUpload) -> Result<String>;

    /// Remove a stored upload that no order ended up referencing
    async fn discard(&self, reference: &str) -> Result<()>;
}
