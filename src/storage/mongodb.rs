//! MongoDB storage backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! jrmart = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! One collection per document type, named after `Entity::resource_name()`:
//! `orders`, `payments`, `carts`, `products` and `users`.
//!
//! # Serialization strategy
//!
//! Documents are serialized via `serde_json::Value` as an intermediate format,
//! then converted to BSON documents. UUIDs and timestamps are stored as
//! strings; `createdAt` and `updatedAt` are rewritten with nine fraction
//! digits so that string order is time order. The `id` field is mapped to
//! MongoDB's `_id` convention.
//!
//! # Uniqueness and concurrency
//!
//! - `orders.humanOrderId` has a unique index; a create that collides retries
//!   with the next sequence.
//! - Order updates replace the document only while `version` still equals
//!   the version the patch was planned from.
//! - `payments.orderId` is unique, keeping one record per order.

use crate::cart::Cart;
use crate::catalog::{ProductSummary, UserProfile};
use crate::core::entity::Entity;
use crate::core::error::{MartError, OrderError, Result, StorageError};
use crate::core::query::QueryOptions;
use crate::core::service::{
    CartService, OrderStore, PaymentRecordStore, ProductCatalog, UserDirectory,
};
use crate::orders::human_id::{DEFAULT_PREFIX, HumanOrderId};
use crate::orders::model::{Order, OrderDraft, OrderPatch};
use crate::payments::{PaymentRecord, PaymentRecordFields};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at finding a free human order code before giving up
const MAX_CODE_ATTEMPTS: u64 = 16;

const DUPLICATE_KEY: i32 = 11000;

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert a serde_json::Value (expected to be an Object) into a BSON Document,
/// renaming `id` → `_id` for MongoDB convention.
fn json_to_document(json: serde_json::Value) -> anyhow::Result<Document> {
    let bson_val = mongodb::bson::to_bson(&json)
        .map_err(|e| anyhow!("Failed to convert JSON to BSON: {}", e))?;

    let mut doc = match bson_val {
        Bson::Document(d) => d,
        _ => return Err(anyhow!("Expected BSON document, got non-object")),
    };

    if let Some(id) = doc.remove("id") {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON Document back into a serde_json::Value,
/// renaming `_id` → `id` for domain entity convention.
fn document_to_json(mut doc: Document) -> serde_json::Value {
    if let Some(id) = doc.remove("_id") {
        doc.insert("id", id);
    }

    Bson::Document(doc).into_relaxed_extjson()
}

/// Sorted timestamp fields
const SORTED_TIMESTAMPS: [&str; 2] = ["createdAt", "updatedAt"];

/// Rewrite RFC 3339 timestamps with a fixed number of fraction digits
///
/// chrono omits the fraction on whole seconds, and `Z` sorts after `.`.
fn fixed_width_timestamps(doc: &mut Document) {
    for key in SORTED_TIMESTAMPS {
        let fixed = match doc.get(key) {
            Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|at| at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Nanos, true)),
            _ => None,
        };
        if let Some(fixed) = fixed {
            doc.insert(key, fixed);
        }
    }
}

/// Convert a UUID to its BSON string representation for queries.
fn uuid_bson(id: &Uuid) -> Bson {
    Bson::String(id.to_string())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn storage_failure(context: &str, err: mongodb::error::Error) -> MartError {
    anyhow!("{}: {}", context, err).into()
}

/// Typed access to the collection of one document type
struct Documents<T> {
    database: Database,
    _marker: PhantomData<T>,
}

impl<T> Clone for Documents<T> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity + Serialize + DeserializeOwned> Documents<T> {
    fn new(database: Database) -> Self {
        Self {
            database,
            _marker: PhantomData,
        }
    }

    fn collection(&self) -> Collection<Document> {
        self.database.collection(T::resource_name())
    }

    fn to_document(entity: &T) -> Result<Document> {
        let json = serde_json::to_value(entity)
            .map_err(|e| anyhow!("Failed to serialize {}: {}", T::resource_name(), e))?;
        let mut doc = json_to_document(json)?;
        fixed_width_timestamps(&mut doc);
        // Carts have no `id` field of their own; they are keyed by buyer
        if !doc.contains_key("_id") {
            doc.insert("_id", uuid_bson(&entity.id()));
        }
        Ok(doc)
    }

    fn from_document(doc: Document) -> Result<T> {
        serde_json::from_value(document_to_json(doc)).map_err(|e| {
            MartError::Storage(StorageError::IntegrityError {
                message: format!("Failed to decode {} document: {}", T::resource_name(), e),
            })
        })
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        let doc = self
            .collection()
            .find_one(filter)
            .await
            .map_err(|e| storage_failure("Failed to read document", e))?;

        doc.map(Self::from_document).transpose()
    }

    async fn find_many(
        &self,
        filter: Document,
        options: &QueryOptions,
    ) -> Result<Vec<T>> {
        let direction = if options.newest_first { -1 } else { 1 };
        let collection = self.collection();
        let mut find = collection
            .find(filter)
            .sort(doc! { "createdAt": direction, "humanOrderId": direction });
        if let Some(limit) = options.limit {
            find = find.limit(limit as i64);
        }

        let docs: Vec<Document> = find
            .await
            .map_err(|e| storage_failure("Failed to query documents", e))?
            .try_collect()
            .await
            .map_err(|e| storage_failure("Failed to collect documents", e))?;

        docs.into_iter().map(Self::from_document).collect()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// All MongoDB-backed services sharing one database handle
pub struct MongoStores {
    pub orders: MongoOrderStore,
    pub payments: MongoPaymentRecordStore,
    pub carts: MongoCartService,
    pub catalog: MongoProductCatalog,
    pub users: MongoUserDirectory,
}

impl MongoStores {
    /// Connect, pick the database and make sure the indexes exist
    pub async fn connect(uri: &str, database: &str, id_prefix: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(|e| {
            MartError::Storage(StorageError::ConnectionError {
                backend: "mongodb".to_string(),
                message: e.to_string(),
            })
        })?;
        let database = client.database(database);
        info!(database = database.name(), "connected to MongoDB");

        let stores = Self::from_database(database, id_prefix);
        stores.orders.ensure_indexes().await?;
        stores.payments.ensure_indexes().await?;
        Ok(stores)
    }

    pub fn from_database(database: Database, id_prefix: &str) -> Self {
        Self {
            orders: MongoOrderStore::new(database.clone()).with_id_prefix(id_prefix),
            payments: MongoPaymentRecordStore::new(database.clone()),
            carts: MongoCartService::new(database.clone()),
            catalog: MongoProductCatalog::new(database.clone()),
            users: MongoUserDirectory::new(database),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MongoOrderStore {
    docs: Documents<Order>,
    id_prefix: String,
}

impl MongoOrderStore {
    pub fn new(database: Database) -> Self {
        Self {
            docs: Documents::new(database),
            id_prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Create the unique code index and the listing indexes
    ///
    /// This method is idempotent and runs on every startup.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "humanOrderId": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder().keys(doc! { "createdAt": -1 }).build(),
            IndexModel::builder()
                .keys(doc! { "buyerId": 1, "createdAt": -1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "lineItems.sellerId": 1, "createdAt": -1 })
                .build(),
        ];

        self.docs
            .collection()
            .create_indexes(indexes)
            .await
            .map_err(|e| storage_failure("Failed to create indexes on orders collection", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn create(&self, draft: OrderDraft) -> Result<Order> {
        draft.validate()?;

        let now = Utc::now();
        let existing = self.count().await?;

        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = HumanOrderId::next(&self.id_prefix, now, existing + attempt).to_string();
            let order = Order::from_draft(draft.clone(), code, now);
            let doc = Documents::to_document(&order)?;

            match self.docs.collection().insert_one(doc).await {
                Ok(_) => return Ok(order),
                Err(e) if is_duplicate_key(&e) => {
                    warn!(
                        code = %order.human_order_id,
                        "human order id taken, trying next sequence"
                    );
                }
                Err(e) => return Err(storage_failure("Failed to create order", e)),
            }
        }

        Err(MartError::Storage(StorageError::OperationFailed {
            message: format!(
                "no free human order id after {} attempts",
                MAX_CODE_ATTEMPTS
            ),
        }))
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Order>> {
        self.docs.find_one(doc! { "_id": uuid_bson(id) }).await
    }

    async fn get_by_human_id(&self, human_order_id: &str) -> Result<Option<Order>> {
        self.docs
            .find_one(doc! { "humanOrderId": human_order_id })
            .await
    }

    async fn update(&self, id: &Uuid, patch: OrderPatch) -> Result<Order> {
        let mut order = self.get_required(id).await?;
        if order.version != patch.expected_version {
            return Err(OrderError::VersionConflict {
                order_id: *id,
                expected: patch.expected_version,
                actual: order.version,
            }
            .into());
        }

        patch.apply(&mut order);
        let doc = Documents::to_document(&order)?;

        let result = self
            .docs
            .collection()
            .replace_one(
                doc! { "_id": uuid_bson(id), "version": patch.expected_version as i64 },
                doc,
            )
            .await
            .map_err(|e| storage_failure("Failed to update order", e))?;

        if result.matched_count == 0 {
            // Someone else moved the order between our read and write
            return Err(match self.get(id).await? {
                None => MartError::order_not_found(*id),
                Some(current) => OrderError::VersionConflict {
                    order_id: *id,
                    expected: patch.expected_version,
                    actual: current.version,
                }
                .into(),
            });
        }

        Ok(order)
    }

    async fn query_by_buyer(&self, buyer_id: &Uuid, options: &QueryOptions) -> Result<Vec<Order>> {
        self.docs
            .find_many(doc! { "buyerId": uuid_bson(buyer_id) }, options)
            .await
    }

    async fn query_by_seller(
        &self,
        seller_id: &Uuid,
        options: &QueryOptions,
    ) -> Result<Vec<Order>> {
        self.docs
            .find_many(doc! { "lineItems.sellerId": uuid_bson(seller_id) }, options)
            .await
    }

    async fn query_all(&self, options: &QueryOptions) -> Result<Vec<Order>> {
        self.docs.find_many(doc! {}, options).await
    }

    async fn count(&self) -> Result<u64> {
        self.docs
            .collection()
            .count_documents(doc! {})
            .await
            .map_err(|e| storage_failure("Failed to count orders", e))
    }
}

// ---------------------------------------------------------------------------
// Payment records
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MongoPaymentRecordStore {
    docs: Documents<PaymentRecord>,
}

impl MongoPaymentRecordStore {
    pub fn new(database: Database) -> Self {
        Self {
            docs: Documents::new(database),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "orderId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.docs
            .collection()
            .create_index(index)
            .await
            .map_err(|e| storage_failure("Failed to create index on payments collection", e))?;
        Ok(())
    }
}

#[async_trait]
impl PaymentRecordStore for MongoPaymentRecordStore {
    async fn upsert_for_order(
        &self,
        order_id: &Uuid,
        fields: PaymentRecordFields,
    ) -> Result<PaymentRecord> {
        let filter = doc! { "orderId": uuid_bson(order_id) };

        // A concurrent first write can win the unique orderId index; the
        // second pass then overwrites that record.
        for _ in 0..2 {
            let now = Utc::now();
            let record = match self.docs.find_one(filter.clone()).await? {
                Some(mut existing) => {
                    existing.overwrite(fields.clone(), now);
                    existing
                }
                None => PaymentRecord::create(*order_id, fields.clone(), now),
            };
            let doc = Documents::to_document(&record)?;

            match self
                .docs
                .collection()
                .replace_one(filter.clone(), doc)
                .upsert(true)
                .await
            {
                Ok(_) => return Ok(record),
                Err(e) if is_duplicate_key(&e) => continue,
                Err(e) => return Err(storage_failure("Failed to upsert payment record", e)),
            }
        }

        Err(MartError::Storage(StorageError::OperationFailed {
            message: format!("payment record for order '{}' kept changing", order_id),
        }))
    }

    async fn get_for_order(&self, order_id: &Uuid) -> Result<Option<PaymentRecord>> {
        self.docs
            .find_one(doc! { "orderId": uuid_bson(order_id) })
            .await
    }
}

// ---------------------------------------------------------------------------
// Carts, products and users
// ---------------------------------------------------------------------------

/// Carts keyed by buyer id (`_id` is the buyer)
#[derive(Clone)]
pub struct MongoCartService {
    docs: Documents<Cart>,
}

impl MongoCartService {
    pub fn new(database: Database) -> Self {
        Self {
            docs: Documents::new(database),
        }
    }

    /// Replace a buyer's cart
    pub async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let doc = Documents::to_document(cart)?;
        self.docs
            .collection()
            .replace_one(doc! { "_id": uuid_bson(&cart.buyer_id) }, doc)
            .upsert(true)
            .await
            .map_err(|e| storage_failure("Failed to save cart", e))?;
        Ok(())
    }
}

#[async_trait]
impl CartService for MongoCartService {
    async fn get_cart(&self, buyer_id: &Uuid) -> Result<Cart> {
        Ok(self
            .docs
            .find_one(doc! { "_id": uuid_bson(buyer_id) })
            .await?
            .unwrap_or_else(|| Cart::empty(*buyer_id)))
    }

    async fn clear_cart(&self, buyer_id: &Uuid) -> Result<()> {
        self.docs
            .collection()
            .delete_one(doc! { "_id": uuid_bson(buyer_id) })
            .await
            .map_err(|e| storage_failure("Failed to clear cart", e))?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoProductCatalog {
    docs: Documents<ProductSummary>,
}

impl MongoProductCatalog {
    pub fn new(database: Database) -> Self {
        Self {
            docs: Documents::new(database),
        }
    }

    pub async fn insert(&self, product: &ProductSummary) -> Result<()> {
        let doc = Documents::to_document(product)?;
        self.docs
            .collection()
            .replace_one(doc! { "_id": uuid_bson(&product.id) }, doc)
            .upsert(true)
            .await
            .map_err(|e| storage_failure("Failed to save product", e))?;
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MongoProductCatalog {
    async fn get_products(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, ProductSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: Vec<Bson> = ids.iter().map(uuid_bson).collect();

        let docs: Vec<Document> = self
            .docs
            .collection()
            .find(doc! { "_id": { "$in": wanted } })
            .await
            .map_err(|e| storage_failure("Failed to query products", e))?
            .try_collect()
            .await
            .map_err(|e| storage_failure("Failed to collect products", e))?;

        docs.into_iter()
            .map(|doc| Documents::<ProductSummary>::from_document(doc).map(|p| (p.id, p)))
            .collect()
    }
}

/// Users collection, read with credentials projected away
#[derive(Clone)]
pub struct MongoUserDirectory {
    docs: Documents<UserProfile>,
}

impl MongoUserDirectory {
    pub fn new(database: Database) -> Self {
        Self {
            docs: Documents::new(database),
        }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn get_user(&self, id: &Uuid) -> Result<Option<UserProfile>> {
        let doc = self
            .docs
            .collection()
            .find_one(doc! { "_id": uuid_bson(id) })
            .projection(doc! { "password": 0, "passwordHash": 0 })
            .await
            .map_err(|e| storage_failure("Failed to get user", e))?;

        doc.map(Documents::<UserProfile>::from_document).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_to_document_renames_id_to_underscore_id() {
        let doc = json_to_document(json!({"id": "abc-123", "humanOrderId": "JR26100001"})).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), "abc-123");
        assert!(doc.get("id").is_none());
        assert_eq!(doc.get_str("humanOrderId").unwrap(), "JR26100001");
    }

    #[test]
    fn json_to_document_non_object_returns_error() {
        assert!(json_to_document(json!("just a string")).is_err());
    }

    #[test]
    fn document_to_json_renames_underscore_id_to_id() {
        let json = document_to_json(doc! { "_id": "xyz", "version": 3_i64 });
        assert_eq!(json["id"], "xyz");
        assert_eq!(json["version"], 3);
        assert!(json.get("_id").is_none());
    }

    #[test]
    fn uuid_bson_returns_string() {
        let id = Uuid::new_v4();
        assert_eq!(uuid_bson(&id), Bson::String(id.to_string()));
    }

    #[test]
    fn order_document_roundtrip() {
        use crate::orders::model::{LineItem, OrderStatus, PaymentMethod, PaymentStatus};

        let draft = OrderDraft {
            buyer_id: Uuid::new_v4(),
            line_items: vec![LineItem {
                product_id: Uuid::new_v4(),
                seller_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: 100.0,
            }],
            shipping_address: "12 MG Road".to_string(),
            total_amount: 200.0,
            payment_method: PaymentMethod::CashOnDelivery,
            order_status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
        };
        let order = Order::from_draft(draft, "JR26100001".to_string(), Utc::now());

        let doc = Documents::<Order>::to_document(&order).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), order.id.to_string());
        assert_eq!(doc.get_str("orderStatus").unwrap(), "confirmed");

        let back = Documents::<Order>::from_document(doc).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn timestamps_sort_as_strings() {
        let whole = DateTime::parse_from_rfc3339("2026-10-14T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = whole + chrono::Duration::milliseconds(250);

        let encode = |at: DateTime<Utc>| {
            let mut doc = json_to_document(json!({ "createdAt": at, "updatedAt": at })).unwrap();
            fixed_width_timestamps(&mut doc);
            doc
        };
        let first = encode(whole);
        let second = encode(later);

        assert_eq!(first.get_str("createdAt").unwrap(), "2026-10-14T09:30:00.000000000Z");
        assert!(first.get_str("createdAt").unwrap() < second.get_str("createdAt").unwrap());
        assert!(first.get_str("updatedAt").unwrap() < second.get_str("updatedAt").unwrap());

        let back: DateTime<Utc> =
            serde_json::from_value(document_to_json(second)["createdAt"].clone()).unwrap();
        assert_eq!(back, later);
    }
}
