//! In-memory implementations for testing and development
//!
//! Every service keeps its documents in an `Arc<RwLock<HashMap>>`; clones
//! share the same data.

use crate::cart::{Cart, CartItem};
use crate::catalog::{ProductSummary, UserProfile};
use crate::core::error::{MartError, OrderError, Result};
use crate::core::query::QueryOptions;
use crate::core::service::{
    CartService, OrderStore, PaymentRecordStore, ProductCatalog, UserDirectory,
};
use crate::orders::human_id::{DEFAULT_PREFIX, HumanOrderId};
use crate::orders::model::{Order, OrderDraft, OrderPatch};
use crate::payments::{PaymentRecord, PaymentRecordFields};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

fn sorted(mut orders: Vec<Order>, options: &QueryOptions) -> Vec<Order> {
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.human_order_id.cmp(&b.human_order_id))
    });
    if options.newest_first {
        orders.reverse();
    }
    if let Some(limit) = options.limit {
        orders.truncate(limit);
    }
    orders
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// In-memory order store
///
/// Human order codes are assigned while the write lock is held, so two
/// concurrent creates can never observe the same count.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    id_prefix: String,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::with_id_prefix(DEFAULT_PREFIX)
    }

    pub fn with_id_prefix(prefix: impl Into<String>) -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            id_prefix: prefix.into(),
        }
    }

    fn filtered<F>(&self, options: &QueryOptions, predicate: F) -> Result<Vec<Order>>
    where
        F: Fn(&Order) -> bool,
    {
        let orders = self
            .orders
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let matching: Vec<Order> = orders.values().filter(|o| predicate(o)).cloned().collect();
        Ok(sorted(matching, options))
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, draft: OrderDraft) -> Result<Order> {
        draft.validate()?;

        let mut orders = self
            .orders
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let now = Utc::now();
        let mut existing = orders.len() as u64;
        let human_order_id = loop {
            let candidate = HumanOrderId::next(&self.id_prefix, now, existing).to_string();
            if !orders.values().any(|o| o.human_order_id == candidate) {
                break candidate;
            }
            existing += 1;
        };

        let order = Order::from_draft(draft, human_order_id, now);
        orders.insert(order.id, order.clone());

        Ok(order)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Order>> {
        let orders = self
            .orders
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(orders.get(id).cloned())
    }

    async fn get_by_human_id(&self, human_order_id: &str) -> Result<Option<Order>> {
        let orders = self
            .orders
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(orders
            .values()
            .find(|o| o.human_order_id == human_order_id)
            .cloned())
    }

    async fn update(&self, id: &Uuid, patch: OrderPatch) -> Result<Order> {
        let mut orders = self
            .orders
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let order = orders
            .get_mut(id)
            .ok_or_else(|| MartError::order_not_found(*id))?;

        if order.version != patch.expected_version {
            return Err(OrderError::VersionConflict {
                order_id: *id,
                expected: patch.expected_version,
                actual: order.version,
            }
            .into());
        }

        patch.apply(order);
        Ok(order.clone())
    }

    async fn query_by_buyer(&self, buyer_id: &Uuid, options: &QueryOptions) -> Result<Vec<Order>> {
        self.filtered(options, |o| &o.buyer_id == buyer_id)
    }

    async fn query_by_seller(
        &self,
        seller_id: &Uuid,
        options: &QueryOptions,
    ) -> Result<Vec<Order>> {
        self.filtered(options, |o| o.has_seller(seller_id))
    }

    async fn query_all(&self, options: &QueryOptions) -> Result<Vec<Order>> {
        self.filtered(options, |_| true)
    }

    async fn count(&self) -> Result<u64> {
        let orders = self
            .orders
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(orders.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Payment records
// ---------------------------------------------------------------------------

/// In-memory payment records, keyed by order id
#[derive(Clone, Default)]
pub struct InMemoryPaymentRecordStore {
    records: Arc<RwLock<HashMap<Uuid, PaymentRecord>>>,
}

impl InMemoryPaymentRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRecordStore for InMemoryPaymentRecordStore {
    async fn upsert_for_order(
        &self,
        order_id: &Uuid,
        fields: PaymentRecordFields,
    ) -> Result<PaymentRecord> {
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let now = Utc::now();
        let record = records
            .entry(*order_id)
            .and_modify(|existing| existing.overwrite(fields.clone(), now))
            .or_insert_with(|| PaymentRecord::create(*order_id, fields, now));

        Ok(record.clone())
    }

    async fn get_for_order(&self, order_id: &Uuid) -> Result<Option<PaymentRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(records.get(order_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Carts
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryCartService {
    carts: Arc<RwLock<HashMap<Uuid, Cart>>>,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of a product to the buyer's cart
    pub fn add_item(&self, buyer_id: Uuid, product_id: Uuid, quantity: u32) -> Result<()> {
        let mut carts = self
            .carts
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let cart = carts.entry(buyer_id).or_insert_with(|| Cart::empty(buyer_id));
        match cart.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity += quantity,
            None => cart.items.push(CartItem {
                product_id,
                quantity,
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn get_cart(&self, buyer_id: &Uuid) -> Result<Cart> {
        let carts = self
            .carts
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(carts
            .get(buyer_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(*buyer_id)))
    }

    async fn clear_cart(&self, buyer_id: &Uuid) -> Result<()> {
        let mut carts = self
            .carts
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        carts.remove(buyer_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Catalog and users
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<Uuid, ProductSummary>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: ProductSummary) -> Result<()> {
        let mut products = self
            .products
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        products.insert(product.id, product);
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_products(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, ProductSummary>> {
        let products = self
            .products
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(ids
            .iter()
            .filter_map(|id| products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<Uuid, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserProfile) -> Result<()> {
        let mut users = self
            .users
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        users.insert(user.id, user);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: &Uuid) -> Result<Option<UserProfile>> {
        let users = self
            .users
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(users.get(id).cloned())
    }
}
