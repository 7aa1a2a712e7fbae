//! Read side of the order API
//!
//! Reads never mutate anything, so clients may poll as often as they like.

use crate::catalog::{ProductSummary, UserSummary};
use crate::core::auth::{AuthContext, AuthPolicy, Role};
use crate::core::error::{MartError, OrderError, Result};
use crate::core::query::ListParams;
use crate::core::service::{OrderStore, PaymentRecordStore, ProductCatalog, UserDirectory};
use crate::orders::access::OrderAccess;
use crate::orders::human_id::HumanOrderId;
use crate::orders::model::{Order, OrderStatus, PaymentStatus, TrackingEntry};
use crate::payments::PaymentRecord;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// An order decorated with the products it references and its buyer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub products: Vec<ProductSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_id: Uuid,
    pub human_order_id: String,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_history: Vec<TrackingEntry>,
}

impl From<Order> for TrackingView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            human_order_id: order.human_order_id,
            order_status: order.order_status,
            payment_status: order.payment_status,
            tracking_history: order.tracking_history,
        }
    }
}

pub struct OrderQueryService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentRecordStore>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    users: Option<Arc<dyn UserDirectory>>,
    recent_limit: usize,
    max_limit: usize,
}

impl OrderQueryService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentRecordStore>,
        recent_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            orders,
            payments,
            catalog: None,
            users: None,
            recent_limit,
            max_limit,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub async fn get(&self, actor: &AuthContext, id: &Uuid) -> Result<OrderView> {
        actor.require_identity()?;
        let order = self.orders.get_required(id).await?;
        OrderAccess::Participant.ensure(actor, &order, "view this order")?;
        self.decorate_one(order).await
    }

    /// Look an order up by its printed code
    pub async fn get_by_human_id(&self, actor: &AuthContext, code: &str) -> Result<OrderView> {
        actor.require_identity()?;
        let code = code.trim();
        HumanOrderId::parse(code).map_err(|e| MartError::field("humanOrderId", e.to_string()))?;

        let order = self
            .orders
            .get_by_human_id(code)
            .await?
            .ok_or_else(|| OrderError::NotFoundByHumanId {
                human_order_id: code.to_string(),
            })?;
        OrderAccess::Participant.ensure(actor, &order, "view this order")?;
        self.decorate_one(order).await
    }

    pub async fn for_buyer(
        &self,
        actor: &AuthContext,
        buyer_id: &Uuid,
        params: &ListParams,
    ) -> Result<Vec<OrderView>> {
        self.require_self_or_admin(actor, Role::Buyer, buyer_id)?;
        let options = params.to_options(self.recent_limit, self.max_limit);
        debug!(buyer_id = %buyer_id, limit = ?options.limit, "listing buyer orders");

        let orders = self.orders.query_by_buyer(buyer_id, &options).await?;
        self.decorate(orders).await
    }

    pub async fn for_seller(
        &self,
        actor: &AuthContext,
        seller_id: &Uuid,
        params: &ListParams,
    ) -> Result<Vec<OrderView>> {
        self.require_self_or_admin(actor, Role::Seller, seller_id)?;
        let options = params.to_options(self.recent_limit, self.max_limit);
        debug!(seller_id = %seller_id, limit = ?options.limit, "listing seller orders");

        let orders = self.orders.query_by_seller(seller_id, &options).await?;
        self.decorate(orders).await
    }

    /// Every order in the marketplace, for admins
    pub async fn all(&self, actor: &AuthContext, params: &ListParams) -> Result<Vec<OrderView>> {
        AuthPolicy::HasRole(vec![Role::Admin]).enforce(actor, "list every order")?;
        let options = params.to_options(self.recent_limit, self.max_limit);
        debug!(limit = ?options.limit, "listing all orders");

        let orders = self.orders.query_all(&options).await?;
        self.decorate(orders).await
    }

    /// Most recent orders visible to the actor
    ///
    /// Buyers get their own orders and sellers the orders holding one of
    /// their line items.
    pub async fn recent(
        &self,
        actor: &AuthContext,
        limit: Option<usize>,
    ) -> Result<Vec<OrderView>> {
        let params = ListParams {
            recent: true,
            limit,
        };
        match actor {
            AuthContext::User {
                user_id,
                role: Role::Buyer,
            } => self.for_buyer(actor, user_id, &params).await,
            AuthContext::User {
                user_id,
                role: Role::Seller,
            } => self.for_seller(actor, user_id, &params).await,
            AuthContext::User { .. } | AuthContext::Admin { .. } => Err(MartError::forbidden(
                "recent orders are listed per buyer or seller",
            )),
            AuthContext::Anonymous => Err(MartError::unauthorized(
                "identify as a buyer or seller to list recent orders",
            )),
        }
    }

    pub async fn tracking(&self, actor: &AuthContext, id: &Uuid) -> Result<TrackingView> {
        actor.require_identity()?;
        let order = self.orders.get_required(id).await?;
        OrderAccess::Participant.ensure(actor, &order, "track this order")?;
        Ok(order.into())
    }

    pub async fn payment_record(
        &self,
        actor: &AuthContext,
        order_id: &Uuid,
    ) -> Result<PaymentRecord> {
        actor.require_identity()?;
        let order = self.orders.get_required(order_id).await?;
        OrderAccess::Participant.ensure(actor, &order, "view this payment")?;

        self.payments
            .get_for_order(order_id)
            .await?
            .ok_or_else(|| OrderError::PaymentRecordNotFound { order_id: *order_id }.into())
    }

    fn require_self_or_admin(&self, actor: &AuthContext, role: Role, id: &Uuid) -> Result<()> {
        actor.require_identity()?;
        if actor.is_admin() || actor.acts_as(role, id) {
            Ok(())
        } else {
            Err(MartError::forbidden(format!(
                "only that {} or an admin may list these orders",
                role
            )))
        }
    }

    async fn decorate_one(&self, order: Order) -> Result<OrderView> {
        let mut views = self.decorate(vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| MartError::Internal("decorated view went missing".to_string()))
    }

    /// Join products and buyers with one catalog call and one lookup per buyer
    async fn decorate(&self, orders: Vec<Order>) -> Result<Vec<OrderView>> {
        let products = match &self.catalog {
            Some(catalog) => {
                let ids: Vec<Uuid> = orders
                    .iter()
                    .flat_map(|o| o.line_items.iter().map(|item| item.product_id))
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                catalog.get_products(&ids).await?
            }
            None => HashMap::new(),
        };

        let mut buyers: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        if let Some(users) = &self.users {
            for order in &orders {
                if !buyers.contains_key(&order.buyer_id) {
                    let profile = users.get_user(&order.buyer_id).await?;
                    buyers.insert(order.buyer_id, profile.as_ref().map(UserSummary::from));
                }
            }
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let mut seen = HashSet::new();
                let products = order
                    .line_items
                    .iter()
                    .filter(|item| seen.insert(item.product_id))
                    .filter_map(|item| products.get(&item.product_id).cloned())
                    .collect();
                let buyer = buyers.get(&order.buyer_id).cloned().flatten();
                OrderView {
                    order,
                    products,
                    buyer,
                }
            })
            .collect())
    }
}
