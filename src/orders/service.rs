//! Order lifecycle service
//!
//! The only writer of `orderStatus`, `paymentStatus` and `trackingHistory`.
//! Each operation loads the order, checks the actor, asks
//! [`lifecycle::plan`](crate::orders::lifecycle::plan) for a patch and
//! hands it to the store with the version it was planned from.

use crate::config::{OrderConfig, TotalPolicy};
use crate::core::auth::{AuthContext, AuthPolicy, Role};
use crate::core::error::{CatalogError, MartError, Result, StorageError};
use crate::core::events::{EventBus, OrderEvent};
use crate::core::service::{CartService, OrderStore, PaymentRecordStore, ProductCatalog};
use crate::core::validation::FieldErrors;
use crate::core::validation::validators;
use crate::orders::access::OrderAccess;
use crate::orders::lifecycle::{Transition, accepts_payment_proof, plan};
use crate::orders::model::{
    LineItem, NewOrder, Order, OrderDraft, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::payments::{PaymentRecordFields, PaymentRecordStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Body of `POST /orders/checkout`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
}

/// Seller decision on a submitted payment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDecision {
    /// `payment_verified` or `payment_rejected`
    pub status: Option<String>,
    /// Tracking message, or the rejection reason
    pub message: Option<String>,
}

pub struct OrderLifecycleService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentRecordStore>,
    carts: Arc<dyn CartService>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    events: Option<EventBus>,
    policy: OrderConfig,
}

impl OrderLifecycleService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentRecordStore>,
        carts: Arc<dyn CartService>,
        policy: OrderConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            carts,
            catalog: None,
            events: None,
            policy,
        }
    }

    /// Check line-item sellers against this catalog at creation
    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Place an order from an explicit line-item list
    #[tracing::instrument(skip_all, fields(actor = ?actor.actor_id()))]
    pub async fn place_order(&self, actor: &AuthContext, request: NewOrder) -> Result<Order> {
        AuthPolicy::HasRole(vec![Role::Buyer, Role::Admin]).enforce(actor, "place orders")?;

        let draft = request.into_draft()?;
        if !actor.is_admin() && !actor.acts_as(Role::Buyer, &draft.buyer_id) {
            return Err(MartError::forbidden("buyers may only place orders for themselves"));
        }

        self.check_sellers(&draft).await?;
        self.persist_new(draft).await
    }

    /// Turn the acting buyer's cart into an order priced from the catalog
    #[tracing::instrument(skip_all, fields(actor = ?actor.actor_id()))]
    pub async fn checkout_cart(
        &self,
        actor: &AuthContext,
        request: CheckoutRequest,
    ) -> Result<Order> {
        AuthPolicy::HasRole(vec![Role::Buyer]).enforce(actor, "check out a cart")?;
        let Some(buyer_id) = actor.actor_id() else {
            return Err(MartError::unauthorized("checkout needs a buyer identity"));
        };
        let catalog = self.catalog.as_ref().ok_or_else(|| {
            MartError::Storage(StorageError::Unavailable {
                backend: "product catalog".to_string(),
            })
        })?;

        let cart = self.carts.get_cart(&buyer_id).await?;
        if cart.is_empty() {
            return Err(MartError::field("cart", "cart is empty"));
        }

        let ids: Vec<Uuid> = cart.items.iter().map(|item| item.product_id).collect();
        let products = catalog.get_products(&ids).await?;

        let mut line_items = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = products.get(&item.product_id).ok_or(CatalogError::ProductNotFound {
                product_id: item.product_id,
            })?;
            line_items.push(LineItem {
                product_id: product.id,
                seller_id: product.seller_id,
                quantity: item.quantity,
                unit_price: product.price,
            });
        }
        let total_amount = line_items.iter().map(LineItem::subtotal).sum();

        let mut errors = FieldErrors::new();
        errors.check("shippingAddress", validators::required(&request.shipping_address));
        if let Some(address) = &request.shipping_address {
            errors.check("shippingAddress", validators::non_blank(address));
        }
        let payment_method = request.payment_method.as_deref().and_then(PaymentMethod::parse);
        match &request.payment_method {
            None => errors.push("paymentMethod", "is required"),
            Some(raw) if payment_method.is_none() => {
                errors.check("paymentMethod", validators::one_of(raw, &PaymentMethod::NAMES))
            }
            Some(_) => {}
        }
        errors.into_result()?;

        let (Some(shipping_address), Some(payment_method)) =
            (request.shipping_address, payment_method)
        else {
            return Err(MartError::Internal(
                "checkout validated with missing fields".to_string(),
            ));
        };

        debug!(buyer_id = %buyer_id, items = line_items.len(), "checking out cart");
        self.persist_new(OrderDraft {
            buyer_id,
            line_items,
            shipping_address: shipping_address.trim().to_string(),
            total_amount,
            payment_method,
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
        })
        .await
    }

    async fn persist_new(&self, draft: OrderDraft) -> Result<Order> {
        if self.policy.total_policy == TotalPolicy::Verify {
            let mut errors = FieldErrors::new();
            errors.check(
                "totalAmount",
                validators::matches_amount(
                    draft.total_amount,
                    draft.line_item_total(),
                    self.policy.total_tolerance,
                ),
            );
            errors.into_result()?;
        }

        let draft = match draft.payment_method {
            PaymentMethod::CashOnDelivery => {
                draft.with_initial_state(self.policy.cod_initial_status, PaymentStatus::Pending)
            }
            PaymentMethod::Online => {
                draft.with_initial_state(OrderStatus::Pending, PaymentStatus::Pending)
            }
        };

        let order = self.orders.create(draft).await?;
        info!(
            order_id = %order.id,
            human_order_id = %order.human_order_id,
            payment_method = %order.payment_method,
            status = %order.order_status,
            "order created"
        );
        self.publish(OrderEvent::created(&order));

        if order.payment_method == PaymentMethod::CashOnDelivery {
            self.clear_cart_best_effort(&order).await;
        }
        Ok(order)
    }

    /// Line-item sellers must own the product when the catalog knows it
    async fn check_sellers(&self, draft: &OrderDraft) -> Result<()> {
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };

        let ids: Vec<Uuid> = draft.line_items.iter().map(|item| item.product_id).collect();
        let products = catalog.get_products(&ids).await?;

        let mut errors = FieldErrors::new();
        for (index, item) in draft.line_items.iter().enumerate() {
            let product = products.get(&item.product_id).ok_or(CatalogError::ProductNotFound {
                product_id: item.product_id,
            })?;
            if product.seller_id != item.seller_id {
                errors.push(
                    format!("lineItems[{}].sellerId", index),
                    format!("product '{}' is not sold by this seller", product.id),
                );
            }
        }
        errors.into_result()
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Fail the way [`Self::submit_payment_proof`] would before any evidence
    /// exists: unknown order, not the buyer, or no proof expected
    pub async fn ensure_accepts_payment_proof(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
    ) -> Result<()> {
        let order = self.orders.get_required(&order_id).await?;
        OrderAccess::Buyer.ensure(actor, &order, "submit_payment_proof")?;
        accepts_payment_proof(&order)
    }

    /// Record the buyer's UTR number and proof reference
    pub async fn submit_payment_proof(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        utr_number: String,
        payment_proof_ref: String,
    ) -> Result<Order> {
        let order = self
            .transition(
                actor,
                order_id,
                OrderAccess::Buyer,
                Transition::SubmitPaymentProof {
                    utr_number,
                    payment_proof_ref,
                },
            )
            .await?;

        self.clear_cart_best_effort(&order).await;
        Ok(order)
    }

    pub async fn verify_payment(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        message: Option<String>,
    ) -> Result<Order> {
        let remarks = message.clone();
        let order = self
            .transition(
                actor,
                order_id,
                OrderAccess::Seller,
                Transition::VerifyPayment { message },
            )
            .await?;

        let fields = PaymentRecordFields::from_order(&order, PaymentRecordStatus::Completed)
            .verified(actor.actor_id(), order.updated_at)
            .remarks(remarks);
        self.write_payment_record(&order, fields).await;
        Ok(order)
    }

    pub async fn reject_payment(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        reason: String,
    ) -> Result<Order> {
        let order = self
            .transition(
                actor,
                order_id,
                OrderAccess::Seller,
                Transition::RejectPayment { reason },
            )
            .await?;

        self.record_rejection(&order).await;
        Ok(order)
    }

    /// Dispatch a `payment_verified` / `payment_rejected` decision
    ///
    /// For a rejection the message is the reason.
    pub async fn apply_verification_decision(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        decision: VerificationDecision,
    ) -> Result<Order> {
        let status = decision.status.as_deref().map(str::trim);
        match status.and_then(OrderStatus::parse) {
            Some(OrderStatus::PaymentVerified) => {
                self.verify_payment(actor, order_id, decision.message).await
            }
            Some(OrderStatus::PaymentRejected) => {
                self.reject_payment(actor, order_id, decision.message.unwrap_or_default())
                    .await
            }
            _ => Err(MartError::field(
                "status",
                "must be payment_verified or payment_rejected",
            )),
        }
    }

    /// Force a resubmission when UTR or proof is missing
    pub async fn reject_incomplete_payment(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        reason: String,
    ) -> Result<Order> {
        let order = self
            .transition(
                actor,
                order_id,
                OrderAccess::Seller,
                Transition::RejectIncompletePayment { reason },
            )
            .await?;

        self.record_rejection(&order).await;
        Ok(order)
    }

    /// Move an order along the fulfilment chain
    ///
    /// Targeting `cancelled` goes through the cancel rules.
    pub async fn advance_status(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        status: OrderStatus,
        message: Option<String>,
    ) -> Result<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel(actor, order_id, message).await;
        }
        self.transition(
            actor,
            order_id,
            OrderAccess::Seller,
            Transition::AdvanceShipment { status, message },
        )
        .await
    }

    pub async fn cancel(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<Order> {
        self.transition(
            actor,
            order_id,
            OrderAccess::Participant,
            Transition::Cancel { reason },
        )
        .await
    }

    #[tracing::instrument(
        skip_all,
        fields(order_id = %order_id, transition = transition.name())
    )]
    async fn transition(
        &self,
        actor: &AuthContext,
        order_id: Uuid,
        access: OrderAccess,
        transition: Transition,
    ) -> Result<Order> {
        let current = self.orders.get_required(&order_id).await?;
        access.ensure(actor, &current, transition.name())?;

        let patch = plan(&current, &transition, actor.actor_id(), Utc::now())?;
        let updated = self.orders.update(&order_id, patch).await?;

        info!(
            human_order_id = %updated.human_order_id,
            from = %current.order_status,
            to = %updated.order_status,
            payment_status = %updated.payment_status,
            "order transition applied"
        );
        self.publish(OrderEvent::status_changed(
            &updated,
            transition.name(),
            current.order_status,
            actor.actor_id(),
        ));
        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Side effects
    // -------------------------------------------------------------------------

    async fn record_rejection(&self, order: &Order) {
        let fields = PaymentRecordFields::from_order(order, PaymentRecordStatus::Failed)
            .remarks(order.rejected_reason.clone());
        self.write_payment_record(order, fields).await;
    }

    /// The order is already committed, so a failed record write is only logged
    async fn write_payment_record(&self, order: &Order, fields: PaymentRecordFields) {
        if let Err(e) = self.payments.upsert_for_order(&order.id, fields).await {
            error!(
                order_id = %order.id,
                human_order_id = %order.human_order_id,
                error = %e,
                "failed to write payment record"
            );
        }
    }

    async fn clear_cart_best_effort(&self, order: &Order) {
        if let Err(e) = self.carts.clear_cart(&order.buyer_id).await {
            warn!(
                buyer_id = %order.buyer_id,
                human_order_id = %order.human_order_id,
                error = %e,
                "failed to clear cart"
            );
        }
    }

    fn publish(&self, event: OrderEvent) {
        if let Some(events) = &self.events {
            let receivers = events.publish(event);
            debug!(receivers, "order event published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductSummary;
    use crate::core::service::OrderStore;
    use crate::storage::in_memory::{
        InMemoryCartService, InMemoryOrderStore, InMemoryPaymentRecordStore,
        InMemoryProductCatalog,
    };
    use crate::cart::Cart;
    use crate::core::query::QueryOptions;
    use crate::orders::model::OrderPatch;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;
    use tokio::sync::Barrier;

    struct BrokenCart;

    #[async_trait]
    impl CartService for BrokenCart {
        async fn get_cart(&self, buyer_id: &Uuid) -> Result<Cart> {
            Ok(Cart::empty(*buyer_id))
        }

        async fn clear_cart(&self, _buyer_id: &Uuid) -> Result<()> {
            Err(anyhow::anyhow!("cart backend offline").into())
        }
    }

    /// Holds each reader until every racer has loaded the same version
    struct GatedOrders {
        inner: InMemoryOrderStore,
        gate: Barrier,
    }

    #[async_trait]
    impl OrderStore for GatedOrders {
        async fn create(&self, draft: OrderDraft) -> Result<Order> {
            self.inner.create(draft).await
        }

        async fn get(&self, id: &Uuid) -> Result<Option<Order>> {
            let order = self.inner.get(id).await?;
            self.gate.wait().await;
            Ok(order)
        }

        async fn get_by_human_id(&self, human_order_id: &str) -> Result<Option<Order>> {
            self.inner.get_by_human_id(human_order_id).await
        }

        async fn update(&self, id: &Uuid, patch: OrderPatch) -> Result<Order> {
            self.inner.update(id, patch).await
        }

        async fn query_by_buyer(
            &self,
            buyer_id: &Uuid,
            options: &QueryOptions,
        ) -> Result<Vec<Order>> {
            self.inner.query_by_buyer(buyer_id, options).await
        }

        async fn query_by_seller(
            &self,
            seller_id: &Uuid,
            options: &QueryOptions,
        ) -> Result<Vec<Order>> {
            self.inner.query_by_seller(seller_id, options).await
        }

        async fn query_all(&self, options: &QueryOptions) -> Result<Vec<Order>> {
            self.inner.query_all(options).await
        }

        async fn count(&self) -> Result<u64> {
            self.inner.count().await
        }
    }

    struct Fixture {
        service: OrderLifecycleService,
        orders: InMemoryOrderStore,
        payments: InMemoryPaymentRecordStore,
        carts: InMemoryCartService,
        buyer: Uuid,
        seller: Uuid,
    }

    fn fixture(policy: OrderConfig) -> Fixture {
        let orders = InMemoryOrderStore::new();
        let payments = InMemoryPaymentRecordStore::new();
        let carts = InMemoryCartService::new();
        let service = OrderLifecycleService::new(
            Arc::new(orders.clone()),
            Arc::new(payments.clone()),
            Arc::new(carts.clone()),
            policy,
        );
        Fixture {
            service,
            orders,
            payments,
            carts,
            buyer: Uuid::new_v4(),
            seller: Uuid::new_v4(),
        }
    }

    fn request(buyer: Uuid, seller: Uuid, method: &str, total: f64) -> NewOrder {
        serde_json::from_value(json!({
            "buyerId": buyer,
            "lineItems": [{
                "productId": Uuid::new_v4(),
                "sellerId": seller,
                "quantity": 2,
                "unitPrice": 100.0
            }],
            "shippingAddress": "12 MG Road",
            "totalAmount": total,
            "paymentMethod": method
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_cod_order_is_confirmed_and_clears_cart() {
        let f = fixture(OrderConfig::default());
        f.carts.add_item(f.buyer, Uuid::new_v4(), 1).unwrap();

        let order = f
            .service
            .place_order(
                &AuthContext::buyer(f.buyer),
                request(f.buyer, f.seller, "cash_on_delivery", 200.0),
            )
            .await
            .unwrap();

        assert_eq!(order.total_amount, 200.0);
        assert_eq!(order.order_status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.tracking_history.len(), 1);
        assert!(f.carts.get_cart(&f.buyer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_order_keeps_cart_until_proof() {
        let f = fixture(OrderConfig::default());
        f.carts.add_item(f.buyer, Uuid::new_v4(), 1).unwrap();
        let buyer = AuthContext::buyer(f.buyer);

        let order = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();
        assert_eq!(order.order_status, OrderStatus::Pending);
        assert!(!f.carts.get_cart(&f.buyer).await.unwrap().is_empty());

        let order = f
            .service
            .submit_payment_proof(&buyer, order.id, "UTR123".into(), "ref.png".into())
            .await
            .unwrap();
        assert_eq!(order.order_status, OrderStatus::PaymentPending);
        assert_eq!(order.payment_status, PaymentStatus::PendingVerification);
        assert_eq!(order.tracking_history.len(), 2);
        assert!(f.carts.get_cart(&f.buyer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cart_failure_does_not_fail_creation() {
        let orders = InMemoryOrderStore::new();
        let service = OrderLifecycleService::new(
            Arc::new(orders.clone()),
            Arc::new(InMemoryPaymentRecordStore::new()),
            Arc::new(BrokenCart),
            OrderConfig::default(),
        );
        let buyer = Uuid::new_v4();

        let order = service
            .place_order(&AuthContext::buyer(buyer), request(buyer, Uuid::new_v4(), "cod", 200.0))
            .await
            .unwrap();
        assert!(orders.get(&order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_buyer_cannot_order_for_someone_else() {
        let f = fixture(OrderConfig::default());
        let err = f
            .service
            .place_order(
                &AuthContext::buyer(Uuid::new_v4()),
                request(f.buyer, f.seller, "online", 200.0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
        assert_eq!(f.orders.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verify_total_policy() {
        let policy = OrderConfig {
            total_policy: TotalPolicy::Verify,
            ..OrderConfig::default()
        };
        let f = fixture(policy);
        let buyer = AuthContext::buyer(f.buyer);

        let err = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 150.0))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        assert!(
            f.service
                .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_trust_total_policy_keeps_submitted_total() {
        let f = fixture(OrderConfig::default());
        let order = f
            .service
            .place_order(&AuthContext::buyer(f.buyer), request(f.buyer, f.seller, "online", 150.0))
            .await
            .unwrap();
        assert_eq!(order.total_amount, 150.0);
    }

    #[tokio::test]
    async fn test_verification_writes_payment_record() {
        let f = fixture(OrderConfig::default());
        let buyer = AuthContext::buyer(f.buyer);
        let seller = AuthContext::seller(f.seller);

        let order = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();
        f.service
            .submit_payment_proof(&buyer, order.id, "UTR123".into(), "ref.png".into())
            .await
            .unwrap();

        let verified = f
            .service
            .apply_verification_decision(
                &seller,
                order.id,
                VerificationDecision {
                    status: Some("payment_verified".into()),
                    message: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(verified.order_status, OrderStatus::PaymentVerified);
        assert_eq!(verified.payment_status, PaymentStatus::Completed);
        assert_eq!(verified.tracking_history.len(), 3);

        let record = f.payments.get_for_order(&order.id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentRecordStatus::Completed);
        assert_eq!(record.verified_by, Some(f.seller));
        assert!(record.verified_at.is_some());
        assert_eq!(record.utr_number.as_deref(), Some("UTR123"));
    }

    #[tokio::test]
    async fn test_concurrent_verify_and_reject_serialize() {
        let f = fixture(OrderConfig::default());
        let buyer = AuthContext::buyer(f.buyer);
        let seller = AuthContext::seller(f.seller);
        let order = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();
        f.service
            .submit_payment_proof(&buyer, order.id, "UTR123".into(), "ref.png".into())
            .await
            .unwrap();

        let racing = OrderLifecycleService::new(
            Arc::new(GatedOrders {
                inner: f.orders.clone(),
                gate: Barrier::new(2),
            }),
            Arc::new(f.payments.clone()),
            Arc::new(f.carts.clone()),
            OrderConfig::default(),
        );
        let (verified, rejected) = tokio::join!(
            racing.verify_payment(&seller, order.id, None),
            racing.reject_payment(&seller, order.id, "amount mismatch".into()),
        );

        let (winner, loser) = match (verified, rejected) {
            (Ok(order), Err(err)) | (Err(err), Ok(order)) => (order, err),
            (a, b) => panic!("expected exactly one winner, got {:?} and {:?}", a, b),
        };
        assert_eq!(loser.error_code(), "ORDER_VERSION_CONFLICT");
        assert_eq!(loser.status_code(), StatusCode::CONFLICT);

        let stored = f.orders.get_required(&order.id).await.unwrap();
        assert_eq!(stored, winner);
        assert_eq!(stored.tracking_history.len(), 3);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_proof_precheck_matches_submission_rules() {
        let f = fixture(OrderConfig::default());
        let buyer = AuthContext::buyer(f.buyer);
        let online = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();
        let cod = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "cod", 200.0))
            .await
            .unwrap();

        assert!(f.service.ensure_accepts_payment_proof(&buyer, online.id).await.is_ok());

        let err = f
            .service
            .ensure_accepts_payment_proof(&buyer, cod.id)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ORDER_STATE");

        let err = f
            .service
            .ensure_accepts_payment_proof(&AuthContext::buyer(Uuid::new_v4()), online.id)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");

        let err = f
            .service
            .ensure_accepts_payment_proof(&buyer, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ORDER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reject_incomplete_writes_failed_record() {
        let f = fixture(OrderConfig::default());
        let order = f
            .service
            .place_order(&AuthContext::buyer(f.buyer), request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();

        let rejected = f
            .service
            .reject_incomplete_payment(
                &AuthContext::seller(f.seller),
                order.id,
                "no screenshot".into(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.order_status, OrderStatus::PaymentRejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("no screenshot"));
        assert_eq!(rejected.tracking_history.len(), 2);

        let record = f.payments.get_for_order(&order.id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentRecordStatus::Failed);
        assert_eq!(record.remarks.as_deref(), Some("no screenshot"));
    }

    #[tokio::test]
    async fn test_unknown_decision_is_validation_error() {
        let f = fixture(OrderConfig::default());
        let err = f
            .service
            .apply_verification_decision(
                &AuthContext::seller(f.seller),
                Uuid::new_v4(),
                VerificationDecision {
                    status: Some("shipped".into()),
                    message: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_other_seller_cannot_verify() {
        let f = fixture(OrderConfig::default());
        let buyer = AuthContext::buyer(f.buyer);
        let order = f
            .service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap();
        f.service
            .submit_payment_proof(&buyer, order.id, "UTR123".into(), "ref.png".into())
            .await
            .unwrap();

        let err = f
            .service
            .verify_payment(&AuthContext::seller(Uuid::new_v4()), order.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");

        let err = f
            .service
            .verify_payment(&buyer, order.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_advance_to_cancelled_uses_cancel_rules() {
        let f = fixture(OrderConfig::default());
        let order = f
            .service
            .place_order(&AuthContext::buyer(f.buyer), request(f.buyer, f.seller, "cod", 200.0))
            .await
            .unwrap();

        let cancelled = f
            .service
            .advance_status(
                &AuthContext::seller(f.seller),
                order.id,
                OrderStatus::Cancelled,
                Some("out of stock".into()),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);

        let err = f
            .service
            .cancel(&AuthContext::buyer(f.buyer), order.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ORDER_STATE");
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let f = fixture(OrderConfig::default());
        let service = f.service.with_events(bus);

        let order = service
            .place_order(&AuthContext::buyer(f.buyer), request(f.buyer, f.seller, "cod", 200.0))
            .await
            .unwrap();
        service
            .cancel(&AuthContext::buyer(f.buyer), order.id, None)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().event.action(), "created");
        match rx.recv().await.unwrap().event {
            OrderEvent::StatusChanged { from, to, tracking_len, .. } => {
                assert_eq!(from, OrderStatus::Confirmed);
                assert_eq!(to, OrderStatus::Cancelled);
                assert_eq!(tracking_len, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_catalog_checks_sellers_and_prices_checkout() {
        let f = fixture(OrderConfig::default());
        let catalog = InMemoryProductCatalog::new();
        let product = ProductSummary {
            id: Uuid::new_v4(),
            name: "Brass lamp".into(),
            price: 75.0,
            seller_id: f.seller,
            image: None,
        };
        catalog.insert(product.clone()).unwrap();
        let service = f.service.with_catalog(Arc::new(catalog));
        let buyer = AuthContext::buyer(f.buyer);

        let mut wrong_seller = request(f.buyer, Uuid::new_v4(), "online", 200.0);
        if let Some(items) = wrong_seller.line_items.as_mut() {
            items[0].product_id = Some(product.id);
        }
        let err = service.place_order(&buyer, wrong_seller).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let err = service
            .place_order(&buyer, request(f.buyer, f.seller, "online", 200.0))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PRODUCT_NOT_FOUND");

        let checkout = CheckoutRequest {
            shipping_address: Some("4 Park Street".into()),
            payment_method: Some("online".into()),
        };
        let err = service.checkout_cart(&buyer, checkout.clone()).await.unwrap_err();
        assert!(err.to_string().contains("cart is empty"));

        f.carts.add_item(f.buyer, product.id, 2).unwrap();
        let order = service.checkout_cart(&buyer, checkout).await.unwrap();
        assert_eq!(order.total_amount, 150.0);
        assert_eq!(order.line_items[0].seller_id, f.seller);
        assert_eq!(order.buyer_id, f.buyer);
    }
}
