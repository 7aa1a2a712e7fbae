//! Order documents, their status axes and the patches that mutate them

use crate::core::entity::Entity;
use crate::core::error::Result;
use crate::core::validation::FieldErrors;
use crate::core::validation::validators;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Message of the tracking entry seeded at creation
pub const ORDER_CREATED_MESSAGE: &str = "Order created";

/// Position of an order in its fulfilment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentPending,
    PaymentVerified,
    PaymentRejected,
    Processing,
    Confirmed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::PaymentPending,
        OrderStatus::PaymentVerified,
        OrderStatus::PaymentRejected,
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentVerified => "payment_verified",
            OrderStatus::PaymentRejected => "payment_rejected",
            OrderStatus::Processing => "processing",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the wire name of a status; `None` for anything unknown
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Human-facing label used in default tracking messages
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "awaiting payment verification",
            OrderStatus::PaymentVerified => "payment verified",
            OrderStatus::PaymentRejected => "payment rejected",
            OrderStatus::Processing => "being processed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out for delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// `delivered` and `cancelled` admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of the money, tracked separately from [`OrderStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PendingVerification,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PendingVerification => "pending_verification",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(alias = "cod")]
    CashOnDelivery,
    Online,
}

impl PaymentMethod {
    pub const NAMES: [&'static str; 2] = ["cash_on_delivery", "online"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::Online => "online",
        }
    }

    /// Accepts the canonical names plus the legacy `cod` spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cash_on_delivery" | "cod" => Some(PaymentMethod::CashOnDelivery),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product line of an order, with the seller copied in at checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: u32,
    pub unit_price: f64,
}

impl LineItem {
    pub fn subtotal(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Audit entry appended on every status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub status: OrderStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl TrackingEntry {
    pub fn new(
        status: OrderStatus,
        message: impl Into<String>,
        updated_by: Option<Uuid>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            updated_by,
            timestamp,
        }
    }
}

/// A persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub human_order_id: String,
    pub buyer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub shipping_address: String,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utr_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proof_ref: Option<String>,
    pub tracking_history: Vec<TrackingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    fn resource_name() -> &'static str {
        "orders"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Order {
    /// Build the first persisted revision of a draft
    ///
    /// Seeds `trackingHistory[0]` with the initial status and
    /// [`ORDER_CREATED_MESSAGE`]; the version starts at 1.
    pub fn from_draft(draft: OrderDraft, human_order_id: String, now: DateTime<Utc>) -> Self {
        let seed = TrackingEntry::new(
            draft.order_status,
            ORDER_CREATED_MESSAGE,
            Some(draft.buyer_id),
            now,
        );

        Self {
            id: Uuid::new_v4(),
            human_order_id,
            buyer_id: draft.buyer_id,
            line_items: draft.line_items,
            shipping_address: draft.shipping_address,
            total_amount: draft.total_amount,
            payment_method: draft.payment_method,
            order_status: draft.order_status,
            payment_status: draft.payment_status,
            utr_number: None,
            payment_proof_ref: None,
            tracking_history: vec![seed],
            rejected_reason: None,
            rejected_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Distinct sellers on this order, in line-item order
    pub fn seller_ids(&self) -> Vec<Uuid> {
        let mut sellers: Vec<Uuid> = Vec::new();
        for item in &self.line_items {
            if !sellers.contains(&item.seller_id) {
                sellers.push(item.seller_id);
            }
        }
        sellers
    }

    pub fn has_seller(&self, seller_id: &Uuid) -> bool {
        self.line_items.iter().any(|item| &item.seller_id == seller_id)
    }

    /// Both a UTR number and a proof reference are present and non-blank
    pub fn has_payment_evidence(&self) -> bool {
        let present =
            |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.utr_number) && present(&self.payment_proof_ref)
    }
}

// =============================================================================
// Creation input
// =============================================================================

/// Line item as submitted by a client, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    pub product_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub quantity: Option<i64>,
    #[serde(alias = "price")]
    pub unit_price: Option<f64>,
}

/// Order creation request as submitted by a client
///
/// Every field is optional at this stage so missing input is reported as a
/// field-level validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(alias = "userId")]
    pub buyer_id: Option<Uuid>,
    #[serde(alias = "products")]
    pub line_items: Option<Vec<NewLineItem>>,
    pub shipping_address: Option<String>,
    pub total_amount: Option<f64>,
    pub payment_method: Option<String>,
}

impl NewOrder {
    /// Check presence and ranges, producing a typed draft
    ///
    /// The draft starts in `pending`/`pending`; the lifecycle service decides
    /// the real initial state.
    pub fn into_draft(self) -> Result<OrderDraft> {
        let mut errors = FieldErrors::new();

        errors.check("buyerId", validators::required(&self.buyer_id));
        errors.check("shippingAddress", validators::required(&self.shipping_address));
        if let Some(address) = &self.shipping_address {
            errors.check("shippingAddress", validators::non_blank(address));
        }
        errors.check("totalAmount", validators::required(&self.total_amount));
        if let Some(total) = self.total_amount {
            errors.check("totalAmount", validators::non_negative(total));
        }

        let payment_method = match &self.payment_method {
            None => {
                errors.push("paymentMethod", "is required");
                None
            }
            Some(raw) => {
                let parsed = PaymentMethod::parse(raw);
                if parsed.is_none() {
                    errors.check("paymentMethod", validators::one_of(raw, &PaymentMethod::NAMES));
                }
                parsed
            }
        };

        let mut line_items = Vec::new();
        match &self.line_items {
            None => errors.push("lineItems", "is required"),
            Some(items) if items.is_empty() => errors.push("lineItems", "must not be empty"),
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Some(line) = check_line_item(index, item, &mut errors) {
                        line_items.push(line);
                    }
                }
            }
        }

        errors.into_result()?;

        // Every Option below was checked by the collector above.
        let (Some(buyer_id), Some(shipping_address), Some(total_amount), Some(payment_method)) = (
            self.buyer_id,
            self.shipping_address,
            self.total_amount,
            payment_method,
        ) else {
            return Err(crate::core::error::MartError::Internal(
                "order draft validated with missing fields".to_string(),
            ));
        };

        Ok(OrderDraft {
            buyer_id,
            line_items,
            shipping_address: shipping_address.trim().to_string(),
            total_amount,
            payment_method,
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
        })
    }
}

fn check_line_item(index: usize, item: &NewLineItem, errors: &mut FieldErrors) -> Option<LineItem> {
    let field = |name: &str| format!("lineItems[{}].{}", index, name);
    let failures_before = errors.len();

    errors.check(field("productId"), validators::required(&item.product_id));
    errors.check(field("sellerId"), validators::required(&item.seller_id));
    errors.check(field("quantity"), validators::required(&item.quantity));
    if let Some(quantity) = item.quantity {
        errors.check(field("quantity"), validators::at_least(quantity, 1));
    }
    errors.check(field("unitPrice"), validators::required(&item.unit_price));
    if let Some(price) = item.unit_price {
        errors.check(field("unitPrice"), validators::non_negative(price));
    }

    if errors.len() > failures_before {
        return None;
    }

    let quantity = match u32::try_from(item.quantity?) {
        Ok(quantity) => quantity,
        Err(_) => {
            errors.push(field("quantity"), "is too large");
            return None;
        }
    };

    Some(LineItem {
        product_id: item.product_id?,
        seller_id: item.seller_id?,
        quantity,
        unit_price: item.unit_price?,
    })
}

/// Typed, range-checked order content ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub buyer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub shipping_address: String,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl OrderDraft {
    pub fn with_initial_state(
        mut self,
        order_status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Self {
        self.order_status = order_status;
        self.payment_status = payment_status;
        self
    }

    /// `Σ unitPrice × quantity`
    pub fn line_item_total(&self) -> f64 {
        self.line_items.iter().map(LineItem::subtotal).sum()
    }

    /// Schema check run by every store before persisting
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();

        if self.line_items.is_empty() {
            errors.push("lineItems", "must not be empty");
        }
        for (index, item) in self.line_items.iter().enumerate() {
            errors.check(
                format!("lineItems[{}].quantity", index),
                validators::at_least(i64::from(item.quantity), 1),
            );
            errors.check(
                format!("lineItems[{}].unitPrice", index),
                validators::non_negative(item.unit_price),
            );
        }
        errors.check("shippingAddress", validators::non_blank(&self.shipping_address));
        errors.check("totalAmount", validators::non_negative(self.total_amount));

        errors.into_result()
    }
}

// =============================================================================
// Patches
// =============================================================================

/// UTR number and proof reference, always written together
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvidence {
    pub utr_number: String,
    pub payment_proof_ref: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionPatch {
    Set { reason: String, at: DateTime<Utc> },
    Clear,
}

/// Field-level change to an order, guarded by the version it was planned from
///
/// A patch can only append tracking entries. Stores compare
/// `expected_version` with the stored version before calling [`OrderPatch::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPatch {
    pub expected_version: u64,
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_evidence: Option<PaymentEvidence>,
    pub rejection: Option<RejectionPatch>,
    pub append_tracking: Vec<TrackingEntry>,
    pub updated_at: DateTime<Utc>,
}

impl OrderPatch {
    pub fn new(expected_version: u64, updated_at: DateTime<Utc>) -> Self {
        Self {
            expected_version,
            order_status: None,
            payment_status: None,
            payment_evidence: None,
            rejection: None,
            append_tracking: Vec::new(),
            updated_at,
        }
    }

    pub fn order_status(mut self, status: OrderStatus) -> Self {
        self.order_status = Some(status);
        self
    }

    pub fn payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn evidence(mut self, utr_number: String, payment_proof_ref: String) -> Self {
        self.payment_evidence = Some(PaymentEvidence {
            utr_number,
            payment_proof_ref,
        });
        self
    }

    pub fn rejection(mut self, rejection: RejectionPatch) -> Self {
        self.rejection = Some(rejection);
        self
    }

    pub fn track(mut self, entry: TrackingEntry) -> Self {
        self.append_tracking.push(entry);
        self
    }

    /// Apply the patch in place and bump the version
    pub fn apply(&self, order: &mut Order) {
        if let Some(status) = self.order_status {
            order.order_status = status;
        }
        if let Some(status) = self.payment_status {
            order.payment_status = status;
        }
        if let Some(evidence) = &self.payment_evidence {
            order.utr_number = Some(evidence.utr_number.clone());
            order.payment_proof_ref = Some(evidence.payment_proof_ref.clone());
        }
        match &self.rejection {
            Some(RejectionPatch::Set { reason, at }) => {
                order.rejected_reason = Some(reason.clone());
                order.rejected_at = Some(*at);
            }
            Some(RejectionPatch::Clear) => {
                order.rejected_reason = None;
                order.rejected_at = None;
            }
            None => {}
        }
        order
            .tracking_history
            .extend(self.append_tracking.iter().cloned());
        order.version += 1;
        order.updated_at = self.updated_at;
    }
}
