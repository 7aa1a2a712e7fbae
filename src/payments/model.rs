//! Payment record document
//!
//! The order's own `paymentStatus`, `utrNumber` and `paymentProofRef` stay the
//! source of truth. A record is derived from them whenever a verification
//! outcome lands, so it can always be rebuilt with
//! [`PaymentRecordFields::from_order`].

use crate::core::entity::Entity;
use crate::orders::model::{Order, PaymentMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordMethod {
    Upi,
    Card,
    Cod,
}

impl From<PaymentMethod> for PaymentRecordMethod {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Online => PaymentRecordMethod::Upi,
            PaymentMethod::CashOnDelivery => PaymentRecordMethod::Cod,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Pending,
    Completed,
    Failed,
}

/// One payment attempt, 1:1 with its order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: f64,
    pub method: PaymentRecordMethod,
    pub status: PaymentRecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utr_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proof_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for PaymentRecord {
    fn resource_name() -> &'static str {
        "payments"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Mutable content of a record, written by `upsert_for_order`
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecordFields {
    pub amount: f64,
    pub method: PaymentRecordMethod,
    pub status: PaymentRecordStatus,
    pub utr_number: Option<String>,
    pub payment_proof_ref: Option<String>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl PaymentRecordFields {
    /// Snapshot the order's embedded payment fields
    pub fn from_order(order: &Order, status: PaymentRecordStatus) -> Self {
        Self {
            amount: order.total_amount,
            method: order.payment_method.into(),
            status,
            utr_number: order.utr_number.clone(),
            payment_proof_ref: order.payment_proof_ref.clone(),
            verified_by: None,
            verified_at: None,
            remarks: None,
        }
    }

    pub fn verified(mut self, by: Option<Uuid>, at: DateTime<Utc>) -> Self {
        self.verified_by = by;
        self.verified_at = Some(at);
        self
    }

    pub fn remarks(mut self, remarks: Option<String>) -> Self {
        self.remarks = remarks;
        self
    }
}

impl PaymentRecord {
    /// New record for `order_id`
    pub fn create(order_id: Uuid, fields: PaymentRecordFields, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            id: Uuid::new_v4(),
            order_id,
            amount: 0.0,
            method: fields.method,
            status: fields.status,
            utr_number: None,
            payment_proof_ref: None,
            verified_by: None,
            verified_at: None,
            remarks: None,
            created_at: now,
            updated_at: now,
        };
        record.overwrite(fields, now);
        record
    }

    /// Replace every mutable field, keeping id and creation time
    pub fn overwrite(&mut self, fields: PaymentRecordFields, now: DateTime<Utc>) {
        self.amount = fields.amount;
        self.method = fields.method;
        self.status = fields.status;
        self.utr_number = fields.utr_number;
        self.payment_proof_ref = fields.payment_proof_ref;
        self.verified_by = fields.verified_by;
        self.verified_at = fields.verified_at;
        self.remarks = fields.remarks;
        self.updated_at = now;
    }
}
