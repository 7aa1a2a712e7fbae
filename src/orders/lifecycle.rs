//! Order state machine
//!
//! [`plan`] checks whether a [`Transition`] is legal for an order and turns it
//! into an [`OrderPatch`]. It performs no I/O, so every guard lives here and
//! can be tested without a store.
//!
//! ```text
//! online:  pending ─▶ payment_pending ─▶ payment_verified ─▶ processing ─▶ shipped
//!                       │      ▲
//!                reject ▼      │ resubmit
//!                   payment_rejected
//!
//! cod:     [pending ─▶] confirmed ─▶ processing ─▶ shipped
//!
//! shipped ─▶ out_for_delivery ─▶ delivered
//! pending | confirmed | payment_pending ─▶ cancelled
//! ```

use crate::core::error::{MartError, OrderError, Result};
use crate::core::validation::FieldErrors;
use crate::core::validation::validators;
use crate::orders::model::{
    Order, OrderPatch, OrderStatus, PaymentMethod, PaymentStatus, RejectionPatch, TrackingEntry,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const PROOF_SUBMITTED_MESSAGE: &str = "Payment proof submitted, waiting for verification";
pub const PAYMENT_VERIFIED_MESSAGE: &str = "Payment verified by seller";

/// A requested change to an order's lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    SubmitPaymentProof {
        utr_number: String,
        payment_proof_ref: String,
    },
    VerifyPayment {
        message: Option<String>,
    },
    RejectPayment {
        reason: String,
    },
    RejectIncompletePayment {
        reason: String,
    },
    AdvanceShipment {
        status: OrderStatus,
        message: Option<String>,
    },
    Cancel {
        reason: Option<String>,
    },
}

impl Transition {
    /// Name used in logs, events and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Transition::SubmitPaymentProof { .. } => "submit_payment_proof",
            Transition::VerifyPayment { .. } => "verify_payment",
            Transition::RejectPayment { .. } => "reject_payment",
            Transition::RejectIncompletePayment { .. } => "reject_incomplete_payment",
            Transition::AdvanceShipment { .. } => "advance_status",
            Transition::Cancel { .. } => "cancel",
        }
    }
}

/// Statuses from which `target` may be reached by a shipment update
///
/// `pending` is only a shipment source for cash-on-delivery orders.
pub fn shipment_sources(target: OrderStatus) -> &'static [OrderStatus] {
    match target {
        OrderStatus::Confirmed => &[OrderStatus::Pending],
        OrderStatus::Processing => &[
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::PaymentVerified,
        ],
        OrderStatus::Shipped => &[
            OrderStatus::PaymentVerified,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
        ],
        OrderStatus::OutForDelivery => &[OrderStatus::Shipped],
        OrderStatus::Delivered => &[OrderStatus::OutForDelivery],
        _ => &[],
    }
}

const PROOF_SOURCES: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::PaymentPending,
    OrderStatus::PaymentRejected,
];

const INCOMPLETE_SOURCES: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::PaymentPending];

const CANCEL_SOURCES: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::PaymentPending,
];

/// Work out the patch that applies `transition` to `order`
///
/// Input problems are reported as validation errors before the state is
/// considered; an illegal edge is reported as `INVALID_ORDER_STATE` naming the
/// current status. The returned patch expects `order.version`.
pub fn plan(
    order: &Order,
    transition: &Transition,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<OrderPatch> {
    let patch = OrderPatch::new(order.version, now);
    let entry =
        |status: OrderStatus, message: String| TrackingEntry::new(status, message, actor, now);

    match transition {
        Transition::SubmitPaymentProof {
            utr_number,
            payment_proof_ref,
        } => {
            let mut errors = FieldErrors::new();
            errors.check("utrNumber", validators::non_blank(utr_number));
            errors.check("paymentProof", validators::non_blank(payment_proof_ref));
            errors.into_result()?;
            accepts_payment_proof(order)?;

            Ok(patch
                .order_status(OrderStatus::PaymentPending)
                .payment_status(PaymentStatus::PendingVerification)
                .evidence(
                    utr_number.trim().to_string(),
                    payment_proof_ref.trim().to_string(),
                )
                .rejection(RejectionPatch::Clear)
                .track(entry(
                    OrderStatus::PaymentPending,
                    PROOF_SUBMITTED_MESSAGE.to_string(),
                )))
        }

        Transition::VerifyPayment { message } => {
            require_not_terminal(order, transition)?;
            if !order.has_payment_evidence() {
                return Err(MartError::field(
                    "paymentProof",
                    "UTR number and payment proof are required before verification",
                ));
            }
            require_source(order, transition, &[OrderStatus::PaymentPending])?;

            Ok(patch
                .order_status(OrderStatus::PaymentVerified)
                .payment_status(PaymentStatus::Completed)
                .track(entry(
                    OrderStatus::PaymentVerified,
                    non_blank_or(message, PAYMENT_VERIFIED_MESSAGE.to_string()),
                )))
        }

        Transition::RejectPayment { reason } => {
            let reason = required_reason(reason)?;
            require_source(order, transition, &[OrderStatus::PaymentPending])?;

            Ok(rejection(patch, reason.clone(), now).track(entry(
                OrderStatus::PaymentRejected,
                format!("Payment rejected: {}", reason),
            )))
        }

        Transition::RejectIncompletePayment { reason } => {
            let reason = required_reason(reason)?;
            require_online(order, transition)?;
            require_source(order, transition, &INCOMPLETE_SOURCES)?;
            if order.has_payment_evidence() {
                return Err(MartError::field(
                    "paymentProof",
                    "payment submission is complete; verify or reject it instead",
                ));
            }

            Ok(rejection(patch, reason.clone(), now).track(entry(
                OrderStatus::PaymentRejected,
                format!("Payment submission incomplete: {}", reason),
            )))
        }

        Transition::AdvanceShipment { status, message } => {
            require_not_terminal(order, transition)?;
            require_source(order, transition, shipment_sources(*status))?;
            if order.order_status == OrderStatus::Pending
                && order.payment_method != PaymentMethod::CashOnDelivery
            {
                return Err(invalid_state(order, transition));
            }

            let mut patch = patch.order_status(*status);
            if *status == OrderStatus::Delivered
                && order.payment_method == PaymentMethod::CashOnDelivery
            {
                patch = patch.payment_status(PaymentStatus::Completed);
            }
            Ok(patch.track(entry(
                *status,
                non_blank_or(message, format!("Order {}", status.label())),
            )))
        }

        Transition::Cancel { reason } => {
            require_source(order, transition, &CANCEL_SOURCES)?;

            let message = match reason.as_deref().map(str::trim) {
                Some(reason) if !reason.is_empty() => format!("Order cancelled: {}", reason),
                _ => "Order cancelled".to_string(),
            };
            Ok(patch
                .order_status(OrderStatus::Cancelled)
                .track(entry(OrderStatus::Cancelled, message)))
        }
    }
}

/// Whether `order` is in a state that takes a payment proof
///
/// Checked before an uploaded screenshot is written anywhere.
pub fn accepts_payment_proof(order: &Order) -> Result<()> {
    let transition = Transition::SubmitPaymentProof {
        utr_number: String::new(),
        payment_proof_ref: String::new(),
    };
    require_online(order, &transition)?;
    require_source(order, &transition, &PROOF_SOURCES)
}

fn rejection(patch: OrderPatch, reason: String, now: DateTime<Utc>) -> OrderPatch {
    patch
        .order_status(OrderStatus::PaymentRejected)
        .payment_status(PaymentStatus::Failed)
        .rejection(RejectionPatch::Set { reason, at: now })
}

fn invalid_state(order: &Order, transition: &Transition) -> MartError {
    OrderError::InvalidState {
        order_id: order.id,
        current: order.order_status.to_string(),
        attempted: transition.name().replace('_', " "),
    }
    .into()
}

fn require_not_terminal(order: &Order, transition: &Transition) -> Result<()> {
    if order.order_status.is_terminal() {
        Err(invalid_state(order, transition))
    } else {
        Ok(())
    }
}

fn require_source(order: &Order, transition: &Transition, allowed: &[OrderStatus]) -> Result<()> {
    if allowed.contains(&order.order_status) {
        Ok(())
    } else {
        Err(invalid_state(order, transition))
    }
}

fn require_online(order: &Order, transition: &Transition) -> Result<()> {
    if order.payment_method == PaymentMethod::Online {
        Ok(())
    } else {
        Err(invalid_state(order, transition))
    }
}

fn required_reason(reason: &str) -> Result<String> {
    validators::non_blank(reason).map_err(|message| MartError::field("reason", message))?;
    Ok(reason.trim().to_string())
}

fn non_blank_or(message: &Option<String>, default: String) -> String {
    match message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => default,
    }
}
