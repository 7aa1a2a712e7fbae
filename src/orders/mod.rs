//! Orders: the document model, the lifecycle state machine and its HTTP surface
//!
//! ```text
//! handlers ──▶ OrderLifecycleService ──▶ lifecycle::plan ──▶ OrderStore::update
//!          └─▶ OrderQueryService ─────▶ OrderStore / ProductCatalog / UserDirectory
//! ```

pub mod access;
pub mod handlers;
pub mod human_id;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod service;

pub use access::OrderAccess;
pub use handlers::{OrderApiState, order_routes};
pub use human_id::HumanOrderId;
pub use lifecycle::{Transition, plan};
pub use model::{
    LineItem, NewLineItem, NewOrder, Order, OrderDraft, OrderPatch, OrderStatus, PaymentMethod,
    PaymentStatus, TrackingEntry,
};
pub use query::{OrderQueryService, OrderView, TrackingView};
pub use service::{CheckoutRequest, OrderLifecycleService, VerificationDecision};
