//! In-process change notifications for orders
//!
//! The lifecycle service publishes an [`OrderEvent`] after every successful
//! create or transition. Dashboards can subscribe (the REST layer exposes the
//! bus as Server-Sent Events) instead of polling, but nothing in the order
//! core waits on a subscriber.
//!
//! ```text
//! OrderLifecycleService ──▶ EventBus::publish() ──▶ broadcast channel ──▶ SSE subscribers
//! ```

use crate::orders::model::{Order, OrderStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A change to one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderEvent {
    /// An order was placed
    #[serde(rename_all = "camelCase")]
    Created {
        order_id: Uuid,
        human_order_id: String,
        buyer_id: Uuid,
        seller_ids: Vec<Uuid>,
        order_status: OrderStatus,
        payment_status: PaymentStatus,
    },
    /// A lifecycle transition was applied
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        order_id: Uuid,
        human_order_id: String,
        transition: String,
        from: OrderStatus,
        to: OrderStatus,
        payment_status: PaymentStatus,
        actor: Option<Uuid>,
        tracking_len: usize,
    },
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        OrderEvent::Created {
            order_id: order.id,
            human_order_id: order.human_order_id.clone(),
            buyer_id: order.buyer_id,
            seller_ids: order.seller_ids(),
            order_status: order.order_status,
            payment_status: order.payment_status,
        }
    }

    pub fn status_changed(
        order: &Order,
        transition: &str,
        from: OrderStatus,
        actor: Option<Uuid>,
    ) -> Self {
        OrderEvent::StatusChanged {
            order_id: order.id,
            human_order_id: order.human_order_id.clone(),
            transition: transition.to_string(),
            from,
            to: order.order_status,
            payment_status: order.payment_status,
            actor,
            tracking_len: order.tracking_history.len(),
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Created { order_id, .. } | OrderEvent::StatusChanged { order_id, .. } => {
                *order_id
            }
        }
    }

    /// The action name (created, status_changed)
    pub fn action(&self) -> &'static str {
        match self {
            OrderEvent::Created { .. } => "created",
            OrderEvent::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Envelope wrapping an order event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: OrderEvent,
}

impl EventEnvelope {
    pub fn new(event: OrderEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start losing events (lagged).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails. Returns the number of receivers that will see the event
    /// (zero when nobody is listening).
    pub fn publish(&self, event: OrderEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the current number of active subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
