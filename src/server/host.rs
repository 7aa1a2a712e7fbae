//! Server host holding the assembled services
//!
//! The host is transport-agnostic: it owns the lifecycle and query services
//! plus the collaborators the HTTP layer needs, and the router only borrows
//! from it.

use crate::config::MartConfig;
use crate::core::auth::AuthProvider;
use crate::core::events::EventBus;
use crate::core::service::ProofUploader;
use crate::orders::handlers::OrderApiState;
use crate::orders::query::OrderQueryService;
use crate::orders::service::OrderLifecycleService;
use std::sync::Arc;

pub struct ServerHost {
    /// Effective configuration
    pub config: Arc<MartConfig>,

    /// Sole writer of order state
    pub lifecycle: Arc<OrderLifecycleService>,

    /// Read side, joined with catalog and user data
    pub queries: Arc<OrderQueryService>,

    pub auth: Arc<dyn AuthProvider>,

    pub uploader: Arc<dyn ProofUploader>,

    /// Optional event bus for change notifications (SSE)
    pub event_bus: Option<EventBus>,
}

impl ServerHost {
    /// State handed to the order routes
    pub fn api_state(&self) -> OrderApiState {
        OrderApiState {
            lifecycle: self.lifecycle.clone(),
            queries: self.queries.clone(),
            auth: self.auth.clone(),
            uploader: self.uploader.clone(),
            events: self.event_bus.clone(),
            max_upload_bytes: self.config.uploads.max_bytes,
        }
    }

    /// Get a reference to the event bus (if configured)
    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }
}
