//! # jrmart
//!
//! Order lifecycle and manual UPI payment verification for a multi-vendor
//! marketplace.
//!
//! ## Features
//!
//! - **Order Placement**: direct orders or cart checkout, with COD or online payment
//! - **Human-Readable Codes**: `JR` + `YYMM` + a monthly four-digit sequence
//! - **Manual Payment Verification**: buyers submit a UTR and screenshot, sellers verify or reject
//! - **Append-Only Tracking**: every transition adds one tracking entry
//! - **Optimistic Versioning**: concurrent transitions on one order cannot both win
//! - **Order Events**: changes are broadcast in-process and streamed over SSE
//! - **Pluggable Storage**: in-memory by default, MongoDB behind `mongodb_backend`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jrmart::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MartConfig::load()?;
//!     let backends = StorageBackends::from_config(&config).await?;
//!     let addr = config.server.bind_addr();
//!
//!     ServerBuilder::new()
//!         .with_config(config)
//!         .with_backends(backends)
//!         .serve(&addr)
//!         .await
//! }
//! ```
//!
//! ## State Machine
//!
//! Every status change goes through [`orders::lifecycle::plan`]. Online
//! orders move `pending -> payment_pending -> payment_verified`; a rejected
//! proof lands in `payment_rejected` and may be resubmitted. Cash-on-delivery
//! orders start `confirmed`, or `pending` for the seller to confirm when so
//! configured. Both then ship through `processing`, `shipped`,
//! `out_for_delivery` and `delivered`.

pub mod cart;
pub mod catalog;
pub mod config;
pub mod core;
pub mod orders;
pub mod payments;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy, AuthProvider, HeaderAuthProvider, Role},
        error::{MartError, OrderError, Result},
        events::{EventBus, EventEnvelope, OrderEvent},
        service::{
            CartService, OrderStore, PaymentRecordStore, ProductCatalog, ProofUpload,
            ProofUploader, UserDirectory,
        },
    };

    // === Orders ===
    pub use crate::orders::{
        CheckoutRequest, NewLineItem, NewOrder, Order, OrderLifecycleService, OrderQueryService,
        OrderStatus, PaymentMethod, PaymentStatus, TrackingEntry, VerificationDecision,
    };
    pub use crate::payments::{PaymentRecord, PaymentRecordStatus};

    // === Storage ===
    pub use crate::storage::{
        InMemoryCartService, InMemoryOrderStore, InMemoryPaymentRecordStore,
        InMemoryProductCatalog, InMemoryUserDirectory, LocalDiskUploader, StorageBackends,
    };
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoStores;

    // === Config ===
    pub use crate::config::{MartConfig, OrderConfig, TotalPolicy};

    // === Server ===
    pub use crate::server::{ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
