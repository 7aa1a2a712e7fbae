//! Core traits and types shared by every part of the order service

pub mod auth;
pub mod entity;
pub mod error;
pub mod events;
pub mod extractors;
pub mod query;
pub mod service;
pub mod validation;

pub use auth::{AuthContext, AuthPolicy, AuthProvider, HeaderAuthProvider, Role};
pub use entity::Entity;
pub use error::{MartError, Result};
pub use events::{EventBus, EventEnvelope, OrderEvent};
pub use extractors::Actor;
pub use query::{ListParams, QueryOptions};
pub use service::{
    CartService, OrderStore, PaymentRecordStore, ProductCatalog, ProofUpload, ProofUploader,
    UserDirectory,
};
