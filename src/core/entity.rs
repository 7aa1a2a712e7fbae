//! Entity trait shared by every persisted document type

use uuid::Uuid;

/// A document stored in its own collection
///
/// Backends name collections after [`Entity::resource_name`] and key
/// documents by [`Entity::id`].
pub trait Entity: Clone + Send + Sync + 'static {
    /// The plural collection name (e.g., "orders", "payments")
    fn resource_name() -> &'static str;

    /// Get the unique identifier for this entity instance
    fn id(&self) -> Uuid;
}
