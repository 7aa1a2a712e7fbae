//! Server module for building the HTTP server
//!
//! [`ServerBuilder`] assembles stores, identity, uploads and the event bus
//! into a [`ServerHost`]; [`router::build_router`] exposes the host over REST.

pub mod builder;
pub mod host;
pub mod router;

pub use builder::ServerBuilder;
pub use host::ServerHost;
