//! Standalone payment records kept alongside each online order

pub mod model;

pub use model::{PaymentRecord, PaymentRecordFields, PaymentRecordMethod, PaymentRecordStatus};
