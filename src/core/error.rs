//! Typed error handling for the marketplace order service
//!
//! Every fallible operation in the crate returns [`MartError`], an enum of
//! category errors. Each category knows its HTTP status and a stable error
//! code so API clients can branch on `code` instead of parsing messages.
//!
//! # Error Categories
//!
//! - [`OrderError`]: missing orders, illegal transitions, version conflicts
//! - [`CatalogError`]: products an order references that the catalog does not know
//! - [`ValidationError`]: malformed or missing input
//! - [`StorageError`]: persistence backend failures
//! - [`RequestError`]: identity and authorization failures at the HTTP edge
//! - [`ConfigError`]: configuration loading and validation
//!
//! # Example
//!
//! ```rust,ignore
//! use jrmart::prelude::*;
//!
//! match lifecycle.cancel(&actor, order_id, None).await {
//!     Ok(order) => println!("cancelled {}", order.human_order_id),
//!     Err(MartError::Order(OrderError::InvalidState { current, .. })) => {
//!         println!("order is already {}", current);
//!     }
//!     Err(e) => eprintln!("other error: {}", e),
//! }
//! ```

use crate::config::ConfigError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Crate-wide result alias
pub type Result<T, E = MartError> = std::result::Result<T, E>;

/// The main error type of the order service
#[derive(Debug)]
pub enum MartError {
    /// Order lookups, transitions and concurrency
    Order(OrderError),

    /// Product and user lookups
    Catalog(CatalogError),

    /// Input validation
    Validation(ValidationError),

    /// Storage backend failures
    Storage(StorageError),

    /// HTTP identity and authorization
    Request(RequestError),

    /// Configuration errors
    Config(ConfigError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for MartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MartError::Order(e) => write!(f, "{}", e),
            MartError::Catalog(e) => write!(f, "{}", e),
            MartError::Validation(e) => write!(f, "{}", e),
            MartError::Storage(e) => write!(f, "{}", e),
            MartError::Request(e) => write!(f, "{}", e),
            MartError::Config(e) => write!(f, "{}", e),
            MartError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MartError::Order(e) => Some(e),
            MartError::Catalog(e) => Some(e),
            MartError::Validation(e) => Some(e),
            MartError::Storage(e) => Some(e),
            MartError::Request(e) => Some(e),
            MartError::Config(e) => Some(e),
            MartError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false`; mirrors the `success` flag of successful responses
    pub success: bool,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl MartError {
    /// Shorthand for a single-field validation failure
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        MartError::Validation(ValidationError::FieldError {
            field: field.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a missing order
    pub fn order_not_found(order_id: Uuid) -> Self {
        MartError::Order(OrderError::NotFound { order_id })
    }

    /// Shorthand for a forbidden action
    pub fn forbidden(message: impl Into<String>) -> Self {
        MartError::Request(RequestError::Forbidden {
            message: message.into(),
        })
    }

    /// Shorthand for a request without a usable identity
    pub fn unauthorized(message: impl Into<String>) -> Self {
        MartError::Request(RequestError::Unauthorized {
            message: message.into(),
        })
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MartError::Order(e) => e.status_code(),
            MartError::Catalog(_) => StatusCode::NOT_FOUND,
            MartError::Validation(_) => StatusCode::BAD_REQUEST,
            MartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MartError::Request(e) => e.status_code(),
            MartError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MartError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            MartError::Order(e) => e.error_code(),
            MartError::Catalog(e) => e.error_code(),
            MartError::Validation(_) => "VALIDATION_ERROR",
            MartError::Storage(_) => "STORAGE_ERROR",
            MartError::Request(e) => e.error_code(),
            MartError::Config(_) => "CONFIG_ERROR",
            MartError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    /// Get additional details for the error
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            MartError::Order(OrderError::NotFound { order_id })
            | MartError::Order(OrderError::PaymentRecordNotFound { order_id }) => {
                Some(serde_json::json!({ "orderId": order_id.to_string() }))
            }
            MartError::Order(OrderError::InvalidState {
                order_id,
                current,
                attempted,
            }) => Some(serde_json::json!({
                "orderId": order_id.to_string(),
                "currentStatus": current,
                "attempted": attempted
            })),
            MartError::Order(OrderError::VersionConflict {
                order_id,
                expected,
                actual,
            }) => Some(serde_json::json!({
                "orderId": order_id.to_string(),
                "expectedVersion": expected,
                "actualVersion": actual
            })),
            MartError::Validation(ValidationError::FieldError { field, message }) => {
                Some(serde_json::json!({ "fields": [{ "field": field, "message": message }] }))
            }
            MartError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for MartError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        } else {
            tracing::debug!(code = self.error_code(), "{}", self);
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Order Errors
// =============================================================================

/// Errors raised by order reads and lifecycle transitions
#[derive(Debug)]
pub enum OrderError {
    /// No order with this id
    NotFound { order_id: Uuid },

    /// No order with this human-readable tracking code
    NotFoundByHumanId { human_order_id: String },

    /// Transition not legal from the current status
    InvalidState {
        order_id: Uuid,
        current: String,
        attempted: String,
    },

    /// A concurrent writer updated the order first
    VersionConflict {
        order_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// The order has no payment record yet
    PaymentRecordNotFound { order_id: Uuid },
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::NotFound { order_id } => {
                write!(f, "Order with id '{}' not found", order_id)
            }
            OrderError::NotFoundByHumanId { human_order_id } => {
                write!(f, "Order '{}' not found", human_order_id)
            }
            OrderError::InvalidState {
                order_id,
                current,
                attempted,
            } => write!(
                f,
                "Cannot {} order '{}' in status '{}'",
                attempted, order_id, current
            ),
            OrderError::VersionConflict {
                order_id,
                expected,
                actual,
            } => write!(
                f,
                "Order '{}' was modified concurrently (expected version {}, found {})",
                order_id, expected, actual
            ),
            OrderError::PaymentRecordNotFound { order_id } => {
                write!(f, "No payment record for order '{}'", order_id)
            }
        }
    }
}

impl std::error::Error for OrderError {}

impl OrderError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrderError::NotFoundByHumanId { .. } => StatusCode::NOT_FOUND,
            OrderError::InvalidState { .. } => StatusCode::BAD_REQUEST,
            OrderError::VersionConflict { .. } => StatusCode::CONFLICT,
            OrderError::PaymentRecordNotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            OrderError::NotFound { .. } => "ORDER_NOT_FOUND",
            OrderError::NotFoundByHumanId { .. } => "ORDER_NOT_FOUND",
            OrderError::InvalidState { .. } => "INVALID_ORDER_STATE",
            OrderError::VersionConflict { .. } => "ORDER_VERSION_CONFLICT",
            OrderError::PaymentRecordNotFound { .. } => "PAYMENT_RECORD_NOT_FOUND",
        }
    }
}

impl From<OrderError> for MartError {
    fn from(err: OrderError) -> Self {
        MartError::Order(err)
    }
}

// =============================================================================
// Catalog Errors
// =============================================================================

/// Errors raised when an order references an unknown product
#[derive(Debug)]
pub enum CatalogError {
    ProductNotFound { product_id: Uuid },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::ProductNotFound { product_id } => {
                write!(f, "Product with id '{}' not found", product_id)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl CatalogError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CatalogError::ProductNotFound { .. } => "PRODUCT_NOT_FOUND",
        }
    }
}

impl From<CatalogError> for MartError {
    fn from(err: CatalogError) -> Self {
        MartError::Catalog(err)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to input validation
#[derive(Debug)]
pub enum ValidationError {
    /// Single field validation error
    FieldError { field: String, message: String },

    /// Multiple field validation errors
    FieldErrors(Vec<FieldValidationError>),

    /// Invalid JSON format
    InvalidJson { message: String },

    /// Invalid UUID format
    InvalidUuid { value: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ValidationError {
    /// Field names mentioned by this error
    pub fn fields(&self) -> Vec<&str> {
        match self {
            ValidationError::FieldError { field, .. } => vec![field.as_str()],
            ValidationError::FieldErrors(errors) => {
                errors.iter().map(|e| e.field.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldError { field, message } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
            ValidationError::InvalidUuid { value } => {
                write!(f, "Invalid UUID format: {}", value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for MartError {
    fn from(err: ValidationError) -> Self {
        MartError::Validation(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// Connection error
    ConnectionError { backend: String, message: String },

    /// Query or write failure
    OperationFailed { message: String },

    /// Stored data could not be decoded
    IntegrityError { message: String },

    /// Backend not compiled in or not reachable
    Unavailable { backend: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionError { backend, message } => {
                write!(f, "Failed to connect to {}: {}", backend, message)
            }
            StorageError::OperationFailed { message } => {
                write!(f, "Storage operation failed: {}", message)
            }
            StorageError::IntegrityError { message } => {
                write!(f, "Data integrity error: {}", message)
            }
            StorageError::Unavailable { backend } => {
                write!(f, "Storage backend '{}' is unavailable", backend)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for MartError {
    fn from(err: StorageError) -> Self {
        MartError::Storage(err)
    }
}

/// Backend internals report failures through `anyhow`; at the store
/// boundary they become storage failures.
impl From<anyhow::Error> for MartError {
    fn from(err: anyhow::Error) -> Self {
        MartError::Storage(StorageError::OperationFailed {
            message: format!("{:#}", err),
        })
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// No usable identity on the request
    Unauthorized { message: String },

    /// Identity present but not allowed to perform the action
    Forbidden { message: String },

    /// Body could not be read (multipart framing, oversized payloads)
    InvalidBody { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
            RequestError::Forbidden { message } => write!(f, "Forbidden: {}", message),
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
        }
    }
}

impl From<RequestError> for MartError {
    fn from(err: RequestError) -> Self {
        MartError::Request(err)
    }
}

// =============================================================================
// Conversions from foreign errors
// =============================================================================

impl From<ConfigError> for MartError {
    fn from(err: ConfigError) -> Self {
        MartError::Config(err)
    }
}

impl From<serde_json::Error> for MartError {
    fn from(err: serde_json::Error) -> Self {
        MartError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<JsonRejection> for MartError {
    fn from(rejection: JsonRejection) -> Self {
        MartError::Validation(ValidationError::InvalidJson {
            message: rejection.body_text(),
        })
    }
}

impl From<axum::extract::multipart::MultipartError> for MartError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        MartError::Request(RequestError::InvalidBody {
            message: err.body_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_not_found_maps_to_404() {
        let err = MartError::order_not_found(Uuid::nil());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "ORDER_NOT_FOUND");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_state_names_current_status() {
        let err: MartError = OrderError::InvalidState {
            order_id: Uuid::nil(),
            current: "delivered".to_string(),
            attempted: "cancel".to_string(),
        }
        .into();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "INVALID_ORDER_STATE");
        assert!(err.to_string().contains("delivered"));

        let response = err.to_response();
        let details = response.details.unwrap();
        assert_eq!(details["currentStatus"], "delivered");
        assert_eq!(details["attempted"], "cancel");
    }

    #[test]
    fn test_version_conflict_is_409() {
        let err: MartError = OrderError::VersionConflict {
            order_id: Uuid::nil(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "ORDER_VERSION_CONFLICT");
    }

    #[test]
    fn test_validation_error_multiple_fields() {
        let err = ValidationError::FieldErrors(vec![
            FieldValidationError::new("buyerId", "is required"),
            FieldValidationError::new("lineItems", "must not be empty"),
        ]);

        assert_eq!(err.fields(), vec!["buyerId", "lineItems"]);
        let display = err.to_string();
        assert!(display.contains("buyerId"));
        assert!(display.contains("lineItems"));
    }

    #[test]
    fn test_error_response_carries_success_false() {
        let err = MartError::field("utrNumber", "is required");
        let response = err.to_response();
        assert!(!response.success);
        assert_eq!(response.code, "VALIDATION_ERROR");
        assert_eq!(response.details.unwrap()["fields"][0]["field"], "utrNumber");
    }

    #[test]
    fn test_request_error_status_codes() {
        assert_eq!(
            MartError::unauthorized("missing").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            MartError::forbidden("not yours").status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_anyhow_becomes_storage_error() {
        let err: MartError = anyhow::anyhow!("Failed to acquire write lock").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_catalog_errors_are_404() {
        let err: MartError = CatalogError::ProductNotFound {
            product_id: Uuid::nil(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "PRODUCT_NOT_FOUND");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: MartError = json_err.into();
        assert!(matches!(
            err,
            MartError::Validation(ValidationError::InvalidJson { .. })
        ));
    }
}
