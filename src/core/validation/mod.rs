//! Input validation helpers
//!
//! Validators in [`validators`] check single values; [`FieldErrors`] gathers
//! their failures so a request reports every bad field at once.

pub mod validators;

use crate::core::error::{FieldValidationError, MartError, ValidationError};

/// Accumulates field-level failures for one input
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldValidationError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a validator against `field`
    pub fn check(&mut self, field: impl Into<String>, outcome: Result<(), String>) {
        if let Err(message) = outcome {
            self.push(field, message);
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldValidationError::new(field, message));
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when nothing failed, otherwise a validation error listing every field
    pub fn into_result(self) -> Result<(), MartError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(MartError::Validation(ValidationError::FieldErrors(
                self.errors,
            )))
        }
    }
}
