//! Reusable field validators
//!
//! Each validator checks one value and returns the message to attach to the
//! field on failure. [`super::FieldErrors`] collects the outcomes.

/// Validator: optional value must be present
pub fn required<T>(value: &Option<T>) -> Result<(), String> {
    if value.is_some() {
        Ok(())
    } else {
        Err("is required".to_string())
    }
}

/// Validator: string must contain something other than whitespace
pub fn non_blank(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("must not be blank".to_string())
    } else {
        Ok(())
    }
}

/// Validator: integer must be at least `min`
pub fn at_least(value: i64, min: i64) -> Result<(), String> {
    if value < min {
        Err(format!("must be at least {} (value: {})", min, value))
    } else {
        Ok(())
    }
}

/// Validator: number must be finite and not negative
pub fn non_negative(value: f64) -> Result<(), String> {
    if !value.is_finite() {
        Err("must be a finite number".to_string())
    } else if value < 0.0 {
        Err(format!("must not be negative (value: {})", value))
    } else {
        Ok(())
    }
}

/// Validator: string must be one of the allowed values
pub fn one_of(value: &str, allowed: &[&str]) -> Result<(), String> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "must be one of [{}] (value: '{}')",
            allowed.join(", "),
            value
        ))
    }
}

/// Validator: two amounts agree within `tolerance`
pub fn matches_amount(value: f64, expected: f64, tolerance: f64) -> Result<(), String> {
    if (value - expected).abs() > tolerance {
        Err(format!(
            "does not match the line item total (submitted: {}, computed: {})",
            value, expected
        ))
    } else {
        Ok(())
    }
}
