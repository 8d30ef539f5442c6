//! Field validation for request bodies.
//!
//! Errors accumulate across all fields rather than short-circuiting, so a
//! client sees every problem with its request at once. Messages are plain
//! sentences keyed by field name:
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "message": "The capacity must be at least 1.",
//!   "errors": { "capacity": ["The capacity must be at least 1."] }
//! }
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut errors = FieldErrors::new();
//! let name = errors.required_str("stop_name", req.stop_name);
//! if let Some(name) = &name {
//!     errors.max_len("stop_name", name, 100);
//! }
//! errors.into_result()?;
//! ```

use crate::error::{AppError, FieldErrorMap};
use std::str::FromStr;

/// Human label for a field: underscores become spaces.
#[must_use]
pub fn label(field: &str) -> String {
    field.replace('_', " ")
}

/// Accumulator for per-field validation messages.
#[derive(Debug, Default, Clone)]
pub struct FieldErrors {
    errors: FieldErrorMap,
}

impl FieldErrors {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Whether a field already has at least one message.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Whether no messages were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Finish validation.
    ///
    /// # Errors
    ///
    /// Returns a 422 [`AppError`] carrying every recorded message.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::with_field_errors(self.errors))
        }
    }

    /// Require a value to be present.
    pub fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, format!("The {} field is required.", label(field)));
        }
        value
    }

    /// Require a non-blank string. The returned value is trimmed.
    pub fn required_str(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                self.add(field, format!("The {} field is required.", label(field)));
                None
            }
        }
    }

    /// Trim an optional string, mapping blank to `None`.
    #[must_use]
    pub fn optional_str(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Maximum length in characters.
    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> bool {
        let ok = value.chars().count() <= max;
        if !ok {
            self.add(
                field,
                format!(
                    "The {} may not be greater than {max} characters.",
                    label(field)
                ),
            );
        }
        ok
    }

    /// Minimum length in characters.
    pub fn min_len(&mut self, field: &str, value: &str, min: usize) -> bool {
        let ok = value.chars().count() >= min;
        if !ok {
            self.add(
                field,
                format!("The {} must be at least {min} characters.", label(field)),
            );
        }
        ok
    }

    /// Loose email shape check: one `@`, non-empty local part, dotted domain.
    pub fn email(&mut self, field: &str, value: &str) -> bool {
        let ok = is_email(value);
        if !ok {
            self.add(
                field,
                format!("The {} must be a valid email address.", label(field)),
            );
        }
        ok
    }

    /// Minimum integer value.
    pub fn min_int(&mut self, field: &str, value: i64, min: i64) -> bool {
        let ok = value >= min;
        if !ok {
            self.add(field, format!("The {} must be at least {min}.", label(field)));
        }
        ok
    }

    /// Minimum numeric value.
    pub fn min_number(&mut self, field: &str, value: f64, min: f64) -> bool {
        let ok = value.is_finite() && value >= min;
        if !ok {
            self.add(field, format!("The {} must be at least {min}.", label(field)));
        }
        ok
    }

    /// Parse a value that must be one of a fixed set.
    pub fn one_of<T: FromStr>(&mut self, field: &str, value: &str) -> Option<T> {
        let parsed = value.parse::<T>().ok();
        if parsed.is_none() {
            self.invalid_selection(field);
        }
        parsed
    }

    /// Require `value` to equal its `<field>_confirmation` companion.
    pub fn confirmed(&mut self, field: &str, value: &str, confirmation: Option<&str>) -> bool {
        let ok = confirmation == Some(value);
        if !ok {
            self.add(
                field,
                format!("The {} confirmation does not match.", label(field)),
            );
        }
        ok
    }

    /// Record a uniqueness violation.
    pub fn taken(&mut self, field: &str) {
        self.add(field, format!("The {} has already been taken.", label(field)));
    }

    /// Record a reference to a missing row or an unknown choice.
    pub fn invalid_selection(&mut self, field: &str) {
        self.add(field, format!("The selected {} is invalid.", label(field)));
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
