//! Display-only values that may have been computed from a fallback.
//!
//! Progress stats and representative images are decorative: a store or
//! catalog outage must not fail the surrounding response. [`Derived`] keeps
//! the failure visible to the caller (and to the log) while still carrying a
//! usable value.

use std::fmt::Display;

use crate::error::CoreError;

#[derive(Debug)]
pub enum Derived<T> {
    /// The value was computed normally.
    Ok(T),
    /// Computation failed and `value` is the safe default.
    Degraded { value: T, cause: CoreError },
}

impl<T> Derived<T> {
    /// Wrap `result`, substituting `fallback()` on error.
    ///
    /// The error is logged at construction, so a degraded value is never
    /// silently dropped.
    pub fn from_result(
        operation: &'static str,
        subject: impl Display,
        result: Result<T, CoreError>,
        fallback: impl FnOnce() -> T,
    ) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(cause) => {
                tracing::error!(
                    operation,
                    subject = %subject,
                    error = %cause,
                    "Returning degraded value",
                );
                Self::Degraded {
                    value: fallback(),
                    cause,
                }
            }
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn cause(&self) -> Option<&CoreError> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded { cause, .. } => Some(cause),
        }
    }
}
