//! Float sanitization for measurement fields.
//!
//! Applied on both the write path and the read path, so a client never sees
//! a NaN or infinity, whatever some other writer put in the table.

use crate::reading::Measurements;

/// Returns `value` when finite, otherwise `0.0`.
pub fn sanitize_value(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl Measurements {
    /// Replace every non-finite measurement with `0.0`, in place.
    pub fn sanitize(&mut self) {
        for field in self.fields_mut() {
            *field = sanitize_value(*field);
        }
    }

    /// True when every measurement is finite.
    pub fn is_sanitized(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}
