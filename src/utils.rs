/// Utility functions for data formatting and shared-state access
use std::sync::{Mutex, MutexGuard};

use time::format_description::well_known::Rfc3339;
use time::{format_description, OffsetDateTime};

/// Format a reading timestamp for the wire record
///
/// RFC 3339 keeps the field parseable by loosely-typed downstream
/// consumers. Falls back to the default string representation if
/// formatting fails.
pub fn format_reading_time(dt: &OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]")
    {
        Ok(format) => format,
        Err(_) => return dt.to_string(),
    };
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Render a value as decimal text with two fractional digits (temperature,
/// humidity).
pub fn decimal2(value: f64) -> String {
    format!("{:.2}", value)
}

/// Render a value as decimal text with no fractional digits (10-bit ADC
/// metrics: brightness, loudness).
pub fn decimal0(value: f64) -> String {
    format!("{:.0}", value)
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Periodic tasks catch panics at the task boundary and keep running, so a
/// poisoned lock must not take the shared state down with it.
pub fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
