//! Utility functions for the gas-sampler-ble crate.

use std::time::Duration;

/// Format an elapsed operation time as `HH:MM:SS`.
///
/// Sub-second parts are dropped. Hours keep counting past 99 rather than
/// wrapping.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gas_sampler_ble::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
