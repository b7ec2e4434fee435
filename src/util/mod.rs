//! Utility module
//!
//! Helpers shared by the client and router: tracing setup and the unit
//! conversions behind the interval fields of a query.

use std::time::Duration;

/// Installs a `fmt` tracing subscriber at debug level
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .try_init();
}

/// Converts a duration to whole tenths of a second, rounding up
pub fn to_deciseconds(duration: Duration) -> u32 {
    let tenths = (duration.as_millis() + 99) / 100;
    u32::try_from(tenths).unwrap_or(u32::MAX)
}

/// Converts a duration to whole seconds, rounding up
pub fn to_seconds(duration: Duration) -> u32 {
    let secs = duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0));
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deciseconds() {
        assert_eq!(to_deciseconds(Duration::from_secs(10)), 100);
        assert_eq!(to_deciseconds(Duration::from_secs(1)), 10);
        assert_eq!(to_deciseconds(Duration::from_millis(150)), 2);
        assert_eq!(to_deciseconds(Duration::ZERO), 0);
    }

    #[test]
    fn test_seconds() {
        assert_eq!(to_seconds(Duration::from_secs(125)), 125);
        assert_eq!(to_seconds(Duration::from_millis(31_250)), 32);
        assert_eq!(to_seconds(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
