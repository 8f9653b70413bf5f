//! ---
//! cds_section: "01-core-services"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Shared primitives and utilities for the driver services."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

static BOOT: Lazy<Instant> = Lazy::new(Instant::now);

/// Capture an instant suitable for deadline comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Convert a duration into microseconds, saturating at `u64::MAX`.
pub fn duration_to_micros(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(1_000_000)
        .saturating_add(u64::from(duration.subsec_micros()))
}

/// Microseconds elapsed on the monotonic clock since the services were first touched.
pub fn monotonic_boottime_us() -> u64 {
    duration_to_micros(BOOT.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_saturate() {
        assert_eq!(duration_to_micros(Duration::from_millis(3)), 3_000);
        assert_eq!(duration_to_micros(Duration::MAX), u64::MAX);
    }

    #[test]
    fn boottime_is_monotonic() {
        let first = monotonic_boottime_us();
        std::thread::sleep(Duration::from_millis(2));
        assert!(monotonic_boottime_us() > first);
    }
}
