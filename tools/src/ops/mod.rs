//! The diagnostic operation set.
//!
//! Each operation is a read-only query into typed rows plus a pure
//! `summarize` that computes the derived fields from those rows and
//! nothing else. Keeping the derivation off the database guarantees the
//! summary always describes the exact record set handed back to the
//! caller.

pub mod blocking;
pub mod cpu;
pub mod longops;
pub mod monitoring;
pub mod parallel;
pub mod scans;

/// Round to one decimal place, the precision used for reported
/// percentages and utilization figures.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::round1;

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(25.0), 25.0);
        assert_eq!(round1(81.666_666), 81.7);
        assert_eq!(round1(65.04), 65.0);
    }
}
