//! Checkpoint arithmetic.
//!
//! The checkpoint is a single scalar timestamp marking the last successfully
//! reconciled point. It never moves backwards.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Last successfully reconciled server timestamp (milliseconds since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(Timestamp);

impl Checkpoint {
    /// Create a checkpoint at the given timestamp.
    pub fn new(millis: Timestamp) -> Self {
        Self(millis)
    }

    /// First-run starting point: `now` minus a bounded lookback window, so a
    /// client with no persisted checkpoint does not replay unbounded history.
    pub fn starting_point(now: Timestamp, lookback: Timestamp) -> Self {
        Self(now.saturating_sub(lookback))
    }

    /// The checkpoint value in milliseconds since epoch.
    pub fn millis(&self) -> Timestamp {
        self.0
    }

    /// Move the checkpoint forward. A value at or behind the current one is
    /// ignored. Returns `true` if the checkpoint moved.
    pub fn advance(&mut self, millis: Timestamp) -> bool {
        if millis > self.0 {
            self.0 = millis;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_forward() {
        let mut checkpoint = Checkpoint::new(1000);
        assert!(checkpoint.advance(2000));
        assert_eq!(checkpoint.millis(), 2000);
    }

    #[test]
    fn advance_never_decreases() {
        let mut checkpoint = Checkpoint::new(2000);
        assert!(!checkpoint.advance(1500));
        assert!(!checkpoint.advance(2000));
        assert_eq!(checkpoint.millis(), 2000);
    }

    #[test]
    fn starting_point_applies_lookback() {
        let checkpoint = Checkpoint::starting_point(100_000, 30_000);
        assert_eq!(checkpoint.millis(), 70_000);
    }

    #[test]
    fn starting_point_saturates_at_zero() {
        let checkpoint = Checkpoint::starting_point(10, 30_000);
        assert_eq!(checkpoint.millis(), 0);
    }

    #[test]
    fn serializes_as_bare_number() {
        let checkpoint = Checkpoint::new(42);
        assert_eq!(serde_json::to_string(&checkpoint).unwrap(), "42");

        let parsed: Checkpoint = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, checkpoint);
    }
}
