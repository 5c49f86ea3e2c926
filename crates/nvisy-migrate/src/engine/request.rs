use serde::{Deserialize, Serialize};

use crate::source::Direction;

/// What a single engine invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Requested direction.
    pub direction: Direction,
    /// Number of scripts to apply; `0` means all of them.
    ///
    /// A negative count reverses `direction`.
    pub step: i64,
    /// Version to record without running any script.
    pub force_version: Option<u64>,
}

impl RunRequest {
    /// Creates a request for `direction` with the given step count.
    pub const fn new(direction: Direction, step: i64) -> Self {
        Self {
            direction,
            step,
            force_version: None,
        }
    }

    /// Creates an unbounded forward request.
    pub const fn up() -> Self {
        Self::new(Direction::Up, 0)
    }

    /// Creates an unbounded rollback request.
    pub const fn down() -> Self {
        Self::new(Direction::Down, 0)
    }

    /// Sets the step count.
    pub const fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Sets the forced-version override.
    pub const fn with_force_version(mut self, version: Option<u64>) -> Self {
        self.force_version = version;
        self
    }

    /// Returns whether every pending script should be applied.
    #[inline]
    pub const fn is_unbounded(&self) -> bool {
        self.step == 0
    }

    /// Returns the effective signed count: positive moves up, negative
    /// moves down.
    pub const fn signed_steps(&self) -> i64 {
        match self.direction {
            Direction::Up => self.step,
            Direction::Down => self.step.saturating_neg(),
        }
    }
}

impl Default for RunRequest {
    fn default() -> Self {
        Self::up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_step_is_unbounded() {
        assert!(RunRequest::down().is_unbounded());
        assert!(!RunRequest::up().with_step(-1).is_unbounded());
    }

    #[test]
    fn signed_steps_follow_direction() {
        assert_eq!(RunRequest::up().with_step(2).signed_steps(), 2);
        assert_eq!(RunRequest::down().with_step(2).signed_steps(), -2);
        assert_eq!(RunRequest::down().with_step(-1).signed_steps(), 1);
        assert_eq!(RunRequest::down().signed_steps(), 0);
    }

    #[test]
    fn force_zero_is_distinct_from_absent() {
        let request = RunRequest::up().with_force_version(Some(0));
        assert_eq!(request.force_version, Some(0));
        assert_eq!(RunRequest::up().force_version, None);
    }
}
