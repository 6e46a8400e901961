//! Access/timelock guard consulted by every administrative setter.

use serde::{Deserialize, Serialize};

/// Predicate gating administrative mutations.
pub trait AccessGuard: Send + Sync {
    /// Whether privileged setters may run at `now` (unix seconds).
    fn is_unlocked(&self, now: u64) -> bool;

    /// Earliest time the guard opens, if it is a deadline.
    fn unlock_at(&self) -> u64 {
        0
    }
}

/// Deadline-based lock: setters are rejected until `unlock_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timelock {
    unlock_at: u64,
}

impl Timelock {
    pub fn new(unlock_at: u64) -> Self {
        Self { unlock_at }
    }

    pub fn unlocked() -> Self {
        Self::default()
    }
}

impl AccessGuard for Timelock {
    fn is_unlocked(&self, now: u64) -> bool {
        now >= self.unlock_at
    }

    fn unlock_at(&self) -> u64 {
        self.unlock_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timelock_opens_at_deadline() {
        let lock = Timelock::new(1_000);
        assert!(!lock.is_unlocked(999));
        assert!(lock.is_unlocked(1_000));
        assert!(lock.is_unlocked(5_000));
        assert_eq!(lock.unlock_at(), 1_000);
    }

    #[test]
    fn default_timelock_is_open() {
        assert!(Timelock::unlocked().is_unlocked(0));
    }
}
