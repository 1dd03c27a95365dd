//! Retry bookkeeping for one recovery handler.

/// Attempt counter plus the read-once "keep trying" signal.
///
/// `should_retry` is the loop predicate. After a completed block it returns
/// `false` exactly once and rearms on that same read, so a handler reused for
/// a new block starts trying again. An exhausted handler keeps returning
/// `false` until it is reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt_count: u32,
    max_attempts: u32,
    still_trying: bool,
    succeeded: bool,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            still_trying: true,
            succeeded: false,
        }
    }

    /// Advance the attempt counter and report whether another cycle should run.
    ///
    /// The counter may reach `max_attempts + 1`: that last cycle is the one
    /// whose failure surfaces to the caller instead of being remediated. The
    /// read that consumes a completed block's stop signal does not count as
    /// an attempt.
    pub fn should_retry(&mut self) -> bool {
        if !self.still_trying {
            self.still_trying = true;
            return false;
        }
        if self.attempt_count > self.max_attempts {
            return false;
        }
        self.attempt_count += 1;
        true
    }

    /// The guarded block completed without an import failure.
    ///
    /// Resets the attempt budget, so a handler reused for later blocks
    /// never runs out of attempts from successes alone.
    pub fn mark_success(&mut self) {
        self.succeeded = true;
        self.still_trying = false;
        self.attempt_count = 0;
    }

    /// The guarded block failed to import something.
    pub fn mark_failure(&mut self) {
        self.succeeded = false;
    }

    /// The guarded block failed for an unrelated reason.
    ///
    /// Leaves the handler looking finished rather than mid-retry.
    pub fn mark_unrelated(&mut self) {
        self.succeeded = true;
        self.still_trying = false;
    }

    /// No remediation budget left for the current attempt.
    pub fn exhausted(&self) -> bool {
        self.attempt_count > self.max_attempts
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Raw flag, without the side effects of `should_retry`.
    pub fn still_trying(&self) -> bool {
        self.still_trying
    }
}
