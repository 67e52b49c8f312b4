//! Absolute read/write deadlines shared between a session's callers.
//!
//! Deadlines can be changed at any time, including while another thread is
//! blocked in a read or write. Blocked calls never wait longer than the wake
//! interval in a single backend call and re-sample their deadline on every
//! wake, so a change is noticed within one interval.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// I/O direction a deadline applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// Observable state of one direction's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineState {
    /// No deadline, operations block until they make progress.
    Unbounded,
    /// Operations give up at the contained instant.
    Armed(Instant),
    /// The deadline has passed; operations fail without waiting.
    Expired,
}

/// Returned by [`DeadlineController::wait_budget`] once the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;

/// Independent deadlines for the read and the write direction.
#[derive(Debug, Default)]
pub struct DeadlineController {
    read: Mutex<Option<Instant>>,
    write: Mutex<Option<Instant>>,
}

impl DeadlineController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, direction: Direction) -> &Mutex<Option<Instant>> {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    /// Set the deadline of both directions. `None` removes it.
    pub fn set(&self, deadline: Option<Instant>) {
        // Both locks are held so nobody observes one direction updated and the
        // other not. Lock order is always read, then write.
        let mut read = self.read.lock();
        let mut write = self.write.lock();
        *read = deadline;
        *write = deadline;
    }

    /// Set the deadline of one direction. `None` removes it.
    pub fn set_for(&self, direction: Direction, deadline: Option<Instant>) {
        *self.slot(direction).lock() = deadline;
    }

    /// The deadline currently armed for `direction`.
    pub fn get(&self, direction: Direction) -> Option<Instant> {
        *self.slot(direction).lock()
    }

    pub fn state(&self, direction: Direction) -> DeadlineState {
        match self.get(direction) {
            None => DeadlineState::Unbounded,
            Some(deadline) if deadline <= Instant::now() => DeadlineState::Expired,
            Some(deadline) => DeadlineState::Armed(deadline),
        }
    }

    /// How long the next backend wait for `direction` may last.
    ///
    /// The result is the time left until the deadline, capped at `slice`.
    /// Unbounded directions get the whole `slice`.
    pub fn wait_budget(&self, direction: Direction, slice: Duration) -> Result<Duration, Expired> {
        match self.get(direction) {
            None => Ok(slice),
            Some(deadline) => {
                let remaining = deadline
                    .checked_duration_since(Instant::now())
                    .filter(|left| !left.is_zero())
                    .ok_or(Expired)?;
                Ok(remaining.min(slice))
            }
        }
    }
}
