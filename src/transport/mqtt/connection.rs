//! Pure connection state and retry scheduling for the MQTT client
//!
//! This module contains the side-effect-free pieces of the connection
//! lifecycle: the state enum, the backoff schedule, and the client error
//! type. The impure orchestration lives in [`super::client`].

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::transport::TransportError;

/// Backoff applied before the first reconnect attempt after a disconnect.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Lifecycle state of one broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no connect requested yet, or a retry is scheduled.
    Disconnected,
    /// Connect requested, waiting for the broker's acknowledgment.
    Connecting,
    /// Session acknowledged and usable.
    Connected,
    /// Stop requested, teardown in progress.
    Stopping,
    /// Terminal. No further transitions.
    Stopped,
}

/// Reconnect timing. Owned by the single-flight guard: only the thread
/// holding the guard reads or mutates a schedule.
#[derive(Debug)]
pub struct RetrySchedule {
    backoff: Duration,
    next_attempt: Option<Instant>,
}

impl RetrySchedule {
    pub fn new() -> Self {
        Self {
            backoff: INITIAL_BACKOFF,
            next_attempt: None,
        }
    }

    /// Forget any scheduled attempt and drop back to the initial backoff.
    /// Called when a tick observes the connection is up again.
    pub fn reset(&mut self) {
        self.backoff = INITIAL_BACKOFF;
        self.next_attempt = None;
    }

    /// Whether an attempt is due at `now`. An unset deadline arms itself at
    /// `now`, so the first attempt after a disconnect is immediate.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_attempt {
            None => {
                self.next_attempt = Some(now);
                true
            }
            Some(deadline) => now >= deadline,
        }
    }

    /// Record that an attempt was issued at `now`: schedule the next window
    /// and widen the backoff, capped at [`MAX_BACKOFF`].
    pub fn attempt_made(&mut self, now: Instant) {
        self.next_attempt = Some(now + self.backoff);
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by the MQTT client itself.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("connect already requested")]
    AlreadyStarted,
    #[error("client is stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut schedule = RetrySchedule::new();
        let now = Instant::now();

        let mut observed = Vec::new();
        for _ in 0..8 {
            observed.push(schedule.backoff().as_secs());
            schedule.attempt_made(now);
        }
        assert_eq!(observed, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut schedule = RetrySchedule::new();
        let now = Instant::now();
        for _ in 0..5 {
            schedule.attempt_made(now);
        }
        assert_eq!(schedule.backoff(), Duration::from_secs(30));

        schedule.reset();
        assert_eq!(schedule.backoff(), INITIAL_BACKOFF);
        assert_eq!(schedule.next_attempt(), None);
    }

    #[test]
    fn test_first_attempt_is_immediate() {
        let mut schedule = RetrySchedule::new();
        let now = Instant::now();

        // No deadline yet: arming makes the attempt due right away.
        assert!(schedule.due(now));
        schedule.attempt_made(now);

        // Within the window nothing is due.
        assert!(!schedule.due(now));
        assert!(!schedule.due(now + Duration::from_millis(900)));

        // Past the deadline the next attempt is due.
        assert!(schedule.due(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_deadline_advances_by_current_backoff() {
        let mut schedule = RetrySchedule::new();
        let now = Instant::now();
        assert!(schedule.due(now));

        schedule.attempt_made(now);
        assert_eq!(schedule.next_attempt(), Some(now + Duration::from_secs(1)));

        // Second attempt schedules two seconds out.
        let later = now + Duration::from_secs(1);
        assert!(schedule.due(later));
        schedule.attempt_made(later);
        assert_eq!(
            schedule.next_attempt(),
            Some(later + Duration::from_secs(2))
        );
    }

    proptest! {
        #[test]
        fn backoff_stays_within_bounds(attempts in 0usize..200) {
            let mut schedule = RetrySchedule::new();
            let now = Instant::now();
            for _ in 0..attempts {
                schedule.attempt_made(now);
                prop_assert!(schedule.backoff() >= INITIAL_BACKOFF);
                prop_assert!(schedule.backoff() <= MAX_BACKOFF);
            }
        }
    }
}
