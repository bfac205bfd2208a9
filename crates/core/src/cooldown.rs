//! Rate limiting for the emergency power-off action.
//!
//! Pure logic: the caller supplies "now" so the gate can be driven by
//! synthetic instants in tests. The time base is monotonic; a wall-clock
//! step cannot shorten or extend the lockout.

use std::time::{Duration, Instant};

/// Default minimum interval between two power-off attempts.
pub const DEFAULT_SHUTDOWN_COOLDOWN: Duration = Duration::from_secs(300); // 5 minutes

/// Refusal returned while the previous attempt is inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Shutdown aborted: too soon after last attempt ({elapsed:?} ago, {remaining:?} remaining)")]
pub struct TooSoon {
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Holds the time of the last power-off attempt.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Duration,
    last_attempt: Option<Instant>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_COOLDOWN)
    }
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Claim the right to attempt a shutdown at `now`.
    ///
    /// On success `now` is recorded as the last attempt before returning,
    /// so a hang or crash in the action itself cannot allow a second
    /// attempt inside the window.
    pub fn try_begin(&mut self, now: Instant) -> Result<(), TooSoon> {
        if let Some(last) = self.last_attempt {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                return Err(TooSoon {
                    elapsed,
                    remaining: self.window - elapsed,
                });
            }
        }
        self.last_attempt = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn first_attempt_is_allowed() {
        let mut gate = CooldownGate::new(WINDOW);
        let t0 = Instant::now();
        assert!(gate.try_begin(t0).is_ok());
        assert_eq!(gate.last_attempt(), Some(t0));
    }

    #[test]
    fn second_attempt_inside_window_is_refused() {
        let mut gate = CooldownGate::new(WINDOW);
        let t0 = Instant::now();
        gate.try_begin(t0).expect("first attempt");

        let refused = gate.try_begin(t0 + Duration::from_secs(60));
        assert_matches!(refused, Err(TooSoon { elapsed, remaining }) => {
            assert_eq!(elapsed, Duration::from_secs(60));
            assert_eq!(remaining, Duration::from_secs(240));
        });
        // The refusal does not move the window.
        assert_eq!(gate.last_attempt(), Some(t0));
    }

    #[test]
    fn attempt_at_window_boundary_is_allowed() {
        let mut gate = CooldownGate::new(WINDOW);
        let t0 = Instant::now();
        gate.try_begin(t0).expect("first attempt");
        assert!(gate.try_begin(t0 + WINDOW).is_ok());
        assert_eq!(gate.last_attempt(), Some(t0 + WINDOW));
    }

    #[test]
    fn at_most_one_attempt_per_window() {
        let mut gate = CooldownGate::new(WINDOW);
        let t0 = Instant::now();
        // An emergency every 30 seconds for 20 minutes.
        let allowed: Vec<u64> = (0..40)
            .map(|i| i * 30)
            .filter(|&secs| gate.try_begin(t0 + Duration::from_secs(secs)).is_ok())
            .collect();
        assert_eq!(allowed, vec![0, 300, 600, 900]);
    }

    #[test]
    fn earlier_instant_is_treated_as_too_soon() {
        let mut gate = CooldownGate::new(WINDOW);
        let t0 = Instant::now() + Duration::from_secs(10);
        gate.try_begin(t0).expect("first attempt");
        assert!(gate.try_begin(t0 - Duration::from_secs(5)).is_err());
    }

    #[test]
    fn default_window_is_five_minutes() {
        assert_eq!(CooldownGate::default().window(), Duration::from_secs(300));
    }
}
