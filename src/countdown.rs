//! Per-round choice countdown.
//!
//! Once one player has locked in, the other gets a short countdown before a
//! random choice is made for them. The countdown is purely local: each peer runs
//! its own, nothing about it is written to the shared document. The session loop
//! drives [`Countdown::tick`] once per second while [`Countdown::is_counting`].

use std::fmt;

/// Default countdown length in seconds.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 10;

/// Remaining seconds at or below which ticks are reported as urgent.
pub const URGENT_SECS: u32 = 3;

/// State of the countdown for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    /// Nobody has chosen yet. Shown as "∞".
    Idle,
    /// Counting down; `remaining` whole seconds left.
    Counting { remaining: u32 },
    /// Reached zero. Stays here until [`Countdown::reset`].
    Expired,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting.
    Remaining { seconds: u32, urgent: bool },
    /// Just reached zero; the caller resolves the round.
    Expired,
    /// The countdown was not running.
    Idle,
}

/// Local choice countdown.
#[derive(Debug, Clone)]
pub struct Countdown {
    length: u32,
    state: CountdownState,
}

impl Countdown {
    /// A countdown of `length` seconds (at least one), initially idle.
    pub fn new(length: u32) -> Self {
        Self {
            length: length.max(1),
            state: CountdownState::Idle,
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.state, CountdownState::Counting { .. })
    }

    /// Begin counting from the full length.
    ///
    /// Returns `false` without restarting if the countdown is already counting
    /// or has expired this round; snapshots keep arriving while one player is
    /// locked in and must not push the deadline back.
    pub fn start(&mut self) -> bool {
        match self.state {
            CountdownState::Idle => {
                self.state = CountdownState::Counting {
                    remaining: self.length,
                };
                true
            }
            CountdownState::Counting { .. } | CountdownState::Expired => false,
        }
    }

    /// Cancel and return to idle. Returns whether anything changed.
    pub fn reset(&mut self) -> bool {
        let changed = self.state != CountdownState::Idle;
        self.state = CountdownState::Idle;
        changed
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> Tick {
        match self.state {
            CountdownState::Counting { remaining } => {
                let seconds = remaining.saturating_sub(1);
                if seconds == 0 {
                    self.state = CountdownState::Expired;
                    Tick::Expired
                } else {
                    self.state = CountdownState::Counting { remaining: seconds };
                    Tick::Remaining {
                        seconds,
                        urgent: seconds <= URGENT_SECS,
                    }
                }
            }
            CountdownState::Idle | CountdownState::Expired => Tick::Idle,
        }
    }

    /// Fraction of the countdown already elapsed, `0.0..=1.0`. Drives a progress ring.
    pub fn progress(&self) -> f32 {
        match self.state {
            CountdownState::Idle => 0.0,
            CountdownState::Expired => 1.0,
            CountdownState::Counting { remaining } => {
                (self.length - remaining.min(self.length)) as f32 / self.length as f32
            }
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTDOWN_SECS)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            CountdownState::Idle => f.write_str("∞"),
            CountdownState::Counting { remaining } => write!(f, "{remaining}"),
            CountdownState::Expired => f.write_str("0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_displays_infinity_and_ignores_ticks() {
        let mut countdown = Countdown::default();
        assert_eq!(countdown.to_string(), "∞");
        assert_eq!(countdown.tick(), Tick::Idle);
        assert_eq!(countdown.state(), CountdownState::Idle);
    }

    #[test]
    fn counts_down_to_expiry_in_length_ticks() {
        let mut countdown = Countdown::new(10);
        assert!(countdown.start());
        assert_eq!(countdown.to_string(), "10");

        let mut ticks = Vec::new();
        loop {
            let tick = countdown.tick();
            ticks.push(tick);
            if tick == Tick::Expired {
                break;
            }
        }
        assert_eq!(ticks.len(), 10);
        assert_eq!(
            ticks.first(),
            Some(&Tick::Remaining {
                seconds: 9,
                urgent: false
            })
        );
        assert_eq!(
            ticks.get(6),
            Some(&Tick::Remaining {
                seconds: 3,
                urgent: true
            })
        );
        assert_eq!(countdown.state(), CountdownState::Expired);
        assert_eq!(countdown.to_string(), "0");
        assert!((countdown.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn start_does_not_push_the_deadline_back() {
        let mut countdown = Countdown::new(10);
        countdown.start();
        countdown.tick();
        countdown.tick();
        assert!(!countdown.start());
        assert_eq!(countdown.state(), CountdownState::Counting { remaining: 8 });
        assert!((countdown.progress() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn expired_stays_expired_until_reset() {
        let mut countdown = Countdown::new(1);
        countdown.start();
        assert_eq!(countdown.tick(), Tick::Expired);
        assert!(!countdown.start());
        assert_eq!(countdown.tick(), Tick::Idle);
        assert!(countdown.reset());
        assert!(countdown.start());
    }

    #[test]
    fn reset_cancels_and_reports_change() {
        let mut countdown = Countdown::default();
        assert!(!countdown.reset());
        countdown.start();
        assert!(countdown.reset());
        assert_eq!(countdown.to_string(), "∞");
    }

    #[test]
    fn zero_length_is_clamped() {
        let countdown = Countdown::new(0);
        assert_eq!(countdown.length(), 1);
    }
}
