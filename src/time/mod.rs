//! Timer facility for the protocol state machines
//!
//! The state machines are driven with explicit time: every operation takes
//! the current [`Instant`] and timers are plain deadline values stored next
//! to the state they act on. [`crate::network::run`] turns this into real
//! time by sleeping until the earliest deadline.

mod timer;

pub use self::timer::Timer;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

/// Source of the uniformly random delays used to spread responses
#[derive(Debug, Clone)]
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    /// Creates a jitter source, seeded from entropy when `seed` is `None`
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Jitter { rng }
    }

    /// Restarts the sequence from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Uniform delay in `[0, max]` at millisecond granularity
    pub fn uniform(&mut self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.rng.gen_range(0..=max_ms))
    }
}

/// Picks the earliest due event; ties go to the first candidate
pub(crate) fn earliest<E>(
    candidates: impl Iterator<Item = (Instant, E)>,
) -> Option<(Instant, E)> {
    candidates.min_by_key(|(deadline, _)| *deadline)
}

/// Collects every event due at or before `now`, earliest first
///
/// Events sharing a deadline keep their candidate order.
pub(crate) fn due<E>(
    candidates: impl Iterator<Item = (Instant, E)>,
    now: Instant,
) -> Vec<(Instant, E)> {
    let mut due: Vec<_> = candidates.filter(|(deadline, _)| *deadline <= now).collect();
    due.sort_by_key(|(deadline, _)| *deadline);
    due
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_bounds() {
        let mut jitter = Jitter::new(Some(7));
        let max = Duration::from_millis(250);
        for _ in 0..1000 {
            assert!(jitter.uniform(max) <= max);
        }
        assert_eq!(jitter.uniform(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_reseed_is_deterministic() {
        let mut a = Jitter::new(Some(42));
        let mut b = Jitter::new(None);
        b.reseed(42);
        let max = Duration::from_secs(10);
        let first: Vec<_> = (0..16).map(|_| a.uniform(max)).collect();
        let second: Vec<_> = (0..16).map(|_| b.uniform(max)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_earliest_prefers_first_on_tie() {
        let now = Instant::now();
        let later = now + Duration::from_secs(1);
        let events = vec![(later, "c"), (now, "a"), (now, "b")];
        assert_eq!(earliest(events.into_iter()), Some((now, "a")));
        assert_eq!(earliest(Vec::<(Instant, u8)>::new().into_iter()), None);
    }

    #[test]
    fn test_due_sorted_and_stable() {
        let second = Duration::from_secs(1);
        let start = Instant::now();
        let now = start + second;
        let events = vec![
            (now, "b"),
            (now + second * 3, "late"),
            (start, "a"),
            (now, "c"),
        ];
        let fired: Vec<_> = due(events.into_iter(), now)
            .into_iter()
            .map(|(_, event)| event)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
    }
}
