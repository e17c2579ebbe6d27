use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time source for the cooldown tracker, swappable in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-key cooldown gate for expensive actions (bulk email sends).
///
/// Keys are user ids; the map stays tiny because only staff accounts
/// ever hit it, so entries are never pruned.
pub struct CooldownTracker<C: Clock = SystemClock> {
    cooldown: Duration,
    last_attempt: Mutex<HashMap<i32, Instant>>,
    clock: C,
}

impl CooldownTracker<SystemClock> {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, SystemClock)
    }
}

impl<C: Clock> CooldownTracker<C> {
    pub fn with_clock(cooldown: Duration, clock: C) -> Self {
        Self {
            cooldown,
            last_attempt: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Record an attempt for `key`. Returns the remaining wait when
    /// the key is still cooling down; successful calls start a new
    /// cooldown window.
    pub fn try_acquire(&self, key: i32) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut last_attempt = self
            .last_attempt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(&last) = last_attempt.get(&key) {
            let elapsed = now.duration_since(last);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }

        last_attempt.insert(key, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that only moves when the test advances it.
    struct ManualClock {
        start: Instant,
        offset_ms: AtomicU64,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset_ms: AtomicU64::new(0),
            }
        }

        fn advance(&self, d: Duration) {
            self.offset_ms
                .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for &'static ManualClock {
        fn now(&self) -> Instant {
            self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    fn leaked_clock() -> &'static ManualClock {
        Box::leak(Box::new(ManualClock::new()))
    }

    #[test]
    fn first_attempt_passes_second_is_blocked() {
        let clock = leaked_clock();
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock);

        assert!(tracker.try_acquire(1).is_ok());
        let remaining = tracker.try_acquire(1).unwrap_err();
        assert_eq!(remaining, Duration::from_secs(60));
    }

    #[test]
    fn cooldown_expires_after_window() {
        let clock = leaked_clock();
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock);

        assert!(tracker.try_acquire(7).is_ok());
        clock.advance(Duration::from_secs(59));
        assert!(tracker.try_acquire(7).is_err());
        clock.advance(Duration::from_secs(1));
        assert!(tracker.try_acquire(7).is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let clock = leaked_clock();
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock);

        assert!(tracker.try_acquire(1).is_ok());
        assert!(tracker.try_acquire(2).is_ok());
        assert!(tracker.try_acquire(1).is_err());
    }

    #[test]
    fn remaining_time_shrinks_as_clock_advances() {
        let clock = leaked_clock();
        let tracker = CooldownTracker::with_clock(Duration::from_secs(60), clock);

        tracker.try_acquire(3).unwrap();
        clock.advance(Duration::from_secs(45));
        let remaining = tracker.try_acquire(3).unwrap_err();
        assert_eq!(remaining, Duration::from_secs(15));
    }
}
