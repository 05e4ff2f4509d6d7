use std::sync::{Arc, Mutex};

pub use localtime::{LocalDuration, LocalTime};

/// Seconds since epoch.
pub type Timestamp = u64;

/// Monotonic clock shared between the reader thread and the timer thread.
///
/// The teacher's `RefClock` wraps `Rc<RefCell<LocalTime>>` and is advanced
/// once per reactor poll cycle; peer test state here is touched from two
/// real OS threads (the datagram reader and the retransmit timer, base spec
/// §5), so this generalizes the storage to `Arc<Mutex<_>>` and keeps the
/// same "ticked forward by its owner" contract: [`SharedClock::now`] returns
/// whatever was last written by [`SharedClock::tick`], not a fresh read of
/// the system clock, so that a burst of per-message `now()` calls within one
/// loop iteration see a consistent value. Production code must call `tick`
/// periodically for `now()` to track real wall-clock time --
/// [`crate::runtime::Runtime`]'s reader loop does this once per iteration.
///
/// Tests that need to control the passage of time deterministically should
/// use [`TestClock`] instead of calling `tick` themselves.
#[derive(Debug, Clone)]
pub struct SharedClock(Arc<Mutex<LocalTime>>);

impl SharedClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(LocalTime::now())))
    }

    pub fn now(&self) -> LocalTime {
        *self.0.lock().unwrap()
    }

    /// Refresh to the current wall-clock time.
    pub fn tick(&self) {
        *self.0.lock().unwrap() = LocalTime::now();
    }

    fn set(&self, time: LocalTime) {
        *self.0.lock().unwrap() = time;
    }

    pub fn timestamp(&self) -> Timestamp {
        self.now().as_secs()
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A deterministic clock for tests: its value only moves when
/// [`TestClock::advance`] is called, never on its own -- nothing ticks it to
/// real wall-clock time. This lets tests drive the base spec's 5s/10s/30s
/// timeouts (§5) exactly, without sleeping or racing a real clock.
///
/// [`TestClock::shared`] hands out the [`SharedClock`] handle that
/// components actually consult; `TestClock` itself just owns the one knob
/// (`advance`) production code has no business touching.
#[derive(Debug, Clone)]
pub struct TestClock(SharedClock);

impl TestClock {
    pub fn new() -> Self {
        Self(SharedClock::new())
    }

    /// The handle to hand to whatever component is under test.
    pub fn shared(&self) -> SharedClock {
        self.0.clone()
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: LocalDuration) {
        self.0.set(self.0.now() + duration);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a [`LocalDuration`] to [`std::time::Duration`], for handing off
/// to OS-level sleep/timeout primitives (e.g. [`crate::timer::TimerService`]).
pub fn to_std(d: LocalDuration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_time_forward() {
        let clock = TestClock::new();
        let t0 = clock.shared().now();

        clock.advance(LocalDuration::from_secs(5));
        assert!(clock.shared().now() - t0 >= LocalDuration::from_secs(5));
    }

    #[test]
    fn shared_handles_see_the_same_advances() {
        let clock = TestClock::new();
        let handle = clock.shared();

        clock.advance(LocalDuration::from_secs(30));
        assert!(handle.now() - clock.shared().now() < LocalDuration::from_secs(1));
    }

    #[test]
    fn shared_clock_does_not_move_on_its_own() {
        let clock = SharedClock::new();
        let t0 = clock.now();

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(clock.now(), t0, "now() must not drift without an explicit tick()");
    }

    #[test]
    fn tick_refreshes_to_the_current_wall_clock_time() {
        let clock = SharedClock::new();
        let t0 = clock.now();

        std::thread::sleep(std::time::Duration::from_millis(20));
        clock.tick();

        assert!(clock.now() > t0, "tick() must advance now() to the current wall-clock time");
    }
}
