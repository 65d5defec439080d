use std::cell::Cell;
use std::time::{Duration, Instant};

/// Accumulated elapsed time. Shared borrows may add to it so a scope can
/// commit into a timer owned by the closure it measures.
#[derive(Debug, Default)]
pub struct ElapsedTimer {
    elapsed: Cell<Duration>,
}

impl ElapsedTimer {
    pub fn new() -> ElapsedTimer {
        ElapsedTimer::default()
    }

    pub fn add(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    pub fn merge(&self, other: &ElapsedTimer) {
        self.add(other.elapsed());
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.get().as_secs_f64()
    }

    pub fn milliseconds(&self) -> f64 {
        self.elapsed.get().as_secs_f64() * 1000.0
    }
}

/// Commits the time between construction and drop into an accumulator,
/// exactly once. An inactive scope never reads the clock.
pub struct TimedScope<'a> {
    start: Option<Instant>,
    accumulator: Option<&'a ElapsedTimer>,
}

impl<'a> TimedScope<'a> {
    pub fn new(active: bool, accumulator: Option<&'a ElapsedTimer>) -> TimedScope<'a> {
        let start = if active { Some(Instant::now()) } else { None };

        TimedScope { start, accumulator }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.start {
            Some(start) => start.elapsed(),
            None => Duration::ZERO,
        }
    }
}

impl<'a> Drop for TimedScope<'a> {
    fn drop(&mut self) {
        if let (Some(start), Some(accumulator)) = (self.start.take(), self.accumulator) {
            accumulator.add(start.elapsed());
        }
    }
}

/// Running wall clock of a phase, started on construction when active.
pub struct Stopwatch {
    start: Option<Instant>,
}

impl Stopwatch {
    pub fn start(active: bool) -> Stopwatch {
        Stopwatch {
            start: if active { Some(Instant::now()) } else { None },
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.map(|start| start.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_commits_once() {
        let timer = ElapsedTimer::new();

        {
            let _scope = TimedScope::new(true, Some(&timer));
            std::thread::sleep(Duration::from_millis(2));
        }

        let first = timer.elapsed();
        assert!(first >= Duration::from_millis(2));

        {
            let _scope = TimedScope::new(true, Some(&timer));
        }

        assert!(timer.elapsed() >= first);
        assert!(timer.milliseconds() >= 2.0);
    }

    #[test]
    fn test_inactive_scope() {
        let timer = ElapsedTimer::new();

        {
            let scope = TimedScope::new(false, Some(&timer));
            assert!(!scope.is_active());
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert_eq!(Stopwatch::start(false).elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_merge_timers() {
        let a = ElapsedTimer::new();
        let b = ElapsedTimer::new();
        a.add(Duration::from_millis(3));
        b.add(Duration::from_millis(4));
        a.merge(&b);
        assert_eq!(a.elapsed(), Duration::from_millis(7));
        assert!((a.seconds() - 0.007).abs() < 1e-9);
    }
}
