use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const SPIN_ROUNDS: usize = 64;
const YIELD_ROUNDS: usize = 256;

/// Termination detection for the parallel drain. A worker may only offer
/// termination with empty queues; once every worker offered at the same
/// time, termination is final.
pub struct Terminator {
    workers: usize,
    offered: AtomicUsize,
    offers: AtomicUsize,
    retractions: AtomicUsize,
}

impl Terminator {
    pub fn new(workers: usize) -> Terminator {
        assert!(workers > 0);

        Terminator {
            workers,
            offered: AtomicUsize::new(0),
            offers: AtomicUsize::new(0),
            retractions: AtomicUsize::new(0),
        }
    }

    /// Returns `true` when all workers are done. Returns `false` after
    /// retracting the offer because `peers_have_work` reported stealable
    /// work; the caller then resumes stealing.
    pub fn offer_termination<F>(&self, peers_have_work: F) -> bool
    where
        F: Fn() -> bool,
    {
        self.offers.fetch_add(1, Ordering::Relaxed);
        let offered = self.offered.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(offered <= self.workers);

        if offered == self.workers {
            return true;
        }

        let mut rounds = 0;

        loop {
            if self.is_terminated() {
                return true;
            }

            if peers_have_work() && self.retract() {
                return false;
            }

            if rounds < SPIN_ROUNDS {
                hint::spin_loop();
            } else if rounds < SPIN_ROUNDS + YIELD_ROUNDS {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_micros(100));
            }

            rounds += 1;
        }
    }

    /// Withdraws an offer unless termination was reached in the meantime.
    fn retract(&self) -> bool {
        let mut current = self.offered.load(Ordering::SeqCst);

        loop {
            if current == self.workers {
                return false;
            }

            debug_assert!(current > 0);

            match self.offered.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.retractions.fetch_add(1, Ordering::Relaxed);
                    return true;
                }

                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.offered.load(Ordering::SeqCst) == self.workers
    }

    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::Relaxed)
    }

    pub fn retractions(&self) -> usize {
        self.retractions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_single_worker_terminates() {
        let terminator = Terminator::new(1);
        assert!(terminator.offer_termination(|| true));
        assert!(terminator.is_terminated());
        assert_eq!(terminator.retractions(), 0);
    }

    #[test]
    fn test_idle_workers_terminate_without_retraction() {
        let terminator = Terminator::new(4);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert!(terminator.offer_termination(|| false)));
            }
        });

        assert_eq!(terminator.offers(), 4);
        assert_eq!(terminator.retractions(), 0);
    }

    #[test]
    fn test_offer_is_retracted_when_work_appears() {
        let terminator = Terminator::new(2);
        let work = AtomicBool::new(true);

        assert!(!terminator.offer_termination(|| work.load(Ordering::SeqCst)));
        assert_eq!(terminator.retractions(), 1);
        assert!(!terminator.is_terminated());

        work.store(false, Ordering::SeqCst);

        thread::scope(|s| {
            s.spawn(|| assert!(terminator.offer_termination(|| work.load(Ordering::SeqCst))));
            s.spawn(|| assert!(terminator.offer_termination(|| work.load(Ordering::SeqCst))));
        });

        assert!(terminator.is_terminated());
        assert_eq!(terminator.offers(), 3);
    }

    #[test]
    fn test_termination_is_sticky() {
        let terminator = Terminator::new(2);

        thread::scope(|s| {
            s.spawn(|| assert!(terminator.offer_termination(|| false)));
            s.spawn(|| assert!(terminator.offer_termination(|| false)));
        });

        assert!(!terminator.retract());
        assert!(terminator.is_terminated());
    }
}
