use std::time::Duration;

use crate::gc::GcId;
use crate::gc::census::timing::{ElapsedTimer, Stopwatch};
use crate::gc::census::{CensusSink, ObjectCounter, PhaseRecord};

/// Collects the counters of all closures of one phase of one cycle and
/// emits a single summary record when closed or dropped.
///
/// Merges are not synchronized: the phase driver owns the container and
/// merges task reports only after the tasks completed.
pub struct AggregationContainer<'s> {
    sink: &'s dyn CensusSink,
    gc_id: GcId,
    phase: String,
    counter: ObjectCounter,
    closure_time: ElapsedTimer,
    stopwatch: Stopwatch,
    contributions: usize,
    closed: bool,
}

impl<'s> AggregationContainer<'s> {
    pub fn open(
        sink: &'s dyn CensusSink,
        gc_id: GcId,
        phase: &str,
        timing: bool,
    ) -> AggregationContainer<'s> {
        AggregationContainer {
            sink,
            gc_id,
            phase: phase.to_string(),
            counter: ObjectCounter::new(),
            closure_time: ElapsedTimer::new(),
            stopwatch: Stopwatch::start(timing),
            contributions: 0,
            closed: false,
        }
    }

    pub fn add_counter(&mut self, counter: &ObjectCounter) {
        debug_assert!(!self.closed);
        self.counter.merge(counter);
        self.contributions += 1;
    }

    /// Merges a counter together with the time its closure spent.
    pub fn add_timed(&mut self, counter: &ObjectCounter, elapsed: Duration) {
        self.add_counter(counter);
        self.closure_time.add(elapsed);
    }

    /// Re-attributes counts that were merged into this container earlier.
    pub fn remove_counter(&mut self, counter: &ObjectCounter) {
        debug_assert!(!self.closed);
        self.counter.unmerge(counter);
    }

    pub fn gc_id(&self) -> GcId {
        self.gc_id
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    pub fn contributions(&self) -> usize {
        self.contributions
    }

    /// Sum of the time reported by the merged closures.
    pub fn closure_time(&self) -> Duration {
        self.closure_time.elapsed()
    }

    pub fn close(mut self) -> PhaseRecord {
        self.emit()
    }

    fn emit(&mut self) -> PhaseRecord {
        debug_assert!(!self.closed);
        self.closed = true;

        let record = PhaseRecord {
            phase: self.phase.clone(),
            gc_id: self.gc_id,
            elapsed_ms: self.stopwatch.elapsed().as_secs_f64() * 1000.0,
            contributions: self.contributions,
            dead: self.counter.dead(),
            live: self.counter.live(),
            total: self.counter.total(),
        };

        self.sink.phase_record(&record);
        record
    }
}

impl<'s> Drop for AggregationContainer<'s> {
    fn drop(&mut self) {
        if !self.closed {
            self.emit();
        }
    }
}
