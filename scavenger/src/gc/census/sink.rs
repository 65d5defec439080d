use std::fmt;

use parking_lot::Mutex;

use crate::gc::GcId;
use crate::gc::census::{ObjectCounter, RootCategory};

/// Census of a single root closure.
#[derive(Clone, Debug, PartialEq)]
pub struct RootRecord {
    pub source: String,
    pub category: Option<RootCategory>,
    pub gc_id: GcId,
    pub elapsed_ms: f64,
    pub dead: u64,
    pub live: u64,
    pub total: u64,
}

impl RootRecord {
    pub fn new(
        source: String,
        category: Option<RootCategory>,
        gc_id: GcId,
        elapsed_ms: f64,
        counter: &ObjectCounter,
    ) -> RootRecord {
        RootRecord {
            source,
            category,
            gc_id,
            elapsed_ms,
            dead: counter.dead(),
            live: counter.live(),
            total: counter.total(),
        }
    }

    pub fn counter(&self) -> ObjectCounter {
        ObjectCounter::with_counts(self.dead, self.live)
    }
}

impl fmt::Display for RootRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let category = self.category.map(|c| c.name()).unwrap_or("-");

        write!(
            f,
            "GC({}) {} category={} time={:.3}ms dead={} live={} total={}",
            self.gc_id, self.source, category, self.elapsed_ms, self.dead, self.live, self.total
        )
    }
}

/// Summary of one aggregation container.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseRecord {
    pub phase: String,
    pub gc_id: GcId,
    pub elapsed_ms: f64,
    pub contributions: usize,
    pub dead: u64,
    pub live: u64,
    pub total: u64,
}

impl PhaseRecord {
    pub fn counter(&self) -> ObjectCounter {
        ObjectCounter::with_counts(self.dead, self.live)
    }
}

impl fmt::Display for PhaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GC({}) phase {} time={:.3}ms contributions={} dead={} live={} total={}",
            self.gc_id,
            self.phase,
            self.elapsed_ms,
            self.contributions,
            self.dead,
            self.live,
            self.total
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CensusRecord {
    Root(RootRecord),
    Phase(PhaseRecord),
}

/// Receiver of census records. Called from GC worker threads.
pub trait CensusSink: Sync {
    fn root_record(&self, record: &RootRecord);
    fn phase_record(&self, record: &PhaseRecord);
}

/// Writes every record through the `log` facade.
pub struct LogSink;

impl CensusSink for LogSink {
    fn root_record(&self, record: &RootRecord) {
        log::info!(target: "gc::census", "{}", record);
    }

    fn phase_record(&self, record: &PhaseRecord) {
        log::info!(target: "gc::census", "{}", record);
    }
}

pub struct NullSink;

impl CensusSink for NullSink {
    fn root_record(&self, _record: &RootRecord) {}
    fn phase_record(&self, _record: &PhaseRecord) {}
}

/// Keeps all records in memory in arrival order.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<CensusRecord>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn records(&self) -> Vec<CensusRecord> {
        self.records.lock().clone()
    }

    pub fn root_records(&self) -> Vec<RootRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                CensusRecord::Root(record) => Some(record.clone()),
                CensusRecord::Phase(_) => None,
            })
            .collect()
    }

    pub fn phase_records(&self) -> Vec<PhaseRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                CensusRecord::Phase(record) => Some(record.clone()),
                CensusRecord::Root(_) => None,
            })
            .collect()
    }

    pub fn phase(&self, name: &str) -> Option<PhaseRecord> {
        self.phase_records()
            .into_iter()
            .rev()
            .find(|record| record.phase == name)
    }

    pub fn roots_for(&self, category: RootCategory) -> Vec<RootRecord> {
        self.root_records()
            .into_iter()
            .filter(|record| record.category == Some(category))
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl CensusSink for MemorySink {
    fn root_record(&self, record: &RootRecord) {
        self.records.lock().push(CensusRecord::Root(record.clone()));
    }

    fn phase_record(&self, record: &PhaseRecord) {
        self.records.lock().push(CensusRecord::Phase(record.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        let counter = ObjectCounter::with_counts(1, 2);

        sink.root_record(&RootRecord::new(
            RootCategory::JniHandles.identifier("scavenge_roots"),
            Some(RootCategory::JniHandles),
            GcId::new(3),
            0.5,
            &counter,
        ));

        sink.phase_record(&PhaseRecord {
            phase: "young_gen_roots".into(),
            gc_id: GcId::new(3),
            elapsed_ms: 1.0,
            contributions: 1,
            dead: 1,
            live: 2,
            total: 3,
        });

        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.roots_for(RootCategory::JniHandles)[0].counter(), counter);
        assert_eq!(sink.phase("young_gen_roots").map(|r| r.total), Some(3));
        assert!(sink.phase("weak_roots").is_none());

        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_record_display() {
        let record = RootRecord::new(
            "old_to_young".into(),
            None,
            GcId::new(1),
            0.25,
            &ObjectCounter::new(),
        );

        assert_eq!(
            format!("{}", record),
            "GC(1) old_to_young category=- time=0.250ms dead=0 live=0 total=0"
        );
    }
}
