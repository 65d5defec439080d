//! Parallel generational scavenger.
//!
//! The collector copies reachable young objects into a survivor space or
//! promotes them into the old generation, keeps the card table up to date and
//! drains the transitive closure on a pool of work-stealing workers. Every
//! root scan and heap walk is tagged with a census of dead/live/total counts.

pub mod flags;
pub mod gc;
pub mod mem;
pub mod os;
pub mod timer;

pub use crate::flags::GcFlags;
pub use crate::gc::census::{
    AggregationContainer, CensusSink, LogSink, MemorySink, ObjectCounter, PhaseRecord,
    RootCategory, RootRecord,
};
pub use crate::gc::heap::Heap;
pub use crate::gc::root::{RootArea, RootSet, Slot};
pub use crate::gc::scavenge::{ScavengeSummary, Scavenger};
pub use crate::gc::{Address, GcId, Region};
