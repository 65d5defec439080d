use crate::gc::{K, M};

/// Configuration of the heap and the scavenger.
#[derive(Clone, Debug)]
pub struct GcFlags {
    pub old_size: usize,
    pub eden_size: usize,
    pub survivor_size: usize,

    /// number of GC worker threads, defaults to the number of CPUs
    pub gc_workers: Option<usize>,

    /// survivors that were copied this many times are promoted
    pub tenuring_threshold: u32,

    /// schedule one root task per mutator thread instead of a single task
    /// for the whole thread-roots category
    pub per_thread_root_tasks: bool,

    /// measure elapsed time of census closures and containers
    pub census_timing: bool,

    /// emit one record per root closure in addition to phase records
    pub census_verbose: bool,

    pub count_objects_before_gc: bool,
    pub count_objects_after_gc: bool,

    pub gc_verify: bool,
    pub gc_verbose: bool,
    pub gc_dev_verbose: bool,
}

impl GcFlags {
    pub fn gc_workers(&self) -> usize {
        if let Some(workers) = self.gc_workers {
            assert!(workers > 0, "at least one GC worker required");
            workers
        } else {
            num_cpus::get()
        }
    }

    pub fn old_size(&self) -> usize {
        self.old_size
    }

    pub fn eden_size(&self) -> usize {
        self.eden_size
    }

    pub fn survivor_size(&self) -> usize {
        self.survivor_size
    }

    /// Small heap with a fixed number of workers, used by tests.
    pub fn small(workers: usize) -> GcFlags {
        GcFlags {
            old_size: 512 * K,
            eden_size: 256 * K,
            survivor_size: 128 * K,
            gc_workers: Some(workers),
            gc_verify: true,
            ..GcFlags::default()
        }
    }
}

impl Default for GcFlags {
    fn default() -> GcFlags {
        GcFlags {
            old_size: 64 * M,
            eden_size: 16 * M,
            survivor_size: 2 * M,
            gc_workers: None,
            tenuring_threshold: 7,
            per_thread_root_tasks: true,
            census_timing: true,
            census_verbose: true,
            count_objects_before_gc: false,
            count_objects_after_gc: false,
            gc_verify: false,
            gc_verbose: false,
            gc_dev_verbose: false,
        }
    }
}
