use crossbeam_deque::Worker;
use parking_lot::Mutex;

use crate::flags::GcFlags;
use crate::gc::census::closures::LiveFilter;
use crate::gc::census::survey::{count_all_objects, count_objects, count_roots};
use crate::gc::census::{AggregationContainer, CensusSink, PhaseRecord, RootCategory};
use crate::gc::heap::Heap;
use crate::gc::root::RootSet;
use crate::gc::verify::{Verifier, VerifyStats};
use crate::gc::{GcId, formatted_size};
use crate::timer::Timer;

use self::promotion::{PromotionManager, PromotionStats};
use self::task_manager::{GcTaskManager, GcTaskQueue};
use self::tasks::{GcContext, GcTask, TaskReport};
use self::terminator::Terminator;

pub mod forward;
pub mod promotion;
pub mod task_manager;
pub mod tasks;
pub mod terminator;
pub mod weak;


pub const YOUNG_GEN_ROOTS: &str = "young_gen_roots";
pub const WEAK_ROOTS: &str = "weak_roots";
pub const BEFORE_SCAVENGE: &str = "before_scavenge";
pub const BEFORE_SCAVENGE_ROOTS: &str = "before_scavenge_roots";
pub const AFTER_SCAVENGE: &str = "after_scavenge";

/// Milliseconds spent in each step of one scavenge. All zero unless
/// `gc_verbose` or `gc_dev_verbose` is set.
#[derive(Copy, Clone, Default, Debug)]
pub struct ScavengePhases {
    pub before: f32,
    pub roots: f32,
    pub weak: f32,
    pub after: f32,
    pub verify: f32,
    pub total: f32,
}

#[derive(Clone, Debug)]
pub struct ScavengeSummary {
    pub gc_id: GcId,
    pub phases: Vec<PhaseRecord>,
    pub stats: PromotionStats,
    pub tasks: usize,
    pub termination_offers: usize,
    pub termination_retractions: usize,

    pub young_before: usize,
    pub survivor_after: usize,
    pub old_before: usize,
    pub old_after: usize,

    pub times: ScavengePhases,
    pub verify: Option<VerifyStats>,
}

impl ScavengeSummary {
    pub fn phase(&self, name: &str) -> Option<&PhaseRecord> {
        self.phases.iter().find(|record| record.phase == name)
    }
}

pub struct Scavenger {
    flags: GcFlags,
    task_manager: Mutex<GcTaskManager>,
    gc_id: Mutex<GcId>,
}

impl Scavenger {
    pub fn new(flags: GcFlags) -> Scavenger {
        let workers = flags.gc_workers();

        Scavenger {
            flags,
            task_manager: Mutex::new(GcTaskManager::new(workers)),
            gc_id: Mutex::new(GcId::default()),
        }
    }

    pub fn flags(&self) -> &GcFlags {
        &self.flags
    }

    pub fn workers(&self) -> usize {
        self.task_manager.lock().workers()
    }

    pub fn last_gc_id(&self) -> GcId {
        *self.gc_id.lock()
    }

    fn next_gc_id(&self) -> GcId {
        let mut gc_id = self.gc_id.lock();
        *gc_id = gc_id.next();
        *gc_id
    }

    /// Collects eden and from-space: copies everything reachable from the
    /// roots and the dirty cards of the old generation into to-space or
    /// the old generation, then swaps the survivor spaces.
    pub fn collect(&self, heap: &Heap, roots: &RootSet, sink: &dyn CensusSink) -> ScavengeSummary {
        // one scavenge at a time
        let mut task_manager = self.task_manager.lock();
        let flags = &self.flags;
        let gc_id = self.next_gc_id();
        let timing = flags.census_timing;
        let verbose = flags.census_verbose;

        let mut times = ScavengePhases::default();
        let mut total_timer = Timer::new(flags.gc_verbose || flags.gc_dev_verbose);
        let mut timer = Timer::new(flags.gc_verbose || flags.gc_dev_verbose);
        let mut phases = Vec::new();

        let young_before = heap.young_used();
        let old_before = heap.old().used_region().size();
        // promotions land above this
        let gen_top = heap.old().top();

        heap.prepare_scavenge();

        if flags.count_objects_before_gc {
            phases.push(count_all_objects(heap, gc_id, BEFORE_SCAVENGE, sink, timing));
            phases.push(count_roots(
                heap,
                roots,
                LiveFilter::All,
                gc_id,
                BEFORE_SCAVENGE_ROOTS,
                sink,
                timing,
                verbose,
            ));
            times.before = timer.stop();
        }

        let workers = task_manager.workers();
        let terminator = Terminator::new(workers);
        let queue = GcTaskQueue::new();

        if !heap.old().is_empty() {
            for stripe_number in 0..workers {
                queue.enqueue(GcTask::OldToYoungRoots {
                    gen_top,
                    stripe_number,
                    stripe_total: workers,
                });
            }
        }

        for category in RootCategory::STRONG_ROOTS {
            if category == RootCategory::ThreadRoots && flags.per_thread_root_tasks {
                for idx in 0..roots.threads.len() {
                    queue.enqueue(GcTask::ThreadRoots(idx));
                }
            } else {
                queue.enqueue(GcTask::ScavengeRoots(category));
            }
        }

        for _ in 0..workers {
            queue.enqueue(GcTask::Steal);
        }

        let tasks = queue.len();

        if flags.gc_dev_verbose {
            let names: Vec<String> = queue.tasks().iter().map(|task| task.to_string()).collect();
            log::debug!("GC({}): scavenge tasks [{}]", gc_id, names.join(", "));
        }

        let mut young_roots = AggregationContainer::open(sink, gc_id, YOUNG_GEN_ROOTS, timing);

        let ctx = GcContext {
            heap,
            roots,
            terminator: &terminator,
            sink,
            gc_id,
            timing,
            verbose,
        };

        let results = task_manager.execute(&queue, &ctx, flags.tenuring_threshold);
        assert!(queue.is_empty(), "GC({}): tasks left after the parallel phase", gc_id);

        let mut stats = PromotionStats::default();

        for result in &results {
            for report in &result.reports {
                young_roots.add_timed(&report.counter, report.elapsed);
            }

            stats += result.stats;
        }

        times.roots = timer.stop();

        let mut pm = PromotionManager::new(
            workers,
            heap,
            Worker::new_lifo(),
            &[],
            flags.tenuring_threshold,
        );
        let keep_alive = weak::keep_alive_references(&mut pm, roots, timing);
        pm.flush();
        stats += pm.stats();

        report(&ctx, &keep_alive);
        young_roots.add_timed(&keep_alive.counter, keep_alive.elapsed);
        phases.push(young_roots.close());

        let mut weak_roots = AggregationContainer::open(sink, gc_id, WEAK_ROOTS, timing);
        let unlinked = weak::unlink_string_table(heap, roots, timing);
        report(&ctx, &unlinked);
        weak_roots.add_timed(&unlinked.counter, unlinked.elapsed);
        phases.push(weak_roots.close());

        times.weak = timer.stop();

        if flags.count_objects_after_gc {
            phases.push(count_objects(
                heap,
                LiveFilter::Survivors,
                gen_top,
                gc_id,
                AFTER_SCAVENGE,
                sink,
                timing,
            ));
            times.after = timer.stop();
        }

        let survivor_after = heap.to_space().used_region().size();
        heap.finish_scavenge();
        let old_after = heap.old().used_region().size();

        let verify = if flags.gc_verify {
            let stats = Verifier::new(heap, roots, gc_id).verify();
            times.verify = timer.stop();
            Some(stats)
        } else {
            None
        };

        times.total = total_timer.stop();

        let summary = ScavengeSummary {
            gc_id,
            phases,
            stats,
            tasks,
            termination_offers: terminator.offers(),
            termination_retractions: terminator.retractions(),
            young_before,
            survivor_after,
            old_before,
            old_after,
            times,
            verify,
        };

        if flags.gc_verbose {
            log::info!(
                "GC({}): scavenge young {}->{} old {}->{} ({:.2} ms)",
                gc_id,
                formatted_size(summary.young_before),
                formatted_size(summary.survivor_after),
                formatted_size(summary.old_before),
                formatted_size(summary.old_after),
                summary.times.total
            );
        }

        if flags.gc_dev_verbose {
            log::debug!(
                "GC({}): copied={} promoted={} lost-races={} steals={} offers={} retractions={}",
                gc_id,
                summary.stats.copied_objects,
                summary.stats.promoted_objects,
                summary.stats.lost_races,
                summary.stats.steals,
                summary.termination_offers,
                summary.termination_retractions
            );
            log::debug!(
                "GC({}): phases before={:.2} roots={:.2} weak={:.2} after={:.2} verify={:.2}",
                gc_id,
                times.before,
                times.roots,
                times.weak,
                times.after,
                times.verify
            );
        }

        summary
    }
}

fn report(ctx: &GcContext, report: &TaskReport) {
    if ctx.verbose {
        ctx.sink.root_record(&report.record(ctx.gc_id));
    }
}
