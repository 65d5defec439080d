use std::cmp::min;
use std::fmt;
use std::time::Duration;

use crate::gc::card::{CardEntry, CardIdx};
use crate::gc::census::closures::{
    Counted, PromoteRootsClosure, ScavengeKlassClosure, ScavengeRootsClosure,
};
use crate::gc::census::{
    CensusSink, ElapsedTimer, ObjectCounter, RootCategory, RootRecord, TimedScope,
};
use crate::gc::heap::Heap;
use crate::gc::object::{is_filler, size_at};
use crate::gc::root::RootSet;
use crate::gc::scavenge::promotion::PromotionManager;
use crate::gc::scavenge::terminator::Terminator;
use crate::gc::{Address, GcId};

/// Cards per stripe slice of the old-to-young scan.
pub const STRIPE_CARDS: usize = 128;

/// Everything a task needs besides its promotion manager. Shared by all
/// workers of one scavenge.
pub struct GcContext<'a> {
    pub heap: &'a Heap,
    pub roots: &'a RootSet,
    pub terminator: &'a Terminator,
    pub sink: &'a dyn CensusSink,
    pub gc_id: GcId,
    pub timing: bool,
    pub verbose: bool,
}

impl<'a> GcContext<'a> {
    fn report(&self, reports: &mut Vec<TaskReport>, report: TaskReport) {
        if self.verbose {
            self.sink.root_record(&report.record(self.gc_id));
        }

        reports.push(report);
    }
}

/// Census of one closure run by a task, merged by the driver once all
/// workers finished.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub source: String,
    pub category: Option<RootCategory>,
    pub counter: ObjectCounter,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn new(
        source: String,
        category: Option<RootCategory>,
        counter: ObjectCounter,
        timer: &ElapsedTimer,
    ) -> TaskReport {
        TaskReport {
            source,
            category,
            counter,
            elapsed: timer.elapsed(),
        }
    }

    pub fn record(&self, gc_id: GcId) -> RootRecord {
        RootRecord::new(
            self.source.clone(),
            self.category,
            gc_id,
            self.elapsed.as_secs_f64() * 1000.0,
            &self.counter,
        )
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GcTask {
    ScavengeRoots(RootCategory),
    ThreadRoots(usize),
    OldToYoungRoots {
        gen_top: Address,
        stripe_number: usize,
        stripe_total: usize,
    },
    Steal,
}

impl fmt::Display for GcTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GcTask::ScavengeRoots(category) => write!(f, "scavenge-roots({})", category),
            GcTask::ThreadRoots(idx) => write!(f, "thread-roots({})", idx),
            GcTask::OldToYoungRoots {
                stripe_number,
                stripe_total,
                ..
            } => write!(f, "old-to-young({}/{})", stripe_number, stripe_total),
            GcTask::Steal => write!(f, "steal"),
        }
    }
}

impl GcTask {
    pub fn do_it(&self, ctx: &GcContext, pm: &mut PromotionManager, reports: &mut Vec<TaskReport>) {
        match *self {
            GcTask::ScavengeRoots(category) => scavenge_roots(ctx, pm, category, reports),
            GcTask::ThreadRoots(idx) => thread_roots(ctx, pm, idx, reports),
            GcTask::OldToYoungRoots {
                gen_top,
                stripe_number,
                stripe_total,
            } => old_to_young_roots(ctx, pm, gen_top, stripe_number, stripe_total, reports),
            GcTask::Steal => steal(ctx, pm),
        }
    }
}

fn scavenge_roots(
    ctx: &GcContext,
    pm: &mut PromotionManager,
    category: RootCategory,
    reports: &mut Vec<TaskReport>,
) {
    let roots = ctx.roots;

    match category {
        RootCategory::GlobalRoots
        | RootCategory::JniHandles
        | RootCategory::MonitorTable
        | RootCategory::ProfilerRoots
        | RootCategory::ClassRegistry
        | RootCategory::ManagementRoots
        | RootCategory::JvmtiRoots => {
            let timer = ElapsedTimer::new();
            let mut closure = ScavengeRootsClosure::new(pm, category);

            {
                let _scope = TimedScope::new(ctx.timing, Some(&timer));
                roots.area(category).oops_do(&mut closure);
            }

            let report = TaskReport::new(
                closure.identifier(),
                Some(category),
                *closure.counter(),
                &timer,
            );
            ctx.report(reports, report);
        }

        RootCategory::ThreadRoots => {
            let timer = ElapsedTimer::new();
            let mut closure = ScavengeRootsClosure::new(pm, category);

            {
                let _scope = TimedScope::new(ctx.timing, Some(&timer));
                roots.threads_oops_do(&mut closure);
            }

            let report = TaskReport::new(
                closure.identifier(),
                Some(category),
                *closure.counter(),
                &timer,
            );
            ctx.report(reports, report);
        }

        RootCategory::ClassLoaderGraph => {
            let timer = ElapsedTimer::new();
            let mut closure = ScavengeRootsClosure::new(pm, category);

            {
                let _scope = TimedScope::new(ctx.timing, Some(&timer));
                roots.class_loader_graph.handles_do(&mut closure);
            }

            let report = TaskReport::new(
                closure.identifier(),
                Some(category),
                *closure.counter(),
                &timer,
            );
            ctx.report(reports, report);

            let timer = ElapsedTimer::new();
            let mut klass_closure = ScavengeKlassClosure::new(pm);

            {
                let _scope = TimedScope::new(ctx.timing, Some(&timer));
                roots
                    .class_loader_graph
                    .classes_do(ctx.heap.classes(), &mut klass_closure);
            }

            let report = TaskReport::new(
                klass_closure.identifier(),
                Some(category),
                *klass_closure.counter(),
                &timer,
            );
            ctx.report(reports, report);
        }

        RootCategory::CompiledCodeRoots => {
            let timer = ElapsedTimer::new();
            let mut closure = PromoteRootsClosure::new(pm, category);

            {
                let _scope = TimedScope::new(ctx.timing, Some(&timer));
                roots.code_roots_do(&mut closure);
            }

            let report = TaskReport::new(
                closure.identifier(),
                Some(category),
                *closure.counter(),
                &timer,
            );
            ctx.report(reports, report);
        }

        RootCategory::ReferenceRoots | RootCategory::StringTable => {
            panic!(
                "GC({}): unknown root category {} for a scavenge roots task",
                ctx.gc_id, category
            );
        }
    }

    // copies made above may have queued their fields
    pm.drain_stacks(false);
}

fn thread_roots(
    ctx: &GcContext,
    pm: &mut PromotionManager,
    idx: usize,
    reports: &mut Vec<TaskReport>,
) {
    let thread = match ctx.roots.threads.get(idx) {
        Some(thread) => thread,
        None => panic!("GC({}): no thread with index {}", ctx.gc_id, idx),
    };

    let timer = ElapsedTimer::new();
    let mut closure = ScavengeRootsClosure::new(pm, RootCategory::ThreadRoots);

    {
        let _scope = TimedScope::new(ctx.timing, Some(&timer));
        thread.oops_do(&mut closure);
    }

    let report = TaskReport::new(
        closure.identifier(),
        Some(RootCategory::ThreadRoots),
        *closure.counter(),
        &timer,
    );
    ctx.report(reports, report);

    pm.drain_stacks(false);
}

fn old_to_young_roots(
    ctx: &GcContext,
    pm: &mut PromotionManager,
    gen_top: Address,
    stripe_number: usize,
    stripe_total: usize,
    reports: &mut Vec<TaskReport>,
) {
    let old = ctx.heap.old();
    assert!(
        !old.is_empty(),
        "GC({}): old-to-young scan of an empty old generation",
        ctx.gc_id
    );
    assert!(
        old.region().start() < gen_top && gen_top <= old.top(),
        "GC({}): scan limit {} outside of old generation {}",
        ctx.gc_id,
        gen_top,
        old.used_region()
    );
    assert!(stripe_number < stripe_total);

    let timer = ElapsedTimer::new();
    let mut counter = ObjectCounter::new();

    {
        let _scope = TimedScope::new(ctx.timing, Some(&timer));
        scavenge_contents_parallel(pm, gen_top, stripe_number, stripe_total, &mut counter);
    }

    let report = TaskReport::new("old_to_young".into(), None, counter, &timer);
    ctx.report(reports, report);

    pm.drain_stacks(false);
}

/// Scans the dirty cards of one stripe below `gen_top`. The old generation
/// is cut into slices of `STRIPE_CARDS` cards, stripe `n` owns every slice
/// `n + k * stripe_total`. Cards that lie completely below `gen_top` are
/// cleaned; the copy barrier dirties them again while a young referent
/// remains.
pub fn scavenge_contents_parallel(
    pm: &mut PromotionManager,
    gen_top: Address,
    stripe_number: usize,
    stripe_total: usize,
    counter: &mut ObjectCounter,
) {
    let heap = pm.heap();
    let card_table = heap.card_table();
    let start_array = heap.start_array();
    let classes = heap.classes();

    let end_card = card_table.card_idx_for_top(gen_top.align_card()).to_usize();
    let slice_width = STRIPE_CARDS * stripe_total;
    let mut slice_start = stripe_number * STRIPE_CARDS;

    while slice_start < end_card {
        let slice_end = min(slice_start + STRIPE_CARDS, end_card);

        for idx in slice_start..slice_end {
            let card = CardIdx::from(idx);

            if card_table.get(card) != CardEntry::Dirty {
                continue;
            }

            let card_region = card_table.card_region(card);
            let scan_end = min(card_region.end(), gen_top);

            if card_region.end() <= gen_top {
                card_table.set(card, CardEntry::Clean);
            }

            let mut obj = start_array.object_start(card_region.start(), classes);

            while obj < scan_end {
                let size = size_at(obj, classes);

                if !is_filler(obj) {
                    obj.to_obj().visit_reference_fields(classes, |slot| {
                        let address = slot.address();

                        if card_region.start() <= address
                            && address < scan_end
                            && pm.claim_or_forward_depth(slot)
                        {
                            counter.classify(true);
                        }
                    });
                }

                obj = obj.offset(size);
            }
        }

        slice_start += slice_width;
    }
}

fn steal(ctx: &GcContext, pm: &mut PromotionManager) {
    pm.drain_stacks(true);
    assert!(
        pm.stacks_empty(),
        "GC({}): worker {} starts stealing with a non-empty queue",
        ctx.gc_id,
        pm.which()
    );

    loop {
        if let Some(slot) = pm.steal_depth() {
            pm.process_popped_location_depth(slot);
            pm.drain_stacks(true);
        } else if ctx.terminator.offer_termination(|| pm.peers_have_work()) {
            break;
        }
    }

    assert!(
        pm.stacks_empty(),
        "GC({}): worker {} terminated with a non-empty queue",
        ctx.gc_id,
        pm.which()
    );
}
