use std::sync::atomic::{AtomicUsize, Ordering};

use crate::gc::census::closures::{Counted, KlassClosure, OopClosure};
use crate::gc::census::{
    AggregationContainer, CensusSink, ElapsedTimer, ObjectCounter, PhaseRecord, RootCategory,
    RootRecord, TimedScope,
};
use crate::gc::class::Klass;
use crate::gc::heap::Heap;
use crate::gc::root::{RootSet, Slot};
use crate::gc::{Address, GcId, Region};
use crate::mem;

pub const FULL_GC_MARKING: &str = "full_gc_marking";

const BITS_PER_ENTRY: usize = usize::BITS as usize;

/// One mark bit per heap word.
pub struct MarkBitmap {
    covered: Region,
    bits: Box<[AtomicUsize]>,
}

impl MarkBitmap {
    pub fn new(covered: Region) -> MarkBitmap {
        let words = covered.size() / mem::ptr_width_usize();
        let entries = words.div_ceil(BITS_PER_ENTRY);

        MarkBitmap {
            covered,
            bits: (0..entries).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn bit(&self, addr: Address) -> (usize, usize) {
        assert!(
            self.covered.contains(addr),
            "{} outside of mark bitmap {}",
            addr,
            self.covered
        );

        let word = addr.offset_from(self.covered.start()) / mem::ptr_width_usize();
        (word / BITS_PER_ENTRY, 1 << (word % BITS_PER_ENTRY))
    }

    /// Returns `true` when this call set the bit.
    pub fn mark(&self, addr: Address) -> bool {
        let (idx, mask) = self.bit(addr);
        self.bits[idx].fetch_or(mask, Ordering::AcqRel) & mask == 0
    }

    pub fn is_marked(&self, addr: Address) -> bool {
        let (idx, mask) = self.bit(addr);
        self.bits[idx].load(Ordering::Acquire) & mask != 0
    }

    pub fn marked(&self) -> usize {
        self.bits
            .iter()
            .map(|entry| entry.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    pub fn clear(&self) {
        for entry in self.bits.iter() {
            entry.store(0, Ordering::Relaxed);
        }
    }
}

/// Marking stack of one compaction worker.
pub struct ParCompactionManager<'a> {
    heap: &'a Heap,
    bitmap: &'a MarkBitmap,
    stack: Vec<Address>,
}

impl<'a> ParCompactionManager<'a> {
    pub fn new(heap: &'a Heap, bitmap: &'a MarkBitmap) -> ParCompactionManager<'a> {
        ParCompactionManager {
            heap,
            bitmap,
            stack: Vec::new(),
        }
    }

    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    pub fn mark_and_push(&mut self, obj: Address) -> bool {
        if self.bitmap.mark(obj) {
            self.stack.push(obj);
            true
        } else {
            false
        }
    }

    pub fn follow_marking_stack(&mut self) {
        let heap = self.heap;

        while let Some(obj) = self.stack.pop() {
            obj.to_obj().visit_reference_fields(heap.classes(), |slot| {
                let referent = slot.load(heap.oops());

                if referent.is_non_null() {
                    self.mark_and_push(referent);
                }
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Marks the referent of each slot. Every non-null referent counts as live,
/// whether it was marked before or not.
pub struct MarkAndPushClosure<'c, 'a> {
    cm: &'c mut ParCompactionManager<'a>,
    category: RootCategory,
    counter: ObjectCounter,
}

impl<'c, 'a> MarkAndPushClosure<'c, 'a> {
    pub fn new(
        cm: &'c mut ParCompactionManager<'a>,
        category: RootCategory,
    ) -> MarkAndPushClosure<'c, 'a> {
        MarkAndPushClosure {
            cm,
            category,
            counter: ObjectCounter::new(),
        }
    }

    pub fn identifier(&self) -> String {
        self.category.identifier("mark_and_push")
    }
}

impl<'c, 'a> OopClosure for MarkAndPushClosure<'c, 'a> {
    fn do_oop(&mut self, slot: Slot) {
        let heap = self.cm.heap();
        let obj = slot.load(heap.oops());

        if obj.is_null() {
            return;
        }

        assert!(
            heap.is_in_reserved(obj),
            "root {:?} of category {} refers to {} outside of the heap",
            slot,
            self.category,
            obj
        );

        self.cm.mark_and_push(obj);
        self.counter.classify(true);
    }
}

impl<'c, 'a> Counted for MarkAndPushClosure<'c, 'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(self.category)
    }
}

/// Marks everything class metadata refers to. Unlike the scavenge, every
/// class is followed regardless of its modified-oops flag.
pub struct FollowKlassClosure<'c, 'a> {
    mark_and_push: MarkAndPushClosure<'c, 'a>,
    followed: usize,
}

impl<'c, 'a> FollowKlassClosure<'c, 'a> {
    pub fn new(cm: &'c mut ParCompactionManager<'a>) -> FollowKlassClosure<'c, 'a> {
        FollowKlassClosure {
            mark_and_push: MarkAndPushClosure::new(cm, RootCategory::ClassLoaderGraph),
            followed: 0,
        }
    }

    pub fn identifier(&self) -> String {
        RootCategory::ClassLoaderGraph.identifier("follow_klass")
    }

    pub fn followed(&self) -> usize {
        self.followed
    }
}

impl<'c, 'a> KlassClosure for FollowKlassClosure<'c, 'a> {
    fn do_klass(&mut self, klass: &Klass) {
        self.followed += 1;
        klass.oops_do(&mut self.mark_and_push);
    }
}

impl<'c, 'a> Counted for FollowKlassClosure<'c, 'a> {
    fn counter(&self) -> &ObjectCounter {
        self.mark_and_push.counter()
    }

    fn category(&self) -> Option<RootCategory> {
        Some(RootCategory::ClassLoaderGraph)
    }
}

/// Marks everything reachable from the strong roots. Emits one record per
/// root closure when `verbose` and a phase record for the whole marking.
pub fn mark_from_roots(
    heap: &Heap,
    roots: &RootSet,
    bitmap: &MarkBitmap,
    gc_id: GcId,
    sink: &dyn CensusSink,
    timing: bool,
    verbose: bool,
) -> PhaseRecord {
    let mut container = AggregationContainer::open(sink, gc_id, FULL_GC_MARKING, timing);
    let mut cm = ParCompactionManager::new(heap, bitmap);

    for category in RootCategory::STRONG_ROOTS {
        let timer = ElapsedTimer::new();
        let mut closure = MarkAndPushClosure::new(&mut cm, category);

        {
            let _scope = TimedScope::new(timing, Some(&timer));

            if category == RootCategory::ClassLoaderGraph {
                roots.class_loader_graph.handles_do(&mut closure);
            } else {
                roots.oops_do(category, &mut closure);
            }
        }

        report_root(
            sink,
            &mut container,
            closure.identifier(),
            category,
            closure.counter(),
            &timer,
            verbose,
        );

        if category == RootCategory::ClassLoaderGraph {
            let timer = ElapsedTimer::new();
            let mut klass_closure = FollowKlassClosure::new(&mut cm);

            {
                let _scope = TimedScope::new(timing, Some(&timer));
                roots
                    .class_loader_graph
                    .classes_do(heap.classes(), &mut klass_closure);
            }

            report_root(
                sink,
                &mut container,
                klass_closure.identifier(),
                category,
                klass_closure.counter(),
                &timer,
                verbose,
            );
        }

        cm.follow_marking_stack();
    }

    assert!(cm.is_empty());
    container.close()
}

fn report_root(
    sink: &dyn CensusSink,
    container: &mut AggregationContainer,
    source: String,
    category: RootCategory,
    counter: &ObjectCounter,
    timer: &ElapsedTimer,
    verbose: bool,
) {
    if verbose {
        let record = RootRecord::new(
            source,
            Some(category),
            container.gc_id(),
            timer.milliseconds(),
            counter,
        );
        sink.root_record(&record);
    }

    container.add_timed(counter, timer.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::GcFlags;
    use crate::gc::census::MemorySink;
    use crate::gc::class::{ClassKind, FieldEncoding};
    use crate::gc::root::RootArea;

    #[test]
    fn test_bitmap() {
        let bitmap = MarkBitmap::new(Region::new(0x10000.into(), 0x11000.into()));

        assert!(bitmap.mark(0x10008.into()));
        assert!(!bitmap.mark(0x10008.into()));
        assert!(bitmap.is_marked(0x10008.into()));
        assert!(!bitmap.is_marked(0x10010.into()));
        assert_eq!(bitmap.marked(), 1);

        bitmap.clear();
        assert_eq!(bitmap.marked(), 0);
    }

    #[test]
    fn test_mark_from_roots() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let node = heap.register_class("Node", ClassKind::References(FieldEncoding::Wide));
        let holder = heap.register_class_with_statics("Holder", ClassKind::Data, 1);

        let a = heap.allocate(node, 1).expect("eden allocation failed");
        let b = heap.allocate_old(node, 1).expect("old allocation failed");
        let c = heap.allocate(node, 0).expect("eden allocation failed");
        let unreachable = heap.allocate(node, 0).expect("eden allocation failed");
        heap.set_field(a, 0, b);

        let mut roots = RootSet::new();
        roots.set_area(RootCategory::GlobalRoots, RootArea::wide("global", 2));
        roots.global.set(0, a, heap.oops());
        roots.global.set(1, a, heap.oops());
        roots.class_loader_graph.add_loader("boot", 0, vec![holder]);
        heap.set_static(holder, 0, c);

        let bitmap = MarkBitmap::new(heap.reserved());
        let sink = MemorySink::new();
        let record = mark_from_roots(&heap, &roots, &bitmap, GcId::new(5), &sink, true, true);

        assert!(bitmap.is_marked(a));
        assert!(bitmap.is_marked(b));
        assert!(bitmap.is_marked(c));
        assert!(!bitmap.is_marked(unreachable));
        assert_eq!(bitmap.marked(), 3);

        // both global slots count, a marked object is still live
        assert_eq!(record.live, 3);
        assert_eq!(record.dead, 0);
        assert_eq!(record.contributions, RootCategory::STRONG_ROOTS.len() + 1);
        assert_eq!(record.phase, FULL_GC_MARKING);

        let follow = sink
            .root_records()
            .into_iter()
            .find(|r| r.source == "follow_klass::class_loader_graph")
            .expect("missing klass record");
        assert_eq!(follow.live, 1);
    }

    #[test]
    fn test_mark_from_roots_untimed() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let obj = heap.allocate(data, 0).expect("eden allocation failed");

        let mut roots = RootSet::new();
        roots.set_area(RootCategory::JniHandles, RootArea::wide("jni", 1));
        roots.jni_handles.set(0, obj, heap.oops());

        let bitmap = MarkBitmap::new(heap.reserved());
        let sink = MemorySink::new();
        let record = mark_from_roots(&heap, &roots, &bitmap, GcId::new(2), &sink, false, true);

        assert_eq!(record.live, 1);
        assert_eq!(record.elapsed_ms, 0.0);
        assert!(sink.root_records().iter().all(|r| r.elapsed_ms == 0.0));
    }
}
