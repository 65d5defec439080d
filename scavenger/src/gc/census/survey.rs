use crate::gc::census::closures::{
    Counted, HeapIterationClosure, LiveFilter, ObjectClosure, RootCountingClosure,
};
use crate::gc::census::timing::{ElapsedTimer, TimedScope};
use crate::gc::census::{AggregationContainer, CensusSink, PhaseRecord, RootCategory, RootRecord};
use crate::gc::heap::Heap;
use crate::gc::root::RootSet;
use crate::gc::{Address, GcId};

/// Walks the heap and classifies every object with `filter`. Old objects
/// at or above `old_top` are skipped: during a scavenge those are copies
/// whose young originals are counted through their forwarding state.
/// Emits one phase record.
pub fn count_objects(
    heap: &Heap,
    filter: LiveFilter,
    old_top: Address,
    gc_id: GcId,
    phase: &str,
    sink: &dyn CensusSink,
    timing: bool,
) -> PhaseRecord {
    let mut container = AggregationContainer::open(sink, gc_id, phase, timing);
    let mut closure = HeapIterationClosure::new(heap, filter);
    let timer = ElapsedTimer::new();

    {
        let _scope = TimedScope::new(timing, Some(&timer));
        heap.object_iterate_below(old_top, |obj| closure.do_object(obj));
    }

    container.add_timed(closure.counter(), timer.elapsed());
    container.close()
}

pub fn count_all_objects(
    heap: &Heap,
    gc_id: GcId,
    phase: &str,
    sink: &dyn CensusSink,
    timing: bool,
) -> PhaseRecord {
    let old_top = heap.old().top();
    count_objects(heap, LiveFilter::All, old_top, gc_id, phase, sink, timing)
}

/// Counts the referents of every root category without modifying any slot.
/// The class-loader graph contributes its handles and the metadata of its
/// classes. Emits one root record per category when `verbose`.
#[allow(clippy::too_many_arguments)]
pub fn count_roots(
    heap: &Heap,
    roots: &RootSet,
    filter: LiveFilter,
    gc_id: GcId,
    phase: &str,
    sink: &dyn CensusSink,
    timing: bool,
    verbose: bool,
) -> PhaseRecord {
    let mut container = AggregationContainer::open(sink, gc_id, phase, timing);

    for category in RootCategory::ALL {
        let mut closure = RootCountingClosure::new(heap, filter, category);
        let timer = ElapsedTimer::new();

        {
            let _scope = TimedScope::new(timing, Some(&timer));

            if category == RootCategory::ClassLoaderGraph {
                roots.class_loader_graph.handles_do(&mut closure);
                roots.class_loader_graph.classes_do(heap.classes(), &mut closure);
            } else {
                roots.oops_do(category, &mut closure);
            }
        }

        if verbose {
            let record = RootRecord::new(
                closure.identifier(),
                Some(category),
                gc_id,
                timer.milliseconds(),
                closure.counter(),
            );
            sink.root_record(&record);
        }

        container.add_timed(closure.counter(), timer.elapsed());
    }

    container.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::GcFlags;
    use crate::gc::census::MemorySink;
    use crate::gc::class::ClassKind;
    use crate::gc::root::RootArea;

    #[test]
    fn test_count_all_objects() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);

        for _ in 0..5 {
            heap.allocate(data, 1).expect("eden allocation failed");
        }
        heap.allocate_old(data, 4).expect("old allocation failed");

        let sink = MemorySink::new();
        let record = count_all_objects(&heap, GcId::new(7), "before_scavenge", &sink, true);

        assert_eq!(record.total, 6);
        assert_eq!(record.live, 6);
        assert_eq!(record.contributions, 1);
        assert_eq!(record.gc_id, GcId::new(7));
        assert_eq!(sink.phase("before_scavenge"), Some(record));
    }

    #[test]
    fn test_count_survivors_before_copying() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        heap.allocate(data, 1).expect("eden allocation failed");
        heap.allocate_old(data, 1).expect("old allocation failed");

        let sink = MemorySink::new();
        let record = count_objects(
            &heap,
            LiveFilter::Survivors,
            heap.old().top(),
            GcId::new(1),
            "after_scavenge",
            &sink,
            true,
        );

        assert_eq!((record.dead, record.live, record.total), (1, 1, 2));
    }

    #[test]
    fn test_count_objects_below_old_top() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        heap.allocate_old(data, 1).expect("old allocation failed");
        let old_top = heap.old().top();
        heap.allocate_old(data, 2).expect("old allocation failed");
        heap.allocate(data, 1).expect("eden allocation failed");

        let sink = MemorySink::new();
        let record = count_objects(
            &heap,
            LiveFilter::All,
            old_top,
            GcId::new(3),
            "after_scavenge",
            &sink,
            false,
        );

        assert_eq!((record.dead, record.live, record.total), (0, 2, 2));
        assert_eq!(record.elapsed_ms, 0.0);
    }

    #[test]
    fn test_count_roots() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let holder = heap.register_class_with_statics("Holder", ClassKind::Data, 2);
        let young = heap.allocate(data, 0).expect("eden allocation failed");
        let old = heap.allocate_old(data, 0).expect("old allocation failed");

        let mut roots = RootSet::new();
        roots.set_area(RootCategory::JniHandles, RootArea::wide("jni", 3));
        roots.jni_handles.set(0, young, heap.oops());
        roots.jni_handles.set(2, old, heap.oops());
        roots.class_loader_graph.add_loader("app", 0, vec![holder]);
        heap.set_static(holder, 1, young);

        let sink = MemorySink::new();
        let record = count_roots(
            &heap,
            &roots,
            LiveFilter::Survivors,
            GcId::new(2),
            "before_scavenge_roots",
            &sink,
            true,
            true,
        );

        assert_eq!((record.dead, record.live, record.total), (2, 1, 3));
        assert_eq!(record.contributions, RootCategory::ALL.len());
        assert_eq!(sink.root_records().len(), RootCategory::ALL.len());

        let jni = sink.roots_for(RootCategory::JniHandles);
        assert_eq!(jni.len(), 1);
        assert_eq!(jni[0].source, "count_roots::jni_handles");
        assert_eq!((jni[0].dead, jni[0].live), (1, 1));

        // nothing moved
        assert_eq!(roots.jni_handles.get(0, heap.oops()), young);
    }
}
