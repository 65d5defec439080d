use fixedbitset::FixedBitSet;

use crate::gc::census::closures::OopClosure;
use crate::gc::heap::Heap;
use crate::gc::object::MarkWordKind;
use crate::gc::root::{RootSet, Slot};
use crate::gc::{Address, GcId, Region};
use crate::mem;

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct VerifyStats {
    pub objects: usize,
    pub reachable: usize,
    pub old_to_young: usize,
}

/// Checks the heap right after a scavenge: eden and to-space are empty,
/// every reference points at an object in the old generation or in
/// from-space, and every old-to-young reference sits on a dirty card.
pub struct Verifier<'a> {
    heap: &'a Heap,
    roots: &'a RootSet,
    gc_id: GcId,

    old_used: Region,
    survivor_used: Region,
    visited: FixedBitSet,
    stats: VerifyStats,
}

impl<'a> Verifier<'a> {
    pub fn new(heap: &'a Heap, roots: &'a RootSet, gc_id: GcId) -> Verifier<'a> {
        let words = heap.reserved().size() / mem::ptr_width_usize();

        Verifier {
            heap,
            roots,
            gc_id,
            old_used: heap.old().used_region(),
            survivor_used: heap.from_space().used_region(),
            visited: FixedBitSet::with_capacity(words),
            stats: VerifyStats::default(),
        }
    }

    pub fn verify(mut self) -> VerifyStats {
        assert!(self.heap.eden().is_empty(), "GC({}): eden not empty", self.gc_id);
        assert!(self.heap.to_space().is_empty(), "GC({}): to-space not empty", self.gc_id);

        self.verify_objects(self.old_used);
        self.verify_objects(self.survivor_used);
        self.verify_reachability();

        self.stats
    }

    fn verify_objects(&mut self, region: Region) {
        let heap = self.heap;
        let mut objects = Vec::new();
        heap.walk(region, &mut |obj| objects.push(obj));

        let mut old_to_young = 0;

        for obj in objects {
            self.stats.objects += 1;
            self.verify_header(obj);

            obj.to_obj().visit_reference_fields(heap.classes(), |slot| {
                let referent = slot.load(heap.oops());

                if referent.is_null() {
                    return;
                }

                self.verify_reference(slot, referent);

                if heap.is_in_old(slot.address()) && heap.is_in_young(referent) {
                    assert!(
                        heap.card_table().is_dirty(slot.address()),
                        "GC({}): old-to-young reference {:?} -> {} on clean card",
                        self.gc_id,
                        slot,
                        referent
                    );
                    old_to_young += 1;
                }
            });
        }

        self.stats.old_to_young += old_to_young;
    }

    fn verify_header(&self, obj: Address) {
        match obj.to_obj().header().kind() {
            MarkWordKind::Unforwarded { .. } => {}
            kind => panic!("GC({}): object {} has mark word {:?}", self.gc_id, obj, kind),
        }
    }

    fn verify_reference(&self, slot: Slot, referent: Address) {
        assert!(
            self.old_used.contains(referent) || self.survivor_used.contains(referent),
            "GC({}): slot {:?} refers to {} outside of old {} and survivors {}",
            self.gc_id,
            slot,
            referent,
            self.old_used,
            self.survivor_used
        );
    }

    fn verify_reachability(&mut self) {
        let mut collector = RootCollector(Vec::new());
        self.roots.all_oops_do(self.heap.classes(), &mut collector);

        let mut stack = Vec::new();

        for slot in collector.0 {
            let referent = slot.load(self.heap.oops());

            if referent.is_null() {
                continue;
            }

            self.verify_reference(slot, referent);
            self.verify_header(referent);
            stack.push(referent);
        }

        let heap = self.heap;

        while let Some(obj) = stack.pop() {
            let bit = obj.offset_from(heap.reserved().start()) / mem::ptr_width_usize();

            if self.visited.put(bit) {
                continue;
            }

            self.stats.reachable += 1;

            obj.to_obj().visit_reference_fields(heap.classes(), |slot| {
                let referent = slot.load(heap.oops());

                if referent.is_non_null() {
                    stack.push(referent);
                }
            });
        }
    }
}

struct RootCollector(Vec<Slot>);

impl OopClosure for RootCollector {
    fn do_oop(&mut self, slot: Slot) {
        self.0.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::GcFlags;
    use crate::gc::census::RootCategory;
    use crate::gc::class::{ClassKind, FieldEncoding};
    use crate::gc::root::RootArea;

    #[test]
    fn test_verify_old_only_heap() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let node = heap.register_class("Node", ClassKind::References(FieldEncoding::Wide));
        let a = heap.allocate_old(node, 1).expect("old allocation failed");
        let b = heap.allocate_old(node, 1).expect("old allocation failed");
        heap.set_field(a, 0, b);

        let mut roots = RootSet::new();
        roots.set_area(RootCategory::GlobalRoots, RootArea::wide("global", 1));
        roots.global.set(0, a, heap.oops());

        let stats = Verifier::new(&heap, &roots, GcId::new(1)).verify();
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.reachable, 2);
        assert_eq!(stats.old_to_young, 0);
    }

    #[test]
    #[should_panic(expected = "eden not empty")]
    fn test_verify_rejects_eden_objects() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        heap.allocate(data, 0).expect("eden allocation failed");

        Verifier::new(&heap, &RootSet::new(), GcId::new(1)).verify();
    }
}
