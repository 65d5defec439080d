use crate::gc::census::closures::{BoolObjectClosure, Counted, IsAliveClosure, KeepAliveClosure};
use crate::gc::census::{ElapsedTimer, RootCategory, TimedScope};
use crate::gc::heap::Heap;
use crate::gc::root::RootSet;
use crate::gc::scavenge::promotion::PromotionManager;
use crate::gc::scavenge::tasks::TaskReport;
use crate::gc::Address;

/// Copies the referents of all reference roots and everything reachable
/// from them. Runs on the driver thread after the parallel phase.
pub fn keep_alive_references(
    pm: &mut PromotionManager,
    roots: &RootSet,
    timing: bool,
) -> TaskReport {
    let timer = ElapsedTimer::new();
    let mut closure = KeepAliveClosure::new(pm);

    {
        let _scope = TimedScope::new(timing, Some(&timer));
        roots.oops_do(RootCategory::ReferenceRoots, &mut closure);
    }

    let report = TaskReport::new(
        closure.identifier(),
        Some(RootCategory::ReferenceRoots),
        *closure.counter(),
        &timer,
    );

    pm.drain_stacks(true);
    report
}

/// Clears string table entries whose referent did not survive and updates
/// the others to their new location.
pub fn unlink_string_table(heap: &Heap, roots: &RootSet, timing: bool) -> TaskReport {
    let timer = ElapsedTimer::new();
    let mut is_alive = IsAliveClosure::new(heap);
    let oops = heap.oops();

    {
        let _scope = TimedScope::new(timing, Some(&timer));

        for slot in roots.string_table.slots() {
            let obj = slot.load(oops);

            if obj.is_null() {
                continue;
            }

            if !is_alive.do_object_b(obj) {
                slot.store(oops, Address::null());
            } else if heap.is_in_young(obj) {
                if let Some(forwardee) = obj.to_obj().header().forwardee() {
                    slot.store(oops, forwardee);
                }
            }
        }
    }

    TaskReport::new(
        RootCategory::StringTable.identifier("is_alive"),
        Some(RootCategory::StringTable),
        *is_alive.counter(),
        &timer,
    )
}
