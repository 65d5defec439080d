use crate::gc::Address;
use crate::gc::census::{ObjectCounter, RootCategory};
use crate::gc::class::{ClassId, Klass};
use crate::gc::heap::Heap;
use crate::gc::root::Slot;
use crate::gc::scavenge::forward::{copy_and_push_safe_barrier, should_scavenge};
use crate::gc::scavenge::promotion::PromotionManager;

pub trait OopClosure {
    fn do_oop(&mut self, slot: Slot);
}

pub trait KlassClosure {
    fn do_klass(&mut self, klass: &Klass);
}

pub trait ObjectClosure {
    fn do_object(&mut self, obj: Address);
}

pub trait BoolObjectClosure {
    fn do_object_b(&mut self, obj: Address) -> bool;
}

/// Closures that keep a census of what they visited.
pub trait Counted {
    fn counter(&self) -> &ObjectCounter;

    fn category(&self) -> Option<RootCategory> {
        None
    }
}

/// Copies every young referent of a root slot and rewrites the slot. With
/// `PROMOTE_IMMEDIATELY` the copy always goes to the old generation.
///
/// Only referents in the collected spaces are counted, always as live.
pub struct RootsClosure<'p, 'a, const PROMOTE_IMMEDIATELY: bool> {
    pm: &'p mut PromotionManager<'a>,
    category: RootCategory,
    counter: ObjectCounter,
}

pub type ScavengeRootsClosure<'p, 'a> = RootsClosure<'p, 'a, false>;
pub type PromoteRootsClosure<'p, 'a> = RootsClosure<'p, 'a, true>;

impl<'p, 'a, const PROMOTE_IMMEDIATELY: bool> RootsClosure<'p, 'a, PROMOTE_IMMEDIATELY> {
    pub fn new(
        pm: &'p mut PromotionManager<'a>,
        category: RootCategory,
    ) -> RootsClosure<'p, 'a, PROMOTE_IMMEDIATELY> {
        RootsClosure {
            pm,
            category,
            counter: ObjectCounter::new(),
        }
    }

    pub fn name() -> &'static str {
        if PROMOTE_IMMEDIATELY {
            "promote_roots"
        } else {
            "scavenge_roots"
        }
    }

    pub fn identifier(&self) -> String {
        self.category.identifier(Self::name())
    }
}

impl<'p, 'a, const PROMOTE_IMMEDIATELY: bool> OopClosure
    for RootsClosure<'p, 'a, PROMOTE_IMMEDIATELY>
{
    fn do_oop(&mut self, slot: Slot) {
        let heap = self.pm.heap();
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

        if should_scavenge(heap, obj) {
            copy_and_push_safe_barrier::<PROMOTE_IMMEDIATELY>(self.pm, slot);
            self.counter.classify(true);
        }
    }
}

impl<'p, 'a, const PROMOTE_IMMEDIATELY: bool> Counted
    for RootsClosure<'p, 'a, PROMOTE_IMMEDIATELY>
{
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(self.category)
    }
}

/// Scans the references held by class metadata. Re-sets the modified-oops
/// flag of the class being scanned when a copied referent stays young.
pub struct ScavengeFromKlassClosure<'p, 'a> {
    pm: &'p mut PromotionManager<'a>,
    scanned_klass: Option<ClassId>,
    counter: ObjectCounter,
}

impl<'p, 'a> ScavengeFromKlassClosure<'p, 'a> {
    pub fn new(pm: &'p mut PromotionManager<'a>) -> ScavengeFromKlassClosure<'p, 'a> {
        ScavengeFromKlassClosure {
            pm,
            scanned_klass: None,
            counter: ObjectCounter::new(),
        }
    }

    pub fn scanned_klass(&self) -> Option<ClassId> {
        self.scanned_klass
    }

    pub fn set_scanned_klass(&mut self, klass: Option<ClassId>) {
        assert!(
            klass.is_none() || self.scanned_klass.is_none(),
            "nested scan of class {:?} while scanning {:?}",
            klass,
            self.scanned_klass
        );

        self.scanned_klass = klass;
    }

    fn do_klass_barrier(&self) {
        let klass = match self.scanned_klass {
            Some(klass) => klass,
            None => panic!("class metadata reference visited outside of a class scan"),
        };

        self.pm.heap().classes().get(klass).record_modified_oops();
    }
}

impl<'p, 'a> OopClosure for ScavengeFromKlassClosure<'p, 'a> {
    fn do_oop(&mut self, slot: Slot) {
        let heap = self.pm.heap();
        assert!(
            !heap.is_in_reserved(slot.address()),
            "class metadata slot {:?} inside the heap",
            slot
        );

        let obj = slot.load(heap.oops());

        if obj.is_null() {
            return;
        }

        if should_scavenge(heap, obj) {
            let new_obj = copy_and_push_safe_barrier::<false>(self.pm, slot);
            self.counter.classify(true);

            if heap.is_in_young(new_obj) {
                self.do_klass_barrier();
            }
        }
    }
}

impl<'p, 'a> Counted for ScavengeFromKlassClosure<'p, 'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(RootCategory::ClassLoaderGraph)
    }
}

/// Visits only classes whose modified-oops flag is set; the flag is cleared
/// before the scan.
pub struct ScavengeKlassClosure<'p, 'a> {
    oop_closure: ScavengeFromKlassClosure<'p, 'a>,
    scanned: usize,
}

impl<'p, 'a> ScavengeKlassClosure<'p, 'a> {
    pub fn new(pm: &'p mut PromotionManager<'a>) -> ScavengeKlassClosure<'p, 'a> {
        ScavengeKlassClosure {
            oop_closure: ScavengeFromKlassClosure::new(pm),
            scanned: 0,
        }
    }

    pub fn identifier(&self) -> String {
        RootCategory::ClassLoaderGraph.identifier("scavenge_klass")
    }

    /// Number of classes that were actually scanned.
    pub fn scanned(&self) -> usize {
        self.scanned
    }
}

impl<'p, 'a> KlassClosure for ScavengeKlassClosure<'p, 'a> {
    fn do_klass(&mut self, klass: &Klass) {
        if !klass.has_modified_oops() {
            return;
        }

        klass.clear_modified_oops();
        self.scanned += 1;

        self.oop_closure.set_scanned_klass(Some(klass.id()));
        klass.oops_do(&mut self.oop_closure);
        self.oop_closure.set_scanned_klass(None);
    }
}

impl<'p, 'a> Counted for ScavengeKlassClosure<'p, 'a> {
    fn counter(&self) -> &ObjectCounter {
        self.oop_closure.counter()
    }

    fn category(&self) -> Option<RootCategory> {
        Some(RootCategory::ClassLoaderGraph)
    }
}

/// Keeps referents of reference roots alive by copying them.
pub struct KeepAliveClosure<'p, 'a> {
    pm: &'p mut PromotionManager<'a>,
    counter: ObjectCounter,
}

impl<'p, 'a> KeepAliveClosure<'p, 'a> {
    pub fn new(pm: &'p mut PromotionManager<'a>) -> KeepAliveClosure<'p, 'a> {
        KeepAliveClosure {
            pm,
            counter: ObjectCounter::new(),
        }
    }

    pub fn identifier(&self) -> String {
        RootCategory::ReferenceRoots.identifier("keep_alive")
    }
}

impl<'p, 'a> OopClosure for KeepAliveClosure<'p, 'a> {
    fn do_oop(&mut self, slot: Slot) {
        let heap = self.pm.heap();
        let obj = slot.load(heap.oops());

        if obj.is_null() {
            return;
        }

        if should_scavenge(heap, obj) {
            copy_and_push_safe_barrier::<false>(self.pm, slot);
            self.counter.classify(true);
        }
    }
}

impl<'p, 'a> Counted for KeepAliveClosure<'p, 'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(RootCategory::ReferenceRoots)
    }
}

/// Generational liveness after copying: an object survived if it is
/// outside the young generation or was forwarded.
pub struct IsAliveClosure<'a> {
    heap: &'a Heap,
    counter: ObjectCounter,
}

impl<'a> IsAliveClosure<'a> {
    pub fn new(heap: &'a Heap) -> IsAliveClosure<'a> {
        IsAliveClosure {
            heap,
            counter: ObjectCounter::new(),
        }
    }
}

impl<'a> BoolObjectClosure for IsAliveClosure<'a> {
    fn do_object_b(&mut self, obj: Address) -> bool {
        let is_live = LiveFilter::Survivors.is_live(self.heap, obj);
        self.counter.classify(is_live);
        is_live
    }
}

impl<'a> Counted for IsAliveClosure<'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(RootCategory::StringTable)
    }
}

/// Liveness predicate of the census visitors.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LiveFilter {
    /// everything counts as live
    All,
    /// survivors of the current scavenge
    Survivors,
}

impl LiveFilter {
    #[inline(always)]
    pub fn is_live(self, heap: &Heap, obj: Address) -> bool {
        match self {
            LiveFilter::All => true,
            LiveFilter::Survivors => {
                !heap.is_in_young(obj) || obj.to_obj().header().is_forwarded()
            }
        }
    }
}

pub struct HeapIterationClosure<'a> {
    heap: &'a Heap,
    filter: LiveFilter,
    counter: ObjectCounter,
}

impl<'a> HeapIterationClosure<'a> {
    pub fn new(heap: &'a Heap, filter: LiveFilter) -> HeapIterationClosure<'a> {
        HeapIterationClosure {
            heap,
            filter,
            counter: ObjectCounter::new(),
        }
    }
}

impl<'a> ObjectClosure for HeapIterationClosure<'a> {
    fn do_object(&mut self, obj: Address) {
        let is_live = self.filter.is_live(self.heap, obj);
        self.counter.classify(is_live);
    }
}

impl<'a> Counted for HeapIterationClosure<'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }
}

/// Counts the referents of root slots without touching them.
pub struct RootCountingClosure<'a> {
    heap: &'a Heap,
    filter: LiveFilter,
    category: RootCategory,
    counter: ObjectCounter,
}

impl<'a> RootCountingClosure<'a> {
    pub fn new(
        heap: &'a Heap,
        filter: LiveFilter,
        category: RootCategory,
    ) -> RootCountingClosure<'a> {
        RootCountingClosure {
            heap,
            filter,
            category,
            counter: ObjectCounter::new(),
        }
    }

    pub fn identifier(&self) -> String {
        self.category.identifier("count_roots")
    }
}

impl<'a> OopClosure for RootCountingClosure<'a> {
    fn do_oop(&mut self, slot: Slot) {
        let obj = slot.load(self.heap.oops());

        if obj.is_non_null() {
            let is_live = self.filter.is_live(self.heap, obj);
            self.counter.classify(is_live);
        }
    }
}

impl<'a> KlassClosure for RootCountingClosure<'a> {
    fn do_klass(&mut self, klass: &Klass) {
        klass.oops_do(self);
    }
}

impl<'a> Counted for RootCountingClosure<'a> {
    fn counter(&self) -> &ObjectCounter {
        &self.counter
    }

    fn category(&self) -> Option<RootCategory> {
        Some(self.category)
    }
}
