use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::flags::GcFlags;
use crate::gc::card::{CARD_SIZE, CardTable};
use crate::gc::class::{ClassId, ClassKind, ClassTable};
use crate::gc::object::{self, Obj, size_at};
use crate::gc::root::{CompressedOops, Slot};
use crate::gc::space::Space;
use crate::gc::start_array::ObjectStartArray;
use crate::gc::{Address, Region, formatted_size};
use crate::mem;
use crate::os::{self, Reservation};

/// Generational heap: `[old | eden | survivor 0 | survivor 1]` in a single
/// reservation. The card table and the object-start array cover the old
/// generation.
pub struct Heap {
    _reservation: Reservation,
    reserved: Region,
    young: Region,

    old: Space,
    eden: Space,
    survivors: [Space; 2],
    from_index: AtomicUsize,

    classes: ClassTable,
    oops: CompressedOops,
    card_table: CardTable,
    start_array: ObjectStartArray,
}

impl Heap {
    pub fn new(flags: &GcFlags) -> Heap {
        let align = |size: usize| mem::align_usize_up(mem::os_page_align_up(size), CARD_SIZE);

        let old_size = align(flags.old_size());
        let eden_size = align(flags.eden_size());
        let survivor_size = align(flags.survivor_size());
        assert!(old_size > 0 && eden_size > 0 && survivor_size > 0);

        let total = old_size + eden_size + 2 * survivor_size;
        let reservation = os::reserve_align(total, CARD_SIZE);
        let reserved = reservation.region();

        let old = reserved.start().region_start(old_size);
        let eden = old.end().region_start(eden_size);
        let s0 = eden.end().region_start(survivor_size);
        let s1 = s0.end().region_start(survivor_size);
        assert_eq!(s1.end(), reserved.end());

        if flags.gc_verbose {
            log::info!(
                "GC: heap {} old {} eden {} survivor 2x{}",
                reserved,
                formatted_size(old_size),
                formatted_size(eden_size),
                formatted_size(survivor_size)
            );
        }

        Heap {
            _reservation: reservation,
            reserved,
            young: Region::new(eden.start(), s1.end()),

            old: Space::new("old", old),
            eden: Space::new("eden", eden),
            survivors: [Space::new("survivor0", s0), Space::new("survivor1", s1)],
            from_index: AtomicUsize::new(0),

            classes: ClassTable::new(),
            oops: CompressedOops::new(reserved.start()),
            card_table: CardTable::new(old),
            start_array: ObjectStartArray::new(old),
        }
    }

    pub fn reserved(&self) -> Region {
        self.reserved
    }

    pub fn young(&self) -> Region {
        self.young
    }

    pub fn old(&self) -> &Space {
        &self.old
    }

    pub fn eden(&self) -> &Space {
        &self.eden
    }

    pub fn from_space(&self) -> &Space {
        &self.survivors[self.from_index.load(Ordering::Relaxed)]
    }

    pub fn to_space(&self) -> &Space {
        &self.survivors[1 - self.from_index.load(Ordering::Relaxed)]
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn register_class(&mut self, name: &str, kind: ClassKind) -> ClassId {
        self.classes.register(name, kind)
    }

    pub fn register_class_with_statics(
        &mut self,
        name: &str,
        kind: ClassKind,
        statics: usize,
    ) -> ClassId {
        self.classes.register_with_statics(name, kind, statics)
    }

    pub fn oops(&self) -> CompressedOops {
        self.oops
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    pub fn start_array(&self) -> &ObjectStartArray {
        &self.start_array
    }

    #[inline(always)]
    pub fn is_in_reserved(&self, addr: Address) -> bool {
        self.reserved.contains(addr)
    }

    #[inline(always)]
    pub fn is_in_young(&self, addr: Address) -> bool {
        self.young.contains(addr)
    }

    #[inline(always)]
    pub fn is_in_old(&self, addr: Address) -> bool {
        self.old.contains(addr)
    }

    #[inline(always)]
    pub fn is_in_to_space(&self, addr: Address) -> bool {
        self.to_space().contains(addr)
    }

    /// Allocates a zeroed object in eden.
    pub fn allocate(&self, class: ClassId, length: usize) -> Option<Address> {
        let size = self.size_for(class, length);
        let address = self.eden.allocate(size)?;
        initialize(address, size, class, length);
        Some(address)
    }

    /// Allocates a zeroed object directly in the old generation.
    pub fn allocate_old(&self, class: ClassId, length: usize) -> Option<Address> {
        let size = self.size_for(class, length);
        let address = self.old.allocate(size)?;
        initialize(address, size, class, length);
        self.start_array.record(address);
        Some(address)
    }

    fn size_for(&self, class: ClassId, length: usize) -> usize {
        let kind = self.classes.get(class).kind();
        assert_ne!(kind, ClassKind::Filler, "cannot allocate filler objects");
        object::object_size(kind, length)
    }

    pub fn field_slot(&self, obj: Address, idx: usize) -> Slot {
        obj.to_obj().field_slot(&self.classes, idx)
    }

    pub fn get_field(&self, obj: Address, idx: usize) -> Address {
        self.field_slot(obj, idx).load(self.oops)
    }

    /// Reference store with the generational write barrier.
    pub fn set_field(&self, obj: Address, idx: usize, value: Address) {
        let slot = self.field_slot(obj, idx);
        slot.store(self.oops, value);

        if self.is_in_old(slot.address()) && self.is_in_young(value) {
            self.card_table.dirty(slot.address());
        }
    }

    /// Reference store into a static field of `class`. Marks the class as
    /// holding a possible young reference.
    pub fn set_static(&self, class: ClassId, idx: usize, value: Address) {
        let klass = self.classes.get(class);
        klass.statics().set(idx, value, self.oops);

        if self.is_in_young(value) {
            klass.record_modified_oops();
        }
    }

    /// Visits every object in the old generation, eden and from-space.
    pub fn object_iterate<F>(&self, f: F)
    where
        F: FnMut(Address),
    {
        self.object_iterate_below(self.old.top(), f);
    }

    /// Like `object_iterate`, but stops the old generation walk at
    /// `old_top`.
    pub fn object_iterate_below<F>(&self, old_top: Address, mut f: F)
    where
        F: FnMut(Address),
    {
        assert!(
            self.old.region().valid_top(old_top) && old_top <= self.old.top(),
            "{} is not below the top of the old generation",
            old_top
        );

        self.walk(Region::new(self.old.region().start(), old_top), &mut f);
        self.young_object_iterate(f);
    }

    /// Visits every object in the collected young spaces (eden and
    /// from-space).
    pub fn young_object_iterate<F>(&self, mut f: F)
    where
        F: FnMut(Address),
    {
        self.walk(self.eden.used_region(), &mut f);
        self.walk(self.from_space().used_region(), &mut f);
    }

    pub fn walk<F>(&self, region: Region, f: &mut F)
    where
        F: FnMut(Address),
    {
        let mut curr = region.start();

        while curr < region.end() {
            let size = size_at(curr, &self.classes);

            if !object::is_filler(curr) {
                f(curr);
            }

            curr = curr.offset(size);
        }

        assert_eq!(curr, region.end(), "object walk overran {}", region);
    }

    pub fn prepare_scavenge(&self) {
        assert!(
            self.to_space().is_empty(),
            "to-space {} not empty before scavenge",
            self.to_space().region()
        );
    }

    /// Eden and from-space are empty after a scavenge; the survivors in
    /// to-space become the next from-space.
    pub fn finish_scavenge(&self) {
        self.eden.reset();
        self.from_space().reset();
        self.from_index.fetch_xor(1, Ordering::Relaxed);
    }

    pub fn young_used(&self) -> usize {
        self.eden.used_region().size() + self.from_space().used_region().size()
    }
}

fn initialize(address: Address, size: usize, class: ClassId, length: usize) {
    unsafe {
        ptr::write_bytes(address.to_mut_ptr::<u8>(), 0, size);
    }

    Obj::initialize(address, class, length);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::class::FieldEncoding;

    #[test]
    fn test_layout() {
        let heap = Heap::new(&GcFlags::small(1));
        let reserved = heap.reserved();

        assert_eq!(heap.old().region().start(), reserved.start());
        assert_eq!(heap.eden().region().start(), heap.old().region().end());
        assert_eq!(heap.young().end(), reserved.end());
        assert!(heap.from_space().region().disjunct(&heap.to_space().region()));
        assert!(heap.is_in_young(heap.to_space().region().start()));
        assert!(!heap.is_in_young(heap.old().region().start()));
    }

    #[test]
    fn test_write_barrier() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let node = heap.register_class("Node", ClassKind::References(FieldEncoding::Wide));

        let old = heap.allocate_old(node, 2).expect("old allocation failed");
        let young = heap.allocate(node, 0).expect("eden allocation failed");
        let other_old = heap.allocate_old(node, 0).expect("old allocation failed");

        heap.set_field(old, 0, other_old);
        assert_eq!(heap.card_table().dirty_cards(), 0);

        heap.set_field(old, 1, young);
        assert_eq!(heap.get_field(old, 1), young);
        assert!(heap.card_table().is_dirty(heap.field_slot(old, 1).address()));
        assert!(heap.start_array().is_recorded(old));
    }

    #[test]
    fn test_static_write_barrier() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let holder = heap.register_class_with_statics("Holder", ClassKind::Data, 2);

        let old = heap.allocate_old(data, 0).expect("old allocation failed");
        heap.set_static(holder, 0, old);
        assert!(!heap.classes().get(holder).has_modified_oops());

        let young = heap.allocate(data, 0).expect("eden allocation failed");
        heap.set_static(holder, 1, young);
        assert!(heap.classes().get(holder).has_modified_oops());
        assert_eq!(heap.classes().get(holder).statics().get(1, heap.oops()), young);
        assert_eq!(heap.card_table().dirty_cards(), 0);
    }

    #[test]
    fn test_object_iterate_and_swap() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);

        heap.allocate_old(data, 1).expect("old allocation failed");
        heap.allocate(data, 2).expect("eden allocation failed");
        heap.allocate(data, 3).expect("eden allocation failed");

        let mut count = 0;
        heap.object_iterate(|_| count += 1);
        assert_eq!(count, 3);

        let mut young = 0;
        heap.young_object_iterate(|_| young += 1);
        assert_eq!(young, 2);

        let from = heap.from_space().region();
        heap.prepare_scavenge();
        heap.finish_scavenge();
        assert!(heap.eden().is_empty());
        assert_eq!(heap.to_space().region(), from);
    }
}
