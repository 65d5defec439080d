use std::ops::AddAssign;

use crossbeam_deque::{Steal, Stealer, Worker};
use rand::distributions::{Distribution, Uniform};
use rand::thread_rng;

use crate::gc::heap::Heap;
use crate::gc::object::{ForwardResult, MAX_AGE, MarkWordKind, fill_region};
use crate::gc::root::Slot;
use crate::gc::scavenge::forward::{copy_and_push_safe_barrier, should_scavenge};
use crate::gc::{Address, K};

const MIN_LAB_SIZE: usize = 2 * K;
const MAX_LAB_SIZE: usize = 8 * K;
const MAX_LAB_OBJECT_SIZE: usize = 2 * K;

/// Private slots kept before half of them is made stealable.
const LOCAL_MAXIMUM: usize = 64;

/// Slots left in the stealable queue by a partial drain.
const DRAIN_RESIDUE: usize = 16;

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct PromotionStats {
    pub copied_objects: usize,
    pub copied_bytes: usize,
    pub promoted_objects: usize,
    pub promoted_bytes: usize,
    pub lost_races: usize,
    pub steals: usize,
}

impl AddAssign for PromotionStats {
    fn add_assign(&mut self, other: PromotionStats) {
        self.copied_objects += other.copied_objects;
        self.copied_bytes += other.copied_bytes;
        self.promoted_objects += other.promoted_objects;
        self.promoted_bytes += other.promoted_bytes;
        self.lost_races += other.lost_races;
        self.steals += other.steals;
    }
}

struct Lab {
    top: Address,
    limit: Address,
}

impl Lab {
    fn new() -> Lab {
        Lab {
            top: Address::null(),
            limit: Address::null(),
        }
    }

    fn reset(&mut self, top: Address, limit: Address) {
        self.top = top;
        self.limit = limit;
    }

    fn allocate(&mut self, size: usize) -> Option<Address> {
        let object_start = self.top;
        let object_end = object_start.offset(size);

        if object_end <= self.limit {
            self.top = object_end;
            Some(object_start)
        } else {
            None
        }
    }

    fn undo_alloc(&mut self, size: usize) {
        self.top = self.top.sub(size);
        debug_assert!(self.limit.offset_from(self.top) <= MAX_LAB_SIZE);
    }

    /// Fills the unused rest and returns its start when there was one.
    fn make_iterable(&mut self) -> Option<Address> {
        let rest = if self.top < self.limit {
            fill_region(self.top, self.limit);
            Some(self.top)
        } else {
            None
        };

        self.top = Address::null();
        self.limit = Address::null();

        rest
    }
}

/// Per-worker state of a scavenge: allocation buffers in to-space and the
/// old generation plus the queue of slots still to process.
pub struct PromotionManager<'a> {
    which: usize,
    heap: &'a Heap,

    local: Vec<Slot>,
    queue: Worker<Slot>,
    stealers: &'a [Stealer<Slot>],

    young_lab: Lab,
    old_lab: Lab,
    tenuring_threshold: u32,

    stats: PromotionStats,
}

impl<'a> PromotionManager<'a> {
    pub fn new(
        which: usize,
        heap: &'a Heap,
        queue: Worker<Slot>,
        stealers: &'a [Stealer<Slot>],
        tenuring_threshold: u32,
    ) -> PromotionManager<'a> {
        assert!(tenuring_threshold <= MAX_AGE);

        PromotionManager {
            which,
            heap,
            local: Vec::with_capacity(LOCAL_MAXIMUM),
            queue,
            stealers,
            young_lab: Lab::new(),
            old_lab: Lab::new(),
            tenuring_threshold,
            stats: PromotionStats::default(),
        }
    }

    pub fn which(&self) -> usize {
        self.which
    }

    #[inline(always)]
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    pub fn stats(&self) -> PromotionStats {
        self.stats
    }

    /// Copies `obj` into to-space, or into the old generation when it is
    /// old enough, to-space is full or `PROMOTE_IMMEDIATELY` is set.
    /// Returns the address of the copy that won the race.
    pub fn copy_to_survivor_space<const PROMOTE_IMMEDIATELY: bool>(
        &mut self,
        obj: Address,
    ) -> Address {
        let heap = self.heap;
        let object = obj.to_obj();

        let (raw, age) = match object.header().kind() {
            MarkWordKind::Unforwarded { raw, age } => (raw, age),
            MarkWordKind::Forwarded(forwardee) => return forwardee,
            MarkWordKind::Filler => panic!("copying filler at {}", obj),
        };

        let size = object.size(heap.classes());
        let mut new_obj = Address::null();
        let mut promoted = false;

        if !PROMOTE_IMMEDIATELY && age < self.tenuring_threshold {
            new_obj = self.alloc_young(size);
        }

        if new_obj.is_null() {
            new_obj = self.alloc_old(size);
            promoted = true;

            if new_obj.is_null() {
                panic!(
                    "promotion failure: old generation exhausted while copying {} ({} bytes)",
                    obj, size
                );
            }
        }

        let new_age = if promoted { age } else { (age + 1).min(MAX_AGE) };
        object.copy_to(new_obj, size, new_age);

        match object.header().try_install_fwdptr(raw, new_obj) {
            ForwardResult::Forwarded => {
                if promoted {
                    heap.start_array().record(new_obj);
                    self.stats.promoted_objects += 1;
                    self.stats.promoted_bytes += size;
                } else {
                    self.stats.copied_objects += 1;
                    self.stats.copied_bytes += size;
                }

                self.push_contents(new_obj);
                new_obj
            }

            ForwardResult::AlreadyForwarded(winner) => {
                if promoted {
                    self.undo_alloc_old(new_obj, size);
                } else {
                    self.undo_alloc_young(new_obj, size);
                }

                self.stats.lost_races += 1;
                winner
            }
        }
    }

    fn push_contents(&mut self, obj: Address) {
        let heap = self.heap;

        obj.to_obj().visit_reference_fields(heap.classes(), |slot| {
            if should_scavenge(heap, slot.load(heap.oops())) {
                self.push_depth(slot);
            }
        });
    }

    /// Queues `slot` when its referent still has to be copied.
    pub fn claim_or_forward_depth(&mut self, slot: Slot) -> bool {
        let heap = self.heap;

        if should_scavenge(heap, slot.load(heap.oops())) {
            self.push_depth(slot);
            true
        } else {
            false
        }
    }

    fn push_depth(&mut self, slot: Slot) {
        if self.local.len() >= LOCAL_MAXIMUM {
            let half = self.local.len() / 2;

            for slot in self.local.drain(..half) {
                self.queue.push(slot);
            }
        }

        self.local.push(slot);
    }

    pub fn process_popped_location_depth(&mut self, slot: Slot) {
        let heap = self.heap;

        if should_scavenge(heap, slot.load(heap.oops())) {
            copy_and_push_safe_barrier::<false>(self, slot);
        }
    }

    /// Processes queued slots. A partial drain leaves a few slots in the
    /// stealable queue for idle workers.
    pub fn drain_stacks(&mut self, totally: bool) {
        let residue = if totally { 0 } else { DRAIN_RESIDUE };

        loop {
            if let Some(slot) = self.local.pop() {
                self.process_popped_location_depth(slot);
                continue;
            }

            if self.queue.len() <= residue {
                break;
            }

            match self.queue.pop() {
                Some(slot) => self.process_popped_location_depth(slot),
                None => break,
            }
        }

        debug_assert!(!totally || self.stacks_empty());
    }

    pub fn stacks_empty(&self) -> bool {
        self.local.is_empty() && self.queue.is_empty()
    }

    pub fn peers_have_work(&self) -> bool {
        self.stealers
            .iter()
            .enumerate()
            .any(|(idx, stealer)| idx != self.which && !stealer.is_empty())
    }

    /// Polls a random sequence of peers and takes a batch of slots from the
    /// first one that has work.
    pub fn steal_depth(&mut self) -> Option<Slot> {
        if self.stealers.len() <= 1 {
            return None;
        }

        let mut rng = thread_rng();
        let range = Uniform::new(0, self.stealers.len());

        for _ in 0..2 * self.stealers.len() {
            let mut stealer_id = self.which;

            while stealer_id == self.which {
                stealer_id = range.sample(&mut rng);
            }

            let stealer = &self.stealers[stealer_id];

            loop {
                match stealer.steal_batch_and_pop(&self.queue) {
                    Steal::Empty => break,
                    Steal::Success(slot) => {
                        self.stats.steals += 1;
                        return Some(slot);
                    }
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn alloc_young(&mut self, size: usize) -> Address {
        if size < MAX_LAB_OBJECT_SIZE {
            if let Some(object_start) = self.young_lab.allocate(size) {
                return object_start;
            }

            self.young_lab.make_iterable();

            match self.heap.to_space().allocate_lab(MIN_LAB_SIZE, MAX_LAB_SIZE) {
                Some(lab) => self.young_lab.reset(lab.start(), lab.end()),
                None => return Address::null(),
            }

            self.young_lab.allocate(size).unwrap_or(Address::null())
        } else {
            self.heap.to_space().allocate(size).unwrap_or(Address::null())
        }
    }

    fn undo_alloc_young(&mut self, copy_addr: Address, size: usize) {
        if size < MAX_LAB_OBJECT_SIZE {
            self.young_lab.undo_alloc(size);
        } else {
            fill_region(copy_addr, copy_addr.offset(size));
        }
    }

    fn alloc_old(&mut self, size: usize) -> Address {
        if size < MAX_LAB_OBJECT_SIZE {
            if let Some(object_start) = self.old_lab.allocate(size) {
                return object_start;
            }

            self.flush_old_lab();

            match self.heap.old().allocate_lab(MIN_LAB_SIZE, MAX_LAB_SIZE) {
                Some(lab) => self.old_lab.reset(lab.start(), lab.end()),
                None => return self.heap.old().allocate(size).unwrap_or(Address::null()),
            }

            self.old_lab.allocate(size).unwrap_or(Address::null())
        } else {
            self.heap.old().allocate(size).unwrap_or(Address::null())
        }
    }

    fn undo_alloc_old(&mut self, copy_addr: Address, size: usize) {
        if self.old_lab.top == copy_addr.offset(size) {
            self.old_lab.undo_alloc(size);
        } else {
            fill_region(copy_addr, copy_addr.offset(size));
            self.heap.start_array().record(copy_addr);
        }
    }

    fn flush_old_lab(&mut self) {
        if let Some(rest) = self.old_lab.make_iterable() {
            self.heap.start_array().record(rest);
        }
    }

    /// Makes the allocation buffers iterable. Called once the worker ran
    /// out of tasks.
    pub fn flush(&mut self) {
        self.young_lab.make_iterable();
        self.flush_old_lab();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::GcFlags;
    use crate::gc::class::{ClassKind, FieldEncoding};

    fn manager<'a>(heap: &'a Heap, threshold: u32) -> PromotionManager<'a> {
        PromotionManager::new(0, heap, Worker::new_lifo(), &[], threshold)
    }

    #[test]
    fn test_copy_into_survivor_space() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let obj = heap.allocate(data, 2).expect("eden allocation failed");

        let mut pm = manager(&heap, 7);
        let copy = pm.copy_to_survivor_space::<false>(obj);

        assert!(heap.is_in_to_space(copy));
        assert_eq!(copy.to_obj().header().age(), 1);
        assert_eq!(obj.to_obj().header().forwardee(), Some(copy));
        assert_eq!(pm.copy_to_survivor_space::<false>(obj), copy);
        assert_eq!(pm.stats().copied_objects, 1);
        pm.flush();
    }

    #[test]
    fn test_promote_immediately() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let obj = heap.allocate(data, 2).expect("eden allocation failed");

        let mut pm = manager(&heap, 7);
        let copy = pm.copy_to_survivor_space::<true>(obj);

        assert!(heap.is_in_old(copy));
        assert!(heap.start_array().is_recorded(copy));
        assert_eq!(pm.stats().promoted_objects, 1);
        pm.flush();
    }

    #[test]
    fn test_tenuring_threshold_zero_promotes() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let data = heap.register_class("Data", ClassKind::Data);
        let obj = heap.allocate(data, 0).expect("eden allocation failed");

        let mut pm = manager(&heap, 0);
        assert!(heap.is_in_old(pm.copy_to_survivor_space::<false>(obj)));
        pm.flush();
    }

    #[test]
    fn test_push_contents_and_drain() {
        let mut heap = Heap::new(&GcFlags::small(1));
        let node = heap.register_class("Node", ClassKind::References(FieldEncoding::Narrow));
        let head = heap.allocate(node, 2).expect("eden allocation failed");
        let tail = heap.allocate(node, 2).expect("eden allocation failed");
        heap.set_field(head, 0, tail);
        heap.set_field(tail, 1, head);

        let mut pm = manager(&heap, 7);
        let new_head = pm.copy_to_survivor_space::<false>(head);
        assert!(!pm.stacks_empty());

        pm.drain_stacks(true);
        assert!(pm.stacks_empty());

        let new_tail = heap.get_field(new_head, 0);
        assert!(heap.is_in_to_space(new_tail));
        assert_eq!(heap.get_field(new_tail, 1), new_head);
        pm.flush();
    }
}
