use std::sync::atomic::{AtomicUsize, Ordering};

use crate::gc::card::{CARD_SIZE, CARD_SIZE_BITS};
use crate::gc::class::ClassTable;
use crate::gc::object::size_at;
use crate::gc::{Address, Region};

const NO_OBJECT: usize = usize::MAX;

/// Per card of the old generation, the lowest address of an object that
/// starts on that card. Allows finding the object covering any address.
pub struct ObjectStartArray {
    covered: Region,
    entries: Box<[AtomicUsize]>,
}

impl ObjectStartArray {
    pub fn new(covered: Region) -> ObjectStartArray {
        assert!(covered.start().is_card_aligned());

        let cards = covered.size().div_ceil(CARD_SIZE);
        let entries = (0..cards).map(|_| AtomicUsize::new(NO_OBJECT)).collect();

        ObjectStartArray { covered, entries }
    }

    fn idx(&self, addr: Address) -> usize {
        debug_assert!(self.covered.contains(addr));
        addr.offset_from(self.covered.start()) >> CARD_SIZE_BITS
    }

    /// Records an object (or filler) starting at `addr`. Safe to call from
    /// several workers at once.
    pub fn record(&self, addr: Address) {
        let idx = self.idx(addr);
        self.entries[idx].fetch_min(addr.to_usize(), Ordering::Relaxed);
    }

    pub fn is_recorded(&self, addr: Address) -> bool {
        let idx = self.idx(addr);
        self.entries[idx].load(Ordering::Relaxed) == addr.to_usize()
    }

    /// Start of the object that covers `addr`. Every object below `addr`
    /// must have been recorded.
    pub fn object_start(&self, addr: Address, classes: &ClassTable) -> Address {
        let mut idx = self.idx(addr);

        let mut curr = loop {
            let entry = self.entries[idx].load(Ordering::Relaxed);

            if entry != NO_OBJECT && entry <= addr.to_usize() {
                break Address::from(entry);
            }

            assert!(idx > 0, "no object start recorded below {}", addr);
            idx -= 1;
        };

        loop {
            let next = curr.offset(size_at(curr, classes));

            if next > addr {
                return curr;
            }

            curr = next;
        }
    }

    pub fn reset(&self) {
        for entry in self.entries.iter() {
            entry.store(NO_OBJECT, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::class::{ClassId, ClassTable};
    use crate::gc::object::Obj;
    use crate::os;

    #[test]
    fn test_object_start() {
        let classes = ClassTable::new();
        let size = 4 * CARD_SIZE.max(crate::mem::os_page_size());
        let reservation = os::reserve_align(size, CARD_SIZE);
        let start = reservation.start();
        let array = ObjectStartArray::new(reservation.region());

        // filler of 100 words spans the first card into the second
        Obj::initialize(start, ClassId::FILLER, 97);
        array.record(start);
        let second = start.add_ptr(100);
        Obj::initialize(second, ClassId::FILLER, 0);
        array.record(second);

        assert_eq!(array.object_start(start, &classes), start);
        assert_eq!(array.object_start(start.offset(CARD_SIZE), &classes), start);
        assert_eq!(array.object_start(second.add_ptr(1), &classes), second);
        assert!(array.is_recorded(second));

        array.reset();
        assert!(!array.is_recorded(start));
    }
}
