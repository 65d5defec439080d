use std::sync::atomic::{AtomicU8, Ordering};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::gc::{Address, Region};

pub const CARD_SIZE_BITS: usize = 9;
pub const CARD_SIZE: usize = 1 << CARD_SIZE_BITS;

#[derive(Copy, Clone, PartialEq, Eq, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CardEntry {
    Clean = 0,
    Dirty = 1,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct CardIdx(usize);

impl CardIdx {
    pub fn to_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for CardIdx {
    fn from(val: usize) -> CardIdx {
        CardIdx(val)
    }
}

/// One byte per card of the old generation. A dirty card may contain a
/// reference into the young generation.
pub struct CardTable {
    covered: Region,
    entries: Box<[AtomicU8]>,
}

impl CardTable {
    pub fn new(covered: Region) -> CardTable {
        assert!(covered.start().is_card_aligned());
        assert!(covered.end().is_card_aligned());

        let cards = covered.size() >> CARD_SIZE_BITS;
        let entries = (0..cards)
            .map(|_| AtomicU8::new(CardEntry::Clean.into()))
            .collect();

        CardTable { covered, entries }
    }

    pub fn covered(&self) -> Region {
        self.covered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn card_idx(&self, addr: Address) -> CardIdx {
        debug_assert!(self.covered.contains(addr));
        (addr.offset_from(self.covered.start()) >> CARD_SIZE_BITS).into()
    }

    /// Index of the card containing `addr`, or the card count for the end
    /// of the covered region.
    pub fn card_idx_for_top(&self, addr: Address) -> CardIdx {
        debug_assert!(self.covered.valid_top(addr));
        (addr.offset_from(self.covered.start()) >> CARD_SIZE_BITS).into()
    }

    pub fn card_start(&self, idx: CardIdx) -> Address {
        self.covered.start().offset(idx.to_usize() << CARD_SIZE_BITS)
    }

    pub fn card_region(&self, idx: CardIdx) -> Region {
        self.card_start(idx).region_start(CARD_SIZE)
    }

    #[inline(always)]
    pub fn get(&self, idx: CardIdx) -> CardEntry {
        let value = self.entries[idx.to_usize()].load(Ordering::Relaxed);

        match CardEntry::try_from(value) {
            Ok(entry) => entry,
            Err(_) => panic!("invalid card table entry {} for card {:?}", value, idx),
        }
    }

    #[inline(always)]
    pub fn set(&self, idx: CardIdx, entry: CardEntry) {
        self.entries[idx.to_usize()].store(entry.into(), Ordering::Relaxed);
    }

    /// Redundant marks by racing workers are harmless.
    #[inline(always)]
    pub fn dirty(&self, addr: Address) {
        let idx = self.card_idx(addr);
        self.set(idx, CardEntry::Dirty);
    }

    pub fn is_dirty(&self, addr: Address) -> bool {
        self.get(self.card_idx(addr)) == CardEntry::Dirty
    }

    pub fn clear_all(&self) {
        for entry in self.entries.iter() {
            entry.store(CardEntry::Clean.into(), Ordering::Relaxed);
        }
    }

    pub fn dirty_cards(&self) -> usize {
        (0..self.len())
            .filter(|&idx| self.get(idx.into()) == CardEntry::Dirty)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_idx() {
        let covered = Region::new(0x10000.into(), 0x11000.into());
        let table = CardTable::new(covered);
        assert_eq!(table.len(), 8);

        assert_eq!(table.card_idx(0x10000.into()), 0.into());
        assert_eq!(table.card_idx(0x101ff.into()), 0.into());
        assert_eq!(table.card_idx(0x10200.into()), 1.into());
        assert_eq!(table.card_idx_for_top(0x11000.into()), 8.into());
        assert_eq!(table.card_region(2.into()), Region::new(0x10400.into(), 0x10600.into()));
    }

    #[test]
    fn test_dirty_and_clear() {
        let table = CardTable::new(Region::new(0x10000.into(), 0x11000.into()));
        assert_eq!(table.dirty_cards(), 0);

        table.dirty(0x10208.into());
        table.dirty(0x10210.into());
        assert!(table.is_dirty(0x10200.into()));
        assert!(!table.is_dirty(0x10000.into()));
        assert_eq!(table.dirty_cards(), 1);

        table.clear_all();
        assert_eq!(table.dirty_cards(), 0);
    }
}
