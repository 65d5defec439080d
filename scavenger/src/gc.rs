use std::cmp::{Ord, Ordering, PartialOrd};
use std::fmt;

use crate::gc::card::CARD_SIZE;
use crate::gc::object::Obj;
use crate::mem;

pub mod card;
pub mod census;
pub mod class;
pub mod heap;
pub mod marking;
pub mod object;
pub mod root;
pub mod scavenge;
pub mod space;
pub mod start_array;
pub mod verify;

pub const K: usize = 1024;
pub const M: usize = K * K;

/// Identifies one collection cycle; attached to every census record.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct GcId(u32);

impl GcId {
    pub fn new(id: u32) -> GcId {
        GcId(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn next(self) -> GcId {
        GcId(self.0 + 1)
    }
}

impl fmt::Display for GcId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Address(usize);

impl Address {
    #[inline(always)]
    pub fn from(val: usize) -> Address {
        Address(val)
    }

    #[inline(always)]
    pub fn region_start(self, size: usize) -> Region {
        Region::new(self, self.offset(size))
    }

    #[inline(always)]
    pub fn offset_from(self, base: Address) -> usize {
        debug_assert!(self >= base);

        self.to_usize() - base.to_usize()
    }

    #[inline(always)]
    pub fn offset(self, offset: usize) -> Address {
        Address(self.0 + offset)
    }

    #[inline(always)]
    pub fn sub(self, offset: usize) -> Address {
        Address(self.0 - offset)
    }

    #[inline(always)]
    pub fn add_ptr(self, words: usize) -> Address {
        Address(self.0 + words * mem::ptr_width_usize())
    }

    #[inline(always)]
    pub fn to_obj(self) -> &'static Obj {
        debug_assert!(self.is_non_null());
        unsafe { &*self.to_mut_ptr::<Obj>() }
    }

    #[inline(always)]
    pub fn to_usize(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn from_ptr<T>(ptr: *const T) -> Address {
        Address(ptr as usize)
    }

    #[inline(always)]
    pub fn to_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }

    #[inline(always)]
    pub fn to_mut_ptr<T>(&self) -> *mut T {
        self.0 as *const T as *mut T
    }

    #[inline(always)]
    pub fn null() -> Address {
        Address(0)
    }

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn is_non_null(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub fn is_word_aligned(self) -> bool {
        mem::is_aligned(self.0, mem::ptr_width_usize())
    }

    #[inline(always)]
    pub fn is_card_aligned(self) -> bool {
        (self.to_usize() & (CARD_SIZE - 1)) == 0
    }

    #[inline(always)]
    pub fn align_card(self) -> Address {
        mem::align_usize_up(self.to_usize(), CARD_SIZE).into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}", self.to_usize())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}", self.to_usize())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Address) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Address) -> Ordering {
        self.to_usize().cmp(&other.to_usize())
    }
}

impl From<usize> for Address {
    fn from(val: usize) -> Address {
        Address(val)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Region {
    pub start: Address,
    pub end: Address,
}

impl Region {
    pub fn new(start: Address, end: Address) -> Region {
        debug_assert!(start <= end);

        Region { start, end }
    }

    #[inline(always)]
    pub fn start(&self) -> Address {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> Address {
        self.end
    }

    #[inline(always)]
    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end
    }

    #[inline(always)]
    pub fn valid_top(&self, addr: Address) -> bool {
        self.start <= addr && addr <= self.end
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.end.to_usize() - self.start.to_usize()
    }

    #[inline(always)]
    pub fn empty(&self) -> bool {
        self.start == self.end
    }

    #[inline(always)]
    pub fn disjunct(&self, other: &Region) -> bool {
        self.end <= other.start || self.start >= other.end
    }
}

impl Default for Region {
    fn default() -> Region {
        Region {
            start: Address::null(),
            end: Address::null(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

pub struct FormattedSize {
    size: usize,
}

impl fmt::Display for FormattedSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ksize = (self.size as f64) / 1024f64;

        if ksize < 1f64 {
            return write!(f, "{}B", self.size);
        }

        let msize = ksize / 1024f64;

        if msize < 1f64 {
            return write!(f, "{:.1}K", ksize);
        }

        let gsize = msize / 1024f64;

        if gsize < 1f64 {
            write!(f, "{:.1}M", msize)
        } else {
            write!(f, "{:.1}G", gsize)
        }
    }
}

pub fn formatted_size(size: usize) -> FormattedSize {
    FormattedSize { size }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region() {
        let a = Region::new(100.into(), 200.into());
        assert!(a.contains(100.into()));
        assert!(!a.contains(200.into()));
        assert!(a.valid_top(200.into()));
        assert_eq!(a.size(), 100);

        let b = Region::new(200.into(), 300.into());
        assert!(a.disjunct(&b));
        assert!(!a.disjunct(&Region::new(150.into(), 250.into())));
    }

    #[test]
    fn test_formatted_size() {
        assert_eq!(format!("{}", formatted_size(100)), "100B");
        assert_eq!(format!("{}", formatted_size(2 * K)), "2.0K");
        assert_eq!(format!("{}", formatted_size(3 * M)), "3.0M");
    }

    #[test]
    fn test_gc_id() {
        let id = GcId::default();
        assert_eq!(id.id(), 0);
        assert_eq!(id.next().id(), 1);
        assert_eq!(format!("{}", id.next().next()), "2");
    }
}
