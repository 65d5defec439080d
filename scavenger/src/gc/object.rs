use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::gc::Address;
use crate::gc::class::{ClassId, ClassKind, ClassTable, FieldEncoding};
use crate::gc::root::Slot;
use crate::mem;

// Mark word layout:
//   0                      single word filler, no object starts here
//   [age:4][000][01]       regular object
//   [forwardee    ][11]    object was copied, forwardee is word aligned
const LOCK_MASK: usize = 0b11;
const UNLOCKED_VALUE: usize = 0b01;
const FORWARDED_VALUE: usize = 0b11;

const AGE_SHIFT: usize = 3;
const AGE_MASK: usize = 0xF;

pub const MAX_AGE: u32 = AGE_MASK as u32;

/// mark + class + length
pub const OBJECT_HEADER_SIZE: usize = 3 * mem::ptr_width_usize();

pub const FILLER_WORD: usize = 0;

#[repr(C)]
pub struct Header {
    word: HeaderWord,
}

#[repr(C)]
struct HeaderWord(AtomicUsize);

impl HeaderWord {
    fn compute_word(age: u32) -> usize {
        debug_assert!(age <= MAX_AGE);
        ((age as usize & AGE_MASK) << AGE_SHIFT) | UNLOCKED_VALUE
    }

    fn kind(&self) -> MarkWordKind {
        decode(self.raw())
    }

    fn try_install_fwdptr(&self, expected: usize, new_address: Address) -> ForwardResult {
        debug_assert!(new_address.is_word_aligned());
        let fwd = new_address.to_usize() | FORWARDED_VALUE;

        let result = self
            .0
            .compare_exchange(expected, fwd, Ordering::AcqRel, Ordering::Acquire);

        match result {
            Ok(value) => {
                debug_assert_eq!(value, expected);
                ForwardResult::Forwarded
            }

            Err(actual) => match decode(actual) {
                MarkWordKind::Forwarded(forwarding_address) => {
                    ForwardResult::AlreadyForwarded(forwarding_address)
                }

                _ => panic!(
                    "mark word changed to 0x{:x} without forwarding the object",
                    actual
                ),
            },
        }
    }

    fn raw(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn set_raw(&self, value: usize) {
        self.0.store(value, Ordering::Release);
    }
}

fn decode(value: usize) -> MarkWordKind {
    if value == FILLER_WORD {
        MarkWordKind::Filler
    } else if value & LOCK_MASK == FORWARDED_VALUE {
        MarkWordKind::Forwarded((value & !LOCK_MASK).into())
    } else {
        debug_assert_eq!(value & LOCK_MASK, UNLOCKED_VALUE);
        let age = (value >> AGE_SHIFT) & AGE_MASK;
        MarkWordKind::Unforwarded {
            raw: value,
            age: age as u32,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkWordKind {
    Filler,
    Unforwarded { raw: usize, age: u32 },
    Forwarded(Address),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForwardResult {
    Forwarded,
    AlreadyForwarded(Address),
}

impl Header {
    #[inline(always)]
    pub fn setup(&self, age: u32) {
        self.word.set_raw(HeaderWord::compute_word(age));
    }

    #[inline(always)]
    pub fn raw(&self) -> usize {
        self.word.raw()
    }

    #[inline(always)]
    pub fn kind(&self) -> MarkWordKind {
        self.word.kind()
    }

    pub fn age(&self) -> u32 {
        match self.kind() {
            MarkWordKind::Unforwarded { age, .. } => age,
            kind => panic!("object without age: {:?}", kind),
        }
    }

    #[inline(always)]
    pub fn is_forwarded(&self) -> bool {
        matches!(self.kind(), MarkWordKind::Forwarded(_))
    }

    #[inline(always)]
    pub fn forwardee(&self) -> Option<Address> {
        match self.kind() {
            MarkWordKind::Forwarded(address) => Some(address),
            _ => None,
        }
    }

    /// Exactly one of several racing copiers installs its copy; every other
    /// caller gets the winner's address.
    #[inline(always)]
    pub fn try_install_fwdptr(&self, expected: usize, new_address: Address) -> ForwardResult {
        self.word.try_install_fwdptr(expected, new_address)
    }
}

// is used to reference any object
#[repr(C)]
pub struct Obj {
    header: Header,
    class: usize,
    length: usize,
    data: u8,
}

impl Obj {
    #[inline(always)]
    pub fn address(&self) -> Address {
        Address::from_ptr(self as *const _)
    }

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Writes header, class and length of a fresh object. Fields are left as
    /// they are (zero in freshly reserved memory).
    pub fn initialize(address: Address, class: ClassId, length: usize) {
        unsafe {
            ptr::write(address.add_ptr(1).to_mut_ptr::<usize>(), class.to_usize());
            ptr::write(address.add_ptr(2).to_mut_ptr::<usize>(), length);
        }

        address.to_obj().header().setup(0);
    }

    #[inline(always)]
    pub fn class_id(&self) -> ClassId {
        ClassId::from_usize(self.class)
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline(always)]
    pub fn data_address(&self) -> Address {
        Address::from_ptr(&self.data as *const u8)
    }

    /// Object size in bytes. Stays valid after the mark word was replaced
    /// by a forwarding pointer.
    pub fn size(&self, classes: &ClassTable) -> usize {
        let kind = classes.get(self.class_id()).kind();
        object_size(kind, self.length)
    }

    pub fn field_slot(&self, classes: &ClassTable, idx: usize) -> Slot {
        assert!(idx < self.length, "field index {} out of bounds", idx);

        match classes.get(self.class_id()).kind() {
            ClassKind::References(FieldEncoding::Wide) => {
                Slot::Wide(self.data_address().add_ptr(idx))
            }

            ClassKind::References(FieldEncoding::Narrow) => {
                Slot::Narrow(self.data_address().offset(idx * 4))
            }

            kind => panic!("object of kind {:?} has no reference fields", kind),
        }
    }

    pub fn visit_reference_fields<F>(&self, classes: &ClassTable, mut f: F)
    where
        F: FnMut(Slot),
    {
        let start = self.data_address();

        match classes.get(self.class_id()).kind() {
            ClassKind::References(FieldEncoding::Wide) => {
                for idx in 0..self.length {
                    f(Slot::Wide(start.add_ptr(idx)));
                }
            }

            ClassKind::References(FieldEncoding::Narrow) => {
                for idx in 0..self.length {
                    f(Slot::Narrow(start.offset(idx * 4)));
                }
            }

            ClassKind::Data | ClassKind::Filler => {}
        }
    }

    /// Copies everything but the mark word, the copy starts with a fresh
    /// header of the given age.
    pub fn copy_to(&self, dest: Address, size: usize, age: u32) {
        debug_assert!(size >= OBJECT_HEADER_SIZE);
        let word = mem::ptr_width_usize();

        unsafe {
            ptr::copy_nonoverlapping(
                self.address().offset(word).to_ptr::<u8>(),
                dest.offset(word).to_mut_ptr::<u8>(),
                size - word,
            );
        }

        dest.to_obj().header().setup(age);
    }
}

pub fn object_size(kind: ClassKind, length: usize) -> usize {
    let body = match kind {
        ClassKind::References(FieldEncoding::Wide) => length * mem::ptr_width_usize(),
        ClassKind::References(FieldEncoding::Narrow) => {
            mem::align_usize_up(length * 4, mem::ptr_width_usize())
        }
        ClassKind::Data | ClassKind::Filler => length * mem::ptr_width_usize(),
    };

    OBJECT_HEADER_SIZE + body
}

/// Size of the object or filler word starting at `address`.
pub fn size_at(address: Address, classes: &ClassTable) -> usize {
    let raw = unsafe { (*address.to_ptr::<AtomicUsize>()).load(Ordering::Acquire) };

    if raw == FILLER_WORD {
        mem::ptr_width_usize()
    } else {
        address.to_obj().size(classes)
    }
}

/// No object data starts at `address`: a filler word or a filler object.
pub fn is_filler(address: Address) -> bool {
    let raw = unsafe { (*address.to_ptr::<AtomicUsize>()).load(Ordering::Acquire) };
    raw == FILLER_WORD || address.to_obj().class_id() == ClassId::FILLER
}

/// Makes `[start, end)` walkable: gaps shorter than an object header become
/// filler words, everything else a filler object.
pub fn fill_region(start: Address, end: Address) {
    if start == end {
        return;
    }

    let size = end.offset_from(start);
    let word = mem::ptr_width_usize();
    debug_assert_eq!(size % word, 0);

    if size < OBJECT_HEADER_SIZE {
        let mut curr = start;

        while curr < end {
            unsafe {
                (*curr.to_ptr::<AtomicUsize>()).store(FILLER_WORD, Ordering::Relaxed);
            }
            curr = curr.offset(word);
        }
    } else {
        let length = (size - OBJECT_HEADER_SIZE) / word;
        Obj::initialize(start, ClassId::FILLER, length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::class::ClassTable;

    fn words(n: usize) -> Vec<usize> {
        vec![0usize; n]
    }

    #[test]
    fn test_header_kinds() {
        let mut memory = words(8);
        let address = Address::from_ptr(memory.as_mut_ptr());
        let classes = ClassTable::new();

        assert_eq!(size_at(address, &classes), 8);

        Obj::initialize(address, ClassId::FILLER, 2);
        let obj = address.to_obj();
        assert_eq!(obj.header().age(), 0);
        assert!(!obj.header().is_forwarded());
        assert_eq!(obj.size(&classes), OBJECT_HEADER_SIZE + 16);
    }

    #[test]
    fn test_install_fwdptr_once() {
        let mut memory = words(8);
        let mut target = words(8);
        let mut other = words(8);
        let address = Address::from_ptr(memory.as_mut_ptr());
        let target = Address::from_ptr(target.as_mut_ptr());
        let other = Address::from_ptr(other.as_mut_ptr());

        Obj::initialize(address, ClassId::FILLER, 0);
        let header = address.to_obj().header();
        let expected = header.raw();

        assert_eq!(
            header.try_install_fwdptr(expected, target),
            ForwardResult::Forwarded
        );
        assert_eq!(
            header.try_install_fwdptr(expected, other),
            ForwardResult::AlreadyForwarded(target)
        );
        assert_eq!(header.forwardee(), Some(target));
    }

    #[test]
    fn test_fill_region() {
        let classes = ClassTable::new();
        let mut memory = words(16);
        let start = Address::from_ptr(memory.as_mut_ptr());

        fill_region(start, start.add_ptr(2));
        assert_eq!(size_at(start, &classes), 8);
        assert_eq!(size_at(start.add_ptr(1), &classes), 8);

        fill_region(start.add_ptr(2), start.add_ptr(16));
        assert_eq!(size_at(start.add_ptr(2), &classes), 14 * 8);
        assert!(is_filler(start));
        assert!(is_filler(start.add_ptr(2)));
    }

    #[test]
    fn test_object_size_narrow() {
        let narrow = ClassKind::References(FieldEncoding::Narrow);
        assert_eq!(object_size(narrow, 3), OBJECT_HEADER_SIZE + 16);
        assert_eq!(object_size(narrow, 4), OBJECT_HEADER_SIZE + 16);

        let wide = ClassKind::References(FieldEncoding::Wide);
        assert_eq!(object_size(wide, 3), OBJECT_HEADER_SIZE + 24);
    }
}
