use std::ptr;

use crate::gc::{Address, Region};
use crate::mem;

/// Anonymous read-write mapping, unmapped on drop.
pub struct Reservation {
    start: Address,
    size: usize,
}

impl Reservation {
    pub fn start(&self) -> Address {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn region(&self) -> Region {
        self.start.region_start(self.size)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let res = unsafe { libc::munmap(self.start.to_mut_ptr::<libc::c_void>(), self.size) };

        if res != 0 {
            panic!("munmap() failed");
        }
    }
}

unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

/// Reserves and commits `size` bytes of zeroed memory. The returned region
/// starts at an address aligned to `align` (a power of two).
pub fn reserve_align(size: usize, align: usize) -> Reservation {
    debug_assert!(mem::is_os_page_aligned(size));
    debug_assert!(align.is_power_of_two());

    let align = align.max(mem::os_page_size());
    let unaligned_size = size + align;

    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            unaligned_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        panic!("reserving memory with mmap() failed");
    }

    let unaligned_start = Address::from_ptr(ptr);
    let start: Address = mem::align_usize_up(unaligned_start.to_usize(), align).into();

    let gap_start = start.offset_from(unaligned_start);
    if gap_start > 0 {
        uncommit(unaligned_start, gap_start);
    }

    let gap_end = unaligned_size - gap_start - size;
    if gap_end > 0 {
        uncommit(start.offset(size), gap_end);
    }

    Reservation { start, size }
}

fn uncommit(start: Address, size: usize) {
    let res = unsafe { libc::munmap(start.to_mut_ptr::<libc::c_void>(), size) };

    if res != 0 {
        panic!("munmap() failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_align() {
        let page = mem::os_page_size();
        let reservation = reserve_align(4 * page, 64 * 1024);
        assert!(mem::is_aligned(reservation.start().to_usize(), 64 * 1024));
        assert_eq!(reservation.region().size(), 4 * page);

        unsafe {
            let first = reservation.start().to_mut_ptr::<usize>();
            assert_eq!(*first, 0);
            *first = 42;
            assert_eq!(*first, 42);
        }
    }
}
