use std::mem::size_of;

/// returns the width of a machine word in bytes
#[inline(always)]
pub const fn ptr_width() -> i32 {
    size_of::<*const u8>() as i32
}

#[inline(always)]
pub const fn ptr_width_usize() -> usize {
    size_of::<*const u8>()
}

/// returns true if given value is a multiple of a page size.
pub fn is_os_page_aligned(val: usize) -> bool {
    let align = os_page_size_bits();
    is_power_of_2_aligned(val, align)
}

/// returns true if value fulfills alignment requirement
pub fn is_power_of_2_aligned(val: usize, aligned_bits: usize) -> bool {
    let align = (1 << aligned_bits) - 1;

    val & align == 0
}

pub fn os_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    assert!(size > 0, "sysconf(_SC_PAGESIZE) failed");
    size as usize
}

fn os_page_size_bits() -> usize {
    os_page_size().trailing_zeros() as usize
}

/// round the given value up to the nearest multiple of the OS page size
pub fn os_page_align_up(val: usize) -> usize {
    align_usize_up(val, os_page_size())
}

/// round the given value up to the nearest multiple of `align`
#[inline(always)]
pub fn align_usize_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// round the given value down to the nearest multiple of `align`
#[inline(always)]
pub fn align_usize_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[inline(always)]
pub fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(0, align_usize_up(0, 8));
        assert_eq!(8, align_usize_up(1, 8));
        assert_eq!(8, align_usize_up(8, 8));
        assert_eq!(16, align_usize_up(9, 8));
        assert_eq!(8, align_usize_down(15, 8));
        assert!(is_aligned(4096, 512));
        assert!(!is_aligned(4100, 512));
    }

    #[test]
    fn test_page_size() {
        let page = os_page_size();
        assert!(page.is_power_of_two());
        assert!(is_os_page_aligned(page * 3));
        assert_eq!(page, os_page_align_up(1));
    }
}
