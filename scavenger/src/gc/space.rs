use parking_lot::Mutex;

use crate::gc::{Address, Region};

/// Contiguous bump-pointer space.
pub struct Space {
    name: &'static str,
    region: Region,
    top: Mutex<Address>,
}

impl Space {
    pub fn new(name: &'static str, region: Region) -> Space {
        Space {
            name,
            region,
            top: Mutex::new(region.start()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn top(&self) -> Address {
        *self.top.lock()
    }

    pub fn used_region(&self) -> Region {
        Region::new(self.region.start(), self.top())
    }

    pub fn free(&self) -> usize {
        self.region.end().offset_from(self.top())
    }

    pub fn is_empty(&self) -> bool {
        self.top() == self.region.start()
    }

    #[inline(always)]
    pub fn contains(&self, addr: Address) -> bool {
        self.region.contains(addr)
    }

    pub fn allocate(&self, size: usize) -> Option<Address> {
        let mut top = self.top.lock();
        let object_start = *top;
        let object_end = object_start.offset(size);

        if object_end <= self.region.end() {
            *top = object_end;
            Some(object_start)
        } else {
            None
        }
    }

    /// Hands out a chunk of at least `min` and at most `max` bytes.
    pub fn allocate_lab(&self, min: usize, max: usize) -> Option<Region> {
        let mut top = self.top.lock();
        let free = self.region.end().offset_from(*top);

        if free < min {
            return None;
        }

        let size = std::cmp::min(free, max);
        let lab = top.region_start(size);
        *top = lab.end();

        Some(lab)
    }

    pub fn reset(&self) {
        *self.top.lock() = self.region.start();
    }
}
