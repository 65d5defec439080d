use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::gc::Address;
use crate::gc::census::RootCategory;
use crate::gc::census::closures::OopClosure;
use crate::gc::class::{ClassLoaderDataGraph, ClassTable};

pub const NARROW_OOP_SHIFT: usize = 3;

/// Base and shift for narrow (32-bit) references. The base sits one word
/// below the heap so that no heap address encodes to zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressedOops {
    base: Address,
}

impl CompressedOops {
    pub fn new(heap_start: Address) -> CompressedOops {
        CompressedOops {
            base: heap_start.sub(1 << NARROW_OOP_SHIFT),
        }
    }

    #[inline(always)]
    pub fn decode(self, value: u32) -> Address {
        if value == 0 {
            Address::null()
        } else {
            self.base.offset((value as usize) << NARROW_OOP_SHIFT)
        }
    }

    #[inline(always)]
    pub fn encode(self, address: Address) -> u32 {
        if address.is_null() {
            0
        } else {
            let offset = address.offset_from(self.base) >> NARROW_OOP_SHIFT;
            match u32::try_from(offset) {
                Ok(value) => value,
                Err(_) => panic!("{} not encodable as narrow reference", address),
            }
        }
    }
}

/// Location of a reference: a full machine word or a compressed 32-bit value.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Slot {
    Wide(Address),
    Narrow(Address),
}

impl Slot {
    #[inline(always)]
    pub fn address(self) -> Address {
        match self {
            Slot::Wide(address) => address,
            Slot::Narrow(address) => address,
        }
    }

    /// Reads and decodes the reference stored in this slot. All closures go
    /// through here so both encodings behave the same.
    #[inline(always)]
    pub fn load(self, oops: CompressedOops) -> Address {
        match self {
            Slot::Wide(address) => {
                let value = unsafe { (*address.to_ptr::<AtomicUsize>()).load(Ordering::Relaxed) };
                value.into()
            }

            Slot::Narrow(address) => {
                let value = unsafe { (*address.to_ptr::<AtomicU32>()).load(Ordering::Relaxed) };
                oops.decode(value)
            }
        }
    }

    #[inline(always)]
    pub fn store(self, oops: CompressedOops, value: Address) {
        match self {
            Slot::Wide(address) => unsafe {
                (*address.to_ptr::<AtomicUsize>()).store(value.to_usize(), Ordering::Relaxed);
            },

            Slot::Narrow(address) => unsafe {
                (*address.to_ptr::<AtomicU32>()).store(oops.encode(value), Ordering::Relaxed);
            },
        }
    }
}

enum RootStorage {
    Wide(Box<[AtomicUsize]>),
    Narrow(Box<[AtomicU32]>),
}

/// Fixed number of reference slots outside of the managed heap.
pub struct RootArea {
    name: String,
    storage: RootStorage,
}

impl RootArea {
    pub fn wide(name: &str, len: usize) -> RootArea {
        RootArea {
            name: name.to_string(),
            storage: RootStorage::Wide((0..len).map(|_| AtomicUsize::new(0)).collect()),
        }
    }

    pub fn narrow(name: &str, len: usize) -> RootArea {
        RootArea {
            name: name.to_string(),
            storage: RootStorage::Narrow((0..len).map(|_| AtomicU32::new(0)).collect()),
        }
    }

    pub fn empty(name: &str) -> RootArea {
        RootArea::wide(name, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            RootStorage::Wide(slots) => slots.len(),
            RootStorage::Narrow(slots) => slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot(&self, idx: usize) -> Slot {
        match &self.storage {
            RootStorage::Wide(slots) => Slot::Wide(Address::from_ptr(&slots[idx] as *const _)),
            RootStorage::Narrow(slots) => Slot::Narrow(Address::from_ptr(&slots[idx] as *const _)),
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        (0..self.len()).map(move |idx| self.slot(idx))
    }

    pub fn get(&self, idx: usize, oops: CompressedOops) -> Address {
        self.slot(idx).load(oops)
    }

    pub fn set(&self, idx: usize, value: Address, oops: CompressedOops) {
        self.slot(idx).store(oops, value);
    }

    pub fn oops_do<C: OopClosure>(&self, closure: &mut C) {
        for slot in self.slots() {
            closure.do_oop(slot);
        }
    }
}

pub struct ThreadRoots {
    name: String,
    stack: RootArea,
    handles: RootArea,
}

impl ThreadRoots {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> &RootArea {
        &self.stack
    }

    pub fn handles(&self) -> &RootArea {
        &self.handles
    }

    pub fn oops_do<C: OopClosure>(&self, closure: &mut C) {
        self.stack.oops_do(closure);
        self.handles.oops_do(closure);
    }
}

/// Compiled code holding embedded references.
pub struct CodeBlob {
    name: String,
    oops: RootArea,
}

impl CodeBlob {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn oops(&self) -> &RootArea {
        &self.oops
    }
}

/// Every source of references from outside the managed heap, grouped by
/// category.
pub struct RootSet {
    pub global: RootArea,
    pub jni_handles: RootArea,
    pub threads: Vec<ThreadRoots>,
    pub monitors: RootArea,
    pub profiler: RootArea,
    pub class_registry: RootArea,
    pub class_loader_graph: ClassLoaderDataGraph,
    pub management: RootArea,
    pub jvmti: RootArea,
    pub code_roots: Vec<CodeBlob>,
    pub references: RootArea,
    pub string_table: RootArea,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet {
            global: RootArea::empty("global"),
            jni_handles: RootArea::empty("jni_handles"),
            threads: Vec::new(),
            monitors: RootArea::empty("monitors"),
            profiler: RootArea::empty("profiler"),
            class_registry: RootArea::empty("class_registry"),
            class_loader_graph: ClassLoaderDataGraph::new(),
            management: RootArea::empty("management"),
            jvmti: RootArea::empty("jvmti"),
            code_roots: Vec::new(),
            references: RootArea::empty("references"),
            string_table: RootArea::empty("string_table"),
        }
    }

    /// Replaces the slot area of a category that is backed by a single
    /// area.
    pub fn set_area(&mut self, category: RootCategory, area: RootArea) {
        *self.area_mut(category) = area;
    }

    pub fn area(&self, category: RootCategory) -> &RootArea {
        match category {
            RootCategory::GlobalRoots => &self.global,
            RootCategory::JniHandles => &self.jni_handles,
            RootCategory::MonitorTable => &self.monitors,
            RootCategory::ProfilerRoots => &self.profiler,
            RootCategory::ClassRegistry => &self.class_registry,
            RootCategory::ManagementRoots => &self.management,
            RootCategory::JvmtiRoots => &self.jvmti,
            RootCategory::ReferenceRoots => &self.references,
            RootCategory::StringTable => &self.string_table,

            RootCategory::ThreadRoots
            | RootCategory::ClassLoaderGraph
            | RootCategory::CompiledCodeRoots => {
                panic!("category {} is not backed by a single area", category)
            }
        }
    }

    fn area_mut(&mut self, category: RootCategory) -> &mut RootArea {
        match category {
            RootCategory::GlobalRoots => &mut self.global,
            RootCategory::JniHandles => &mut self.jni_handles,
            RootCategory::MonitorTable => &mut self.monitors,
            RootCategory::ProfilerRoots => &mut self.profiler,
            RootCategory::ClassRegistry => &mut self.class_registry,
            RootCategory::ManagementRoots => &mut self.management,
            RootCategory::JvmtiRoots => &mut self.jvmti,
            RootCategory::ReferenceRoots => &mut self.references,
            RootCategory::StringTable => &mut self.string_table,

            RootCategory::ThreadRoots
            | RootCategory::ClassLoaderGraph
            | RootCategory::CompiledCodeRoots => {
                panic!("category {} is not backed by a single area", category)
            }
        }
    }

    pub fn add_thread(&mut self, name: &str, stack: usize, handles: usize) -> usize {
        let idx = self.threads.len();

        self.threads.push(ThreadRoots {
            name: name.to_string(),
            stack: RootArea::wide(name, stack),
            handles: RootArea::wide(name, handles),
        });

        idx
    }

    pub fn add_code_blob(&mut self, name: &str, oops: usize) -> usize {
        let idx = self.code_roots.len();

        self.code_roots.push(CodeBlob {
            name: name.to_string(),
            oops: RootArea::wide(name, oops),
        });

        idx
    }

    pub fn threads_oops_do<C: OopClosure>(&self, closure: &mut C) {
        for thread in &self.threads {
            thread.oops_do(closure);
        }
    }

    pub fn code_roots_do<C: OopClosure>(&self, closure: &mut C) {
        for blob in &self.code_roots {
            blob.oops.oops_do(closure);
        }
    }

    /// Root enumeration for one category. The class-loader graph also holds
    /// class metadata and is walked through `class_loader_graph` directly.
    pub fn oops_do<C: OopClosure>(&self, category: RootCategory, closure: &mut C) {
        match category {
            RootCategory::ThreadRoots => self.threads_oops_do(closure),
            RootCategory::CompiledCodeRoots => self.code_roots_do(closure),
            RootCategory::ClassLoaderGraph => {
                panic!("class-loader graph roots need a klass closure")
            }
            category => self.area(category).oops_do(closure),
        }
    }

    /// Visits every slot of every category, including the metadata of all
    /// classes in the class table.
    pub fn all_oops_do<C: OopClosure>(&self, classes: &ClassTable, closure: &mut C) {
        for category in RootCategory::ALL {
            if category == RootCategory::ClassLoaderGraph {
                self.class_loader_graph.handles_do(closure);

                for klass in classes.iter() {
                    klass.oops_do(closure);
                }
            } else {
                self.oops_do(category, closure);
            }
        }
    }
}

impl Default for RootSet {
    fn default() -> RootSet {
        RootSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::census::closures::OopClosure;

    struct CollectSlots(Vec<Slot>);

    impl OopClosure for CollectSlots {
        fn do_oop(&mut self, slot: Slot) {
            self.0.push(slot);
        }
    }

    #[test]
    fn test_narrow_encoding_keeps_null() {
        let oops = CompressedOops::new(0x10000.into());
        assert_eq!(oops.encode(Address::null()), 0);
        assert_eq!(oops.decode(0), Address::null());
        assert_eq!(oops.encode(0x10000.into()), 1);
        assert_eq!(oops.decode(oops.encode(0x10040.into())), 0x10040.into());
    }

    #[test]
    fn test_wide_and_narrow_slots_decode_alike() {
        let oops = CompressedOops::new(0x10000.into());
        let wide = RootArea::wide("wide", 1);
        let narrow = RootArea::narrow("narrow", 1);
        let target: Address = 0x12340.into();

        wide.set(0, target, oops);
        narrow.set(0, target, oops);

        assert_eq!(wide.slot(0).load(oops), target);
        assert_eq!(narrow.slot(0).load(oops), target);
        assert!(matches!(narrow.slot(0), Slot::Narrow(_)));
    }

    #[test]
    fn test_root_set_enumeration() {
        let mut roots = RootSet::new();
        roots.set_area(RootCategory::GlobalRoots, RootArea::wide("global", 3));
        roots.add_thread("main", 2, 1);
        roots.add_thread("worker", 1, 0);
        roots.add_code_blob("foo", 2);

        let mut closure = CollectSlots(Vec::new());
        roots.oops_do(RootCategory::GlobalRoots, &mut closure);
        assert_eq!(closure.0.len(), 3);

        let mut closure = CollectSlots(Vec::new());
        roots.oops_do(RootCategory::ThreadRoots, &mut closure);
        assert_eq!(closure.0.len(), 4);

        let mut closure = CollectSlots(Vec::new());
        roots.oops_do(RootCategory::CompiledCodeRoots, &mut closure);
        assert_eq!(closure.0.len(), 2);

        let classes = ClassTable::new();
        let mut closure = CollectSlots(Vec::new());
        roots.all_oops_do(&classes, &mut closure);
        assert_eq!(closure.0.len(), 9);
    }

    #[test]
    #[should_panic(expected = "not backed by a single area")]
    fn test_thread_roots_have_no_single_area() {
        let roots = RootSet::new();
        roots.area(RootCategory::ThreadRoots);
    }
}
