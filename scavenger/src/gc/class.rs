use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::gc::census::closures::{KlassClosure, OopClosure};
use crate::gc::root::RootArea;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(u32);

impl ClassId {
    pub const FILLER: ClassId = ClassId(0);

    pub fn to_usize(self) -> usize {
        self.0 as usize
    }

    pub fn from_usize(value: usize) -> ClassId {
        match u32::try_from(value) {
            Ok(id) => ClassId(id),
            Err(_) => panic!("class id {} out of range", value),
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Width of the reference fields of an object.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FieldEncoding {
    Wide,
    Narrow,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ClassKind {
    /// unused heap memory, `length` words of payload
    Filler,
    /// every field holds a reference
    References(FieldEncoding),
    /// `length` words of raw data
    Data,
}

/// Class metadata. Lives outside the managed heap but may hold references
/// into it (static fields, the class mirror). The modified-oops flag plays
/// the role of the card table for metadata: it is set when one of those
/// references may point into the young generation.
pub struct Klass {
    id: ClassId,
    name: String,
    kind: ClassKind,
    modified_oops: AtomicBool,
    statics: RootArea,
}

impl Klass {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn statics(&self) -> &RootArea {
        &self.statics
    }

    pub fn has_modified_oops(&self) -> bool {
        self.modified_oops.load(Ordering::Relaxed)
    }

    pub fn record_modified_oops(&self) {
        self.modified_oops.store(true, Ordering::Relaxed);
    }

    pub fn clear_modified_oops(&self) {
        self.modified_oops.store(false, Ordering::Relaxed);
    }

    pub fn oops_do<C: OopClosure>(&self, closure: &mut C) {
        self.statics.oops_do(closure);
    }
}

pub struct ClassTable {
    classes: Vec<Klass>,
}

impl ClassTable {
    pub fn new() -> ClassTable {
        let mut table = ClassTable {
            classes: Vec::new(),
        };

        let filler = table.register("<filler>", ClassKind::Filler);
        assert_eq!(filler, ClassId::FILLER);

        table
    }

    pub fn register(&mut self, name: &str, kind: ClassKind) -> ClassId {
        self.register_with_statics(name, kind, 0)
    }

    pub fn register_with_statics(
        &mut self,
        name: &str,
        kind: ClassKind,
        statics: usize,
    ) -> ClassId {
        let id = ClassId::from_usize(self.classes.len());

        self.classes.push(Klass {
            id,
            name: name.to_string(),
            kind,
            modified_oops: AtomicBool::new(false),
            statics: RootArea::wide(name, statics),
        });

        id
    }

    #[inline(always)]
    pub fn get(&self, id: ClassId) -> &Klass {
        match self.classes.get(id.to_usize()) {
            Some(klass) => klass,
            None => panic!("unknown class {}", id),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Klass> {
        self.classes.iter()
    }
}

/// Holder of the classes defined by one class loader, plus the handles the
/// loader keeps alive.
pub struct ClassLoaderData {
    name: String,
    handles: RootArea,
    classes: Vec<ClassId>,
}

impl ClassLoaderData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self) -> &RootArea {
        &self.handles
    }

    pub fn classes(&self) -> &[ClassId] {
        &self.classes
    }
}

#[derive(Default)]
pub struct ClassLoaderDataGraph {
    loaders: Vec<ClassLoaderData>,
}

impl ClassLoaderDataGraph {
    pub fn new() -> ClassLoaderDataGraph {
        ClassLoaderDataGraph::default()
    }

    pub fn add_loader(&mut self, name: &str, handles: usize, classes: Vec<ClassId>) -> usize {
        let idx = self.loaders.len();

        self.loaders.push(ClassLoaderData {
            name: name.to_string(),
            handles: RootArea::wide(name, handles),
            classes,
        });

        idx
    }

    pub fn loader(&self, idx: usize) -> &ClassLoaderData {
        &self.loaders[idx]
    }

    pub fn loaders(&self) -> &[ClassLoaderData] {
        &self.loaders
    }

    /// Visits the handles of every loader.
    pub fn handles_do<C: OopClosure>(&self, closure: &mut C) {
        for loader in &self.loaders {
            loader.handles.oops_do(closure);
        }
    }

    /// Visits every class of every loader.
    pub fn classes_do<K: KlassClosure>(&self, classes: &ClassTable, closure: &mut K) {
        for loader in &self.loaders {
            for &class_id in &loader.classes {
                closure.do_klass(classes.get(class_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_table() {
        let mut classes = ClassTable::new();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes.get(ClassId::FILLER).kind(), ClassKind::Filler);

        let node = classes.register("Node", ClassKind::References(FieldEncoding::Wide));
        let holder = classes.register_with_statics("Holder", ClassKind::Data, 2);

        assert_eq!(classes.get(node).name(), "Node");
        assert_eq!(classes.get(holder).statics().len(), 2);
        assert_eq!(classes.len(), 3);
    }

    #[test]
    fn test_modified_oops_flag() {
        let mut classes = ClassTable::new();
        let id = classes.register_with_statics("Holder", ClassKind::Data, 1);
        let klass = classes.get(id);

        assert!(!klass.has_modified_oops());
        klass.record_modified_oops();
        assert!(klass.has_modified_oops());
        klass.clear_modified_oops();
        assert!(!klass.has_modified_oops());
    }

    struct CountKlasses(Vec<ClassId>);

    impl KlassClosure for CountKlasses {
        fn do_klass(&mut self, klass: &Klass) {
            self.0.push(klass.id());
        }
    }

    struct CountSlots(usize);

    impl OopClosure for CountSlots {
        fn do_oop(&mut self, _slot: crate::gc::root::Slot) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_loader_graph() {
        let mut classes = ClassTable::new();
        let a = classes.register_with_statics("A", ClassKind::Data, 1);
        let b = classes.register("B", ClassKind::Data);

        let mut graph = ClassLoaderDataGraph::new();
        graph.add_loader("boot", 2, vec![a]);
        graph.add_loader("app", 1, vec![b]);

        let mut slots = CountSlots(0);
        graph.handles_do(&mut slots);
        assert_eq!(slots.0, 3);

        let mut klasses = CountKlasses(Vec::new());
        graph.classes_do(&classes, &mut klasses);
        assert_eq!(klasses.0, vec![a, b]);
        assert_eq!(graph.loader(1).name(), "app");
    }

    #[test]
    #[should_panic(expected = "unknown class")]
    fn test_unknown_class() {
        let classes = ClassTable::new();
        classes.get(ClassId::from_usize(7));
    }
}
