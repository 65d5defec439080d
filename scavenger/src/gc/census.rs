use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod closures;
pub mod container;
pub mod counter;
pub mod sink;
pub mod survey;
pub mod timing;

pub use self::container::AggregationContainer;
pub use self::counter::ObjectCounter;
pub use self::sink::{
    CensusRecord, CensusSink, LogSink, MemorySink, NullSink, PhaseRecord, RootRecord,
};
pub use self::timing::{ElapsedTimer, TimedScope};

/// Source of references outside the managed heap. Every root closure and
/// root record is attributed to exactly one category.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RootCategory {
    GlobalRoots,
    JniHandles,
    ThreadRoots,
    MonitorTable,
    ProfilerRoots,
    ClassRegistry,
    ClassLoaderGraph,
    ManagementRoots,
    JvmtiRoots,
    CompiledCodeRoots,
    ReferenceRoots,
    StringTable,
}

impl RootCategory {
    pub const ALL: [RootCategory; 12] = [
        RootCategory::GlobalRoots,
        RootCategory::JniHandles,
        RootCategory::ThreadRoots,
        RootCategory::MonitorTable,
        RootCategory::ProfilerRoots,
        RootCategory::ClassRegistry,
        RootCategory::ClassLoaderGraph,
        RootCategory::ManagementRoots,
        RootCategory::JvmtiRoots,
        RootCategory::CompiledCodeRoots,
        RootCategory::ReferenceRoots,
        RootCategory::StringTable,
    ];

    /// Strong categories, scanned by parallel root tasks. Reference roots
    /// and the string table are processed serially after the parallel phase.
    pub const STRONG_ROOTS: [RootCategory; 10] = [
        RootCategory::GlobalRoots,
        RootCategory::JniHandles,
        RootCategory::ThreadRoots,
        RootCategory::MonitorTable,
        RootCategory::ProfilerRoots,
        RootCategory::ClassRegistry,
        RootCategory::ClassLoaderGraph,
        RootCategory::ManagementRoots,
        RootCategory::JvmtiRoots,
        RootCategory::CompiledCodeRoots,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RootCategory::GlobalRoots => "global_roots",
            RootCategory::JniHandles => "jni_handles",
            RootCategory::ThreadRoots => "threads",
            RootCategory::MonitorTable => "monitors",
            RootCategory::ProfilerRoots => "profiler",
            RootCategory::ClassRegistry => "class_registry",
            RootCategory::ClassLoaderGraph => "class_loader_graph",
            RootCategory::ManagementRoots => "management",
            RootCategory::JvmtiRoots => "jvmti",
            RootCategory::CompiledCodeRoots => "code_roots",
            RootCategory::ReferenceRoots => "references",
            RootCategory::StringTable => "string_table",
        }
    }

    /// Record source name of a closure scanning this category, e.g.
    /// `scavenge_roots::threads`.
    pub fn identifier(self, closure: &str) -> String {
        format!("{}::{}", closure, self.name())
    }

    pub fn is_weak(self) -> bool {
        matches!(
            self,
            RootCategory::ReferenceRoots | RootCategory::StringTable
        )
    }

    /// Decodes a raw category tag. An unknown tag is a programming error.
    pub fn from_raw(tag: u8) -> RootCategory {
        match RootCategory::try_from(tag) {
            Ok(category) => category,
            Err(_) => panic!("unknown root category tag {}", tag),
        }
    }
}

impl fmt::Display for RootCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = RootCategory::ALL.iter().map(|c| c.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RootCategory::ALL.len());
    }

    #[test]
    fn test_identifier() {
        assert_eq!(
            RootCategory::ThreadRoots.identifier("scavenge_roots"),
            "scavenge_roots::threads"
        );
        assert_eq!(format!("{}", RootCategory::CompiledCodeRoots), "code_roots");
    }

    #[test]
    fn test_raw_tags() {
        for category in RootCategory::ALL {
            let tag: u8 = category.into();
            assert_eq!(RootCategory::from_raw(tag), category);
        }

        assert!(RootCategory::STRONG_ROOTS.iter().all(|c| !c.is_weak()));
    }

    #[test]
    #[should_panic(expected = "unknown root category tag 12")]
    fn test_unknown_tag() {
        RootCategory::from_raw(12);
    }
}
