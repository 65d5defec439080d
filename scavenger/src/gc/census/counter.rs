use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Dead/live/total classification counts of one closure or one phase.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ObjectCounter {
    dead: u64,
    live: u64,
    total: u64,
}

impl ObjectCounter {
    pub fn new() -> ObjectCounter {
        ObjectCounter::default()
    }

    pub fn with_counts(dead: u64, live: u64) -> ObjectCounter {
        ObjectCounter {
            dead,
            live,
            total: dead + live,
        }
    }

    #[inline(always)]
    pub fn classify(&mut self, is_live: bool) {
        self.total += 1;

        if is_live {
            self.live += 1;
        } else {
            self.dead += 1;
        }
    }

    pub fn merge(&mut self, other: &ObjectCounter) {
        self.dead += other.dead;
        self.live += other.live;
        self.total += other.total;
    }

    /// Takes back counts previously merged from `other`.
    pub fn unmerge(&mut self, other: &ObjectCounter) {
        assert!(
            self.dead >= other.dead && self.live >= other.live && self.total >= other.total,
            "unmerging {:?} from smaller counter {:?}",
            other,
            self
        );

        self.dead -= other.dead;
        self.live -= other.live;
        self.total -= other.total;
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.dead + self.live
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn dead(&self) -> u64 {
        self.dead
    }

    pub fn live(&self) -> u64 {
        self.live
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl AddAssign for ObjectCounter {
    fn add_assign(&mut self, other: ObjectCounter) {
        self.merge(&other);
    }
}

impl Add for ObjectCounter {
    type Output = ObjectCounter;

    fn add(mut self, other: ObjectCounter) -> ObjectCounter {
        self.merge(&other);
        self
    }
}

impl SubAssign for ObjectCounter {
    fn sub_assign(&mut self, other: ObjectCounter) {
        self.unmerge(&other);
    }
}

impl Sub for ObjectCounter {
    type Output = ObjectCounter;

    fn sub(mut self, other: ObjectCounter) -> ObjectCounter {
        self.unmerge(&other);
        self
    }
}

impl Sum for ObjectCounter {
    fn sum<I: Iterator<Item = ObjectCounter>>(iter: I) -> ObjectCounter {
        iter.fold(ObjectCounter::new(), |acc, counter| acc + counter)
    }
}

impl<'a> Sum<&'a ObjectCounter> for ObjectCounter {
    fn sum<I: Iterator<Item = &'a ObjectCounter>>(iter: I) -> ObjectCounter {
        iter.fold(ObjectCounter::new(), |acc, counter| acc + *counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection;
    use proptest::prelude::*;

    #[test]
    fn test_classify() {
        let mut counter = ObjectCounter::new();
        counter.classify(true);
        counter.classify(false);
        counter.classify(true);

        assert_eq!(counter.live(), 2);
        assert_eq!(counter.dead(), 1);
        assert_eq!(counter.total(), 3);
        assert!(counter.is_consistent());
    }

    #[test]
    fn test_unmerge() {
        let mut outer = ObjectCounter::with_counts(3, 4);
        let inner = ObjectCounter::with_counts(1, 2);

        outer.unmerge(&inner);
        assert_eq!(outer, ObjectCounter::with_counts(2, 2));

        outer += inner;
        assert_eq!(outer, ObjectCounter::with_counts(3, 4));
    }

    #[test]
    #[should_panic(expected = "unmerging")]
    fn test_unmerge_underflow() {
        let mut counter = ObjectCounter::with_counts(0, 1);
        counter.unmerge(&ObjectCounter::with_counts(1, 0));
    }

    fn counter() -> impl Strategy<Value = ObjectCounter> {
        (0u64..1_000_000, 0u64..1_000_000)
            .prop_map(|(dead, live)| ObjectCounter::with_counts(dead, live))
    }

    fn classified() -> impl Strategy<Value = ObjectCounter> {
        proptest::collection::vec(any::<bool>(), 0..200).prop_map(|observations| {
            let mut counter = ObjectCounter::new();

            for is_live in observations {
                counter.classify(is_live);
            }

            counter
        })
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in counter(), b in counter()) {
            prop_assert_eq!(a + b, b + a);
        }

        #[test]
        fn merge_is_associative(a in counter(), b in counter(), c in counter()) {
            prop_assert_eq!((a + b) + c, a + (b + c));
        }

        #[test]
        fn merge_order_does_not_matter(mut counters in collection::vec(classified(), 0..16)) {
            let forward: ObjectCounter = counters.iter().sum();
            counters.reverse();
            let backward: ObjectCounter = counters.iter().sum();

            prop_assert_eq!(forward, backward);
            prop_assert!(forward.is_consistent());
        }

        #[test]
        fn classify_keeps_total(counter in classified()) {
            prop_assert!(counter.is_consistent());
        }
    }
}
