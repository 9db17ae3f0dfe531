//! Dense id bitset consumed by health reconciliation.
//!
//! The repository supplies the set of transaction / ACL change-set ids it
//! knows about as a bitset; reconciliation walks it against the index's
//! faceted id counts. Word-packed, grow-on-set.

use serde::{Deserialize, Serialize};

const WORD_BITS: u64 = 64;

/// A growable bitset over `u64` ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdBitSet {
    words: Vec<u64>,
}

impl IdBitSet {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// An empty set pre-sized to hold ids up to `max_id`.
    #[must_use]
    pub fn with_max_id(max_id: u64) -> Self {
        let words = usize::try_from(max_id / WORD_BITS + 1).unwrap_or(0);
        Self {
            words: vec![0; words],
        }
    }

    /// Mark an id as present.
    pub fn set(&mut self, id: u64) {
        let word = usize::try_from(id / WORD_BITS).expect("id word index overflows usize");
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (id % WORD_BITS);
    }

    /// Whether an id is present.
    #[must_use]
    pub fn get(&self, id: u64) -> bool {
        usize::try_from(id / WORD_BITS)
            .ok()
            .and_then(|word| self.words.get(word))
            .is_some_and(|word| word & (1 << (id % WORD_BITS)) != 0)
    }

    /// Number of ids present.
    #[must_use]
    pub fn cardinality(&self) -> u64 {
        self.words.iter().map(|word| u64::from(word.count_ones())).sum()
    }
}

impl FromIterator<u64> for IdBitSet {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.set(id);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut set = IdBitSet::new();
        assert!(!set.get(0));
        set.set(0);
        set.set(63);
        set.set(64);
        set.set(1_000_000);
        assert!(set.get(0));
        assert!(set.get(63));
        assert!(set.get(64));
        assert!(set.get(1_000_000));
        assert!(!set.get(65));
    }

    #[test]
    fn cardinality_counts_distinct_ids() {
        let set: IdBitSet = [1, 2, 4, 4, 4].into_iter().collect();
        assert_eq!(set.cardinality(), 3);
    }

    #[test]
    fn presized_set_reads_within_bounds() {
        let set = IdBitSet::with_max_id(200);
        assert!(!set.get(200));
        assert_eq!(set.cardinality(), 0);
    }
}
