//! Zero-sized hash builder for the arena's node sets.
//!
//! Node ids are small dense integers handed out by the arena, so HashDoS
//! resistance buys nothing here. `FastHashBuilder` hashes them with foldhash
//! and a fixed seed, and [`NodeSet`] is the ordered set used for every graph
//! edge list (sources, subscribers, pending notifications).

use indexmap::IndexSet;
use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

use crate::arena::NodeId;

/// A zero-sized BuildHasher that uses foldhash with a fixed seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x517cc1b727220a95).build_hasher()
    }
}

/// Insertion-ordered set of node ids.
///
/// Order matters: notifications are delivered in the order nodes were
/// marked, which keeps observer runs deterministic.
pub(crate) type NodeSet = IndexSet<NodeId, FastHashBuilder>;

pub(crate) fn node_set() -> NodeSet {
    IndexSet::with_hasher(FastHashBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_hash_builder_is_zero_sized() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn node_set_keeps_insertion_order() {
        let mut set = node_set();
        set.insert(NodeId::new(7));
        set.insert(NodeId::new(2));
        set.insert(NodeId::new(7));

        let order: Vec<_> = set.iter().map(|id| id.index()).collect();
        assert_eq!(order, vec![7, 2]);
    }
}
