//! Overlap pair registry.
//!
//! Every leaf owns an unordered, doubly linked list of the pairs it takes part
//! in. A pair is threaded through two lists at once (one thread per leaf), so
//! it can be spliced out of both in O(1) from its own links alone.

use rustc_hash::FxHashMap;

use crate::error::IndexError;
use crate::pool::{Handle, Pool};
use crate::types::CollisionId;

/// Identifies a tree within a shared context.
pub type TreeId = u32;

pub type PairId = Handle;

/// A leaf of some tree in the shared context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafKey {
    pub tree: TreeId,
    pub node: Handle,
}

/// One leaf's membership in a pair: links to the neighbouring pairs of that
/// leaf's list.
#[derive(Copy, Clone, Debug)]
struct Thread {
    prev: Option<PairId>,
    next: Option<PairId>,
    leaf: LeafKey,
}

#[derive(Clone, Debug)]
pub struct Pair {
    a: Thread,
    b: Thread,
    pub collision_id: CollisionId,
}

impl Pair {
    pub fn a(&self) -> LeafKey {
        self.a.leaf
    }

    pub fn b(&self) -> LeafKey {
        self.b.leaf
    }

    /// The endpoint that is not `leaf`.
    pub fn other(&self, leaf: LeafKey) -> LeafKey {
        if self.a.leaf == leaf { self.b.leaf } else { self.a.leaf }
    }

    /// Next pair in `leaf`'s list.
    pub fn next_for(&self, leaf: LeafKey) -> Option<PairId> {
        self.thread(leaf).next
    }

    fn thread(&self, leaf: LeafKey) -> &Thread {
        if self.a.leaf == leaf { &self.a } else { &self.b }
    }

    fn thread_mut(&mut self, leaf: LeafKey) -> &mut Thread {
        if self.a.leaf == leaf { &mut self.a } else { &mut self.b }
    }

    fn links(&self, leaf: LeafKey) -> bool {
        self.a.leaf == leaf || self.b.leaf == leaf
    }
}

pub struct PairRegistry {
    pairs: Pool<Pair>,
    heads: FxHashMap<LeafKey, PairId>,
}

impl PairRegistry {
    pub fn new(batch: usize) -> Self {
        Self { pairs: Pool::new(batch), heads: FxHashMap::default() }
    }

    pub fn get(&self, id: PairId) -> Option<&Pair> {
        self.pairs.get(id)
    }

    pub fn get_mut(&mut self, id: PairId) -> Option<&mut Pair> {
        self.pairs.get_mut(id)
    }

    /// First pair in `leaf`'s list.
    pub fn head(&self, leaf: LeafKey) -> Option<PairId> {
        self.heads.get(&leaf).copied()
    }

    /// Creates a pair and pushes it onto the front of both leaves' lists.
    pub fn insert(&mut self, a: LeafKey, b: LeafKey) -> Result<PairId, IndexError> {
        if a == b {
            return Err(IndexError::Corrupt("pair links a leaf to itself"));
        }
        let next_a = self.head(a);
        let next_b = self.head(b);
        let id = self.pairs.acquire(Pair {
            a: Thread { prev: None, next: next_a, leaf: a },
            b: Thread { prev: None, next: next_b, leaf: b },
            collision_id: 0,
        })?;

        if let Some(next) = next_a {
            self.pairs[next].thread_mut(a).prev = Some(id);
        }
        if let Some(next) = next_b {
            self.pairs[next].thread_mut(b).prev = Some(id);
        }
        self.heads.insert(a, id);
        self.heads.insert(b, id);
        Ok(id)
    }

    /// Splices the pair out of both lists and recycles it. Returns `false`
    /// for a stale id.
    pub fn unlink(&mut self, id: PairId) -> bool {
        let Some(pair) = self.pairs.get(id) else {
            return false;
        };
        let (a, b) = (pair.a.leaf, pair.b.leaf);
        self.unlink_thread(id, a);
        self.unlink_thread(id, b);
        self.pairs.release(id).is_some()
    }

    /// Removes every pair that references `leaf`, repairing the other
    /// endpoint's list each time. Returns the number of pairs removed.
    pub fn clear(&mut self, leaf: LeafKey) -> usize {
        let mut cursor = self.heads.remove(&leaf);
        let mut removed = 0;
        while let Some(id) = cursor {
            let pair = &self.pairs[id];
            let other = pair.other(leaf);
            cursor = pair.next_for(leaf);
            self.unlink_thread(id, other);
            self.pairs.release(id);
            removed += 1;
        }
        removed
    }

    /// The pair linking `a` and `b`, if any. Walks `a`'s list.
    pub fn find(&self, a: LeafKey, b: LeafKey) -> Option<PairId> {
        self.iter(a).find(|(_, pair)| pair.other(a) == b).map(|(id, _)| id)
    }

    pub fn iter(&self, leaf: LeafKey) -> PairIter<'_> {
        PairIter { registry: self, leaf, cursor: self.head(leaf) }
    }

    pub fn degree(&self, leaf: LeafKey) -> usize {
        self.iter(leaf).count()
    }

    pub fn live(&self) -> usize {
        self.pairs.live()
    }

    pub fn pooled(&self) -> usize {
        self.pairs.pooled()
    }

    /// Walks every list and checks the links: each pair reached from a leaf
    /// names that leaf, back links mirror forward links, and every live pair
    /// is reachable from both of its leaves.
    pub fn check(&self) -> Result<(), IndexError> {
        let mut threads = 0usize;
        for (&leaf, &head) in &self.heads {
            let mut prev = None;
            let mut cursor = Some(head);
            while let Some(id) = cursor {
                let pair = self
                    .pairs
                    .get(id)
                    .ok_or(IndexError::Corrupt("pair list reaches a recycled pair"))?;
                if !pair.links(leaf) {
                    return Err(IndexError::Corrupt("pair list holds a pair of another leaf"));
                }
                let thread = pair.thread(leaf);
                if thread.prev != prev {
                    return Err(IndexError::Corrupt("pair back link does not match list order"));
                }
                if thread.next == Some(id) {
                    return Err(IndexError::Corrupt("pair links to itself"));
                }
                threads += 1;
                if threads > 2 * self.pairs.live() {
                    return Err(IndexError::Corrupt("pair list is cyclic"));
                }
                prev = Some(id);
                cursor = thread.next;
            }
        }
        if threads != 2 * self.pairs.live() {
            return Err(IndexError::Corrupt("live pair not reachable from both leaves"));
        }
        Ok(())
    }

    fn unlink_thread(&mut self, id: PairId, leaf: LeafKey) {
        let Thread { prev, next, .. } = *self.pairs[id].thread(leaf);
        if let Some(next) = next {
            self.pairs[next].thread_mut(leaf).prev = prev;
        }
        match (prev, next) {
            (Some(prev), _) => self.pairs[prev].thread_mut(leaf).next = next,
            (None, Some(next)) => {
                self.heads.insert(leaf, next);
            }
            (None, None) => {
                self.heads.remove(&leaf);
            }
        }
    }
}

pub struct PairIter<'a> {
    registry: &'a PairRegistry,
    leaf: LeafKey,
    cursor: Option<PairId>,
}

impl<'a> Iterator for PairIter<'a> {
    type Item = (PairId, &'a Pair);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let pair = self.registry.pairs.get(id)?;
        self.cursor = pair.next_for(self.leaf);
        Some((id, pair))
    }
}
