//! State shared by a dynamic tree and its static partner: the tick clock, the
//! pair registry, and leaves still waiting for cross-tree pair discovery.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::IndexError;
use crate::pairs::{LeafKey, PairRegistry, TreeId};
use crate::types::{Stamp, TreeRole};

pub(crate) struct ContextState {
    pub clock: Stamp,
    pub pairs: PairRegistry,
    next_tree: TreeId,
    /// Live static-role trees.
    static_trees: usize,
    /// Leaves placed outside a reindex pass that still have to be matched
    /// against the opposite-role tree. At most one entry per live leaf.
    pending: FxHashSet<LeafKey>,
}

impl ContextState {
    pub fn increment_stamp(&mut self) {
        self.clock += 1;
    }

    pub fn has_static(&self) -> bool {
        self.static_trees > 0
    }

    pub fn queue(&mut self, leaf: LeafKey) {
        self.pending.insert(leaf);
    }

    pub fn unqueue(&mut self, leaf: LeafKey) {
        self.pending.remove(&leaf);
    }

    /// Removes and returns the queued leaves of `trees`.
    pub fn take_pending(&mut self, trees: [TreeId; 2]) -> Vec<LeafKey> {
        let mut taken = Vec::new();
        self.pending.retain(|key| {
            if trees.contains(&key.tree) {
                taken.push(*key);
                false
            } else {
                true
            }
        });
        taken.sort_unstable();
        taken
    }

    pub fn forget_tree(&mut self, tree: TreeId) {
        self.pending.retain(|key| key.tree != tree);
    }

    /// Drops a tree for good. Once no static tree is left nothing can drain
    /// the queue, so it is emptied.
    pub fn release_tree(&mut self, tree: TreeId, role: TreeRole) {
        self.forget_tree(tree);
        if role == TreeRole::Static {
            self.static_trees = self.static_trees.saturating_sub(1);
        }
        if self.static_trees == 0 {
            self.pending.clear();
        }
    }
}

/// Handle to the clock and pair registry shared between trees.
///
/// Cloning the handle shares the state; a static tree is built from its
/// dynamic partner's context so both observe one logical clock.
#[derive(Clone)]
pub struct SharedContext(Rc<RefCell<ContextState>>);

impl SharedContext {
    /// New context whose pair pool grows `pair_batch` records at a time.
    pub fn new(pair_batch: usize) -> Self {
        Self(Rc::new(RefCell::new(ContextState {
            clock: 0,
            pairs: PairRegistry::new(pair_batch),
            next_tree: 0,
            static_trees: 0,
            pending: FxHashSet::default(),
        })))
    }

    /// Current tick.
    pub fn stamp(&self) -> Stamp {
        self.0.borrow().clock
    }

    /// Live pairs across every tree of this context.
    pub fn live_pairs(&self) -> usize {
        self.0.borrow().pairs.live()
    }

    /// Leaves still waiting for cross-tree pair discovery.
    pub fn pending_len(&self) -> usize {
        self.0.borrow().pending.len()
    }

    /// Checks the consistency of every pair list.
    pub fn check_pairs(&self) -> Result<(), IndexError> {
        self.0.borrow().pairs.check()
    }

    pub(crate) fn register_tree(&self, role: TreeRole) -> TreeId {
        let mut state = self.0.borrow_mut();
        let id = state.next_tree;
        state.next_tree += 1;
        if role == TreeRole::Static {
            state.static_trees += 1;
        }
        id
    }

    pub(crate) fn state(&self) -> Ref<'_, ContextState> {
        self.0.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, ContextState> {
        self.0.borrow_mut()
    }

    pub(crate) fn try_state_mut(&self) -> Option<RefMut<'_, ContextState>> {
        self.0.try_borrow_mut().ok()
    }

    pub(crate) fn same_as(&self, other: &SharedContext) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new(32)
    }
}
