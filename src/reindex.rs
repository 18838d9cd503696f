//! Per-tick driver: refresh leaf boxes, relocate leaves that escaped their
//! fat box, then walk the tree once to discover new pairs and replay cached
//! ones through the caller's callback.

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::api::SpatialIndex;
use crate::error::IndexError;
use crate::index::BbTree;
use crate::pairs::{LeafKey, PairId};
use crate::tree::{Leaf, Node, NodeId};
use crate::types::{CollisionId, ReindexTiming, TreeRole};

impl<O> BbTree<O> {
    /// Refresh every leaf and report every candidate pair once, including
    /// pairs against `statics` when supplied. `statics` must share this
    /// tree's context.
    pub fn reindex_query_with<F>(&mut self, statics: Option<&BbTree<O>>, mut f: F) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        if let Some(statics) = statics {
            if !statics.ctx.same_as(&self.ctx) {
                return Err(IndexError::Corrupt("static tree does not share this tree's context"));
            }
        }
        if self.tree.root.is_none() {
            // Leaves inserted later discover every queued partner themselves.
            if let Some(statics) = statics {
                self.ctx.state_mut().take_pending([self.tree_id, statics.tree_id]);
            }
            return Ok(());
        }

        let t_all = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let has_static = self.ctx.state().has_static();
        let mut leaves = std::mem::take(&mut self.scratch);
        leaves.clear();
        self.tree.leaves_in_order(&mut leaves);

        let mut relocated = 0;
        for &node in &leaves {
            if self.leaf_update(node)? {
                relocated += 1;
                let queue = match self.role {
                    TreeRole::Static => true,
                    TreeRole::Dynamic => statics.is_none() && has_static,
                };
                if queue {
                    self.ctx.state_mut().queue(self.leaf_key(node));
                }
            }
        }
        let update_ms = t_all.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        let t_pending = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        if let (TreeRole::Dynamic, Some(statics)) = (self.role, statics) {
            self.discover_pending(statics)?;
        }
        let pending_ms = t_pending.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        let t_mark = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        if self.role == TreeRole::Dynamic {
            // Relocation reshaped the tree; mark in the new order.
            leaves.clear();
            self.tree.leaves_in_order(&mut leaves);
            for &node in &leaves {
                self.mark_leaf(node, statics, &mut f)?;
            }
        }
        let mark_ms = t_mark.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        self.scratch = leaves;
        let stamp = {
            let mut ctx = self.ctx.state_mut();
            ctx.increment_stamp();
            ctx.clock
        };

        if let Some(t_all) = t_all {
            self.last_timing = Some(ReindexTiming {
                total_ms: t_all.elapsed().as_secs_f64() * 1000.0,
                update_ms,
                pending_ms,
                mark_ms,
                relocated,
            });
        }
        debug!(
            leaves = self.leaves.len(),
            relocated,
            pairs = self.ctx.live_pairs(),
            stamp,
            "reindex pass complete"
        );
        Ok(())
    }

    /// Full pass, then a brute-force query of every object against a static
    /// index that is not a tree of this context. Those overlaps are not
    /// cached and are reported every tick with collision id 0.
    pub fn reindex_query_against<S, F>(&mut self, statics: &S, mut f: F) -> Result<(), IndexError>
    where
        S: SpatialIndex<O>,
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        self.reindex_query_with(None, &mut f)?;
        self.collide_static(statics, f);
        Ok(())
    }

    /// Report every overlap between this tree's objects and `statics`, with
    /// collision id 0. Nothing is cached.
    pub fn collide_static<S, F>(&self, statics: &S, mut f: F)
    where
        S: SpatialIndex<O>,
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        if statics.count() == 0 {
            return;
        }
        for &node in self.leaves.values() {
            if let Some(leaf) = self.tree.leaf(node) {
                statics.query(leaf.bb, |obj| {
                    f(&leaf.obj, obj, 0);
                });
            }
        }
    }

    /// Re-fits a leaf whose tight box escaped its fat box: reinsert it with a
    /// fresh fat box, stamp it, and drop its pairs. Returns whether the leaf
    /// moved.
    ///
    /// Removal frees exactly the internal node reinsertion takes, so this
    /// never grows the pool.
    pub(crate) fn leaf_update(&mut self, node: NodeId) -> Result<bool, IndexError> {
        let leaf = self.tree.leaf(node).ok_or(IndexError::Corrupt("update reached a non-leaf"))?;
        if leaf.bb.contains(&(self.bb_fn)(&leaf.obj)) {
            return Ok(false);
        }
        let bb = self.fatten(&leaf.obj);
        let id = leaf.id;
        let stamp = self.ctx.stamp();

        self.tree.remove_leaf(node)?;
        if let Some(leaf) = self.tree.leaf_mut(node) {
            leaf.bb = bb;
            leaf.stamp = stamp;
        }
        self.tree.insert_leaf(node)?;
        let dropped = self.ctx.state_mut().pairs.clear(self.leaf_key(node));
        trace!(id, stamp, dropped, "relocated leaf");
        Ok(true)
    }

    /// Pair discovery for a leaf placed outside a reindex pass.
    pub(crate) fn add_pairs(&mut self, node: NodeId) -> Result<(), IndexError> {
        let key = self.leaf_key(node);
        match self.role {
            TreeRole::Dynamic => {
                self.mark_leaf(node, None, &mut |_: &O, _: &O, id: CollisionId| id)?;
                let mut ctx = self.ctx.state_mut();
                if ctx.has_static() {
                    ctx.queue(key);
                }
            }
            TreeRole::Static => self.ctx.state_mut().queue(key),
        }
        Ok(())
    }

    /// Matches queued leaves of both trees against the opposite tree. The
    /// stamp comparisons mirror the mark pass so no pair is created twice.
    fn discover_pending(&self, statics: &BbTree<O>) -> Result<(), IndexError> {
        let pending = self.ctx.state_mut().take_pending([self.tree_id, statics.tree_id]);
        if pending.is_empty() {
            return Ok(());
        }
        let now = self.ctx.stamp();
        let mut inserted = 0usize;
        for key in pending {
            if key.tree == statics.tree_id {
                let Some(s_leaf) = statics.tree.leaf(key.node) else {
                    continue;
                };
                self.tree.try_visit_overlapping(self.tree.root, &s_leaf.bb, |d_node, d_leaf| {
                    if d_leaf.stamp < s_leaf.stamp {
                        self.ctx.state_mut().pairs.insert(key, self.leaf_key(d_node))?;
                        inserted += 1;
                    }
                    Ok(())
                })?;
            } else {
                let Some(d_leaf) = self.tree.leaf(key.node) else {
                    continue;
                };
                // relocated this pass: the mark pass queries the statics
                if d_leaf.stamp == now {
                    continue;
                }
                statics.tree.try_visit_overlapping(statics.tree.root, &d_leaf.bb, |s_node, s_leaf| {
                    if s_leaf.stamp < d_leaf.stamp {
                        self.ctx.state_mut().pairs.insert(statics.leaf_key(s_node), key)?;
                        inserted += 1;
                    }
                    Ok(())
                })?;
            }
        }
        trace!(inserted, "matched pending leaves");
        Ok(())
    }

    /// Fresh leaves query the opposite subtree at every ancestor (and the
    /// static root); untouched leaves replay the pairs where they are side
    /// `b`. Leaves must be visited `a` children first for every pair to be
    /// reported exactly once.
    fn mark_leaf<F>(&self, node: NodeId, statics: Option<&BbTree<O>>, f: &mut F) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        let leaf = self.tree.leaf(node).ok_or(IndexError::Corrupt("mark pass reached a non-leaf"))?;
        let key = self.leaf_key(node);

        if leaf.stamp != self.ctx.stamp() {
            return self.replay_pairs(key, leaf, statics, f);
        }

        if let Some(statics) = statics {
            statics.tree.try_visit_overlapping(statics.tree.root, &leaf.bb, |s_node, s_leaf| {
                self.report_discovery(statics.leaf_key(s_node), s_leaf, key, leaf, &mut *f)
            })?;
        }

        let mut child = node;
        while let Some(parent) = self.tree.nodes[child].parent() {
            let Node::Internal(joint) = &self.tree.nodes[parent] else {
                return Err(IndexError::Corrupt("leaf parent is a leaf"));
            };
            if joint.a == child {
                // The other side reports these when it reaches them.
                self.tree.try_visit_overlapping(Some(joint.b), &leaf.bb, |other, _| {
                    self.ctx.state_mut().pairs.insert(key, self.leaf_key(other)).map(drop)
                })?;
            } else {
                self.tree.try_visit_overlapping(Some(joint.a), &leaf.bb, |other, other_leaf| {
                    self.report_discovery(self.leaf_key(other), other_leaf, key, leaf, &mut *f)
                })?;
            }
            child = parent;
        }
        Ok(())
    }

    /// Record (or look up) the pair `(other, leaf)` and report it.
    fn report_discovery<F>(
        &self,
        other_key: LeafKey,
        other: &Leaf<O>,
        key: LeafKey,
        leaf: &Leaf<O>,
        f: &mut F,
    ) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        let pair = if other.stamp < leaf.stamp {
            Some(self.ctx.state_mut().pairs.insert(other_key, key)?)
        } else {
            self.ctx.state().pairs.find(key, other_key)
        };
        // No context borrow is held while the callback runs.
        let collision_id = f(&leaf.obj, &other.obj, 0);
        if let Some(pair) = pair {
            self.set_collision_id(pair, collision_id);
        }
        Ok(())
    }

    fn replay_pairs<F>(&self, key: LeafKey, leaf: &Leaf<O>, statics: Option<&BbTree<O>>, f: &mut F) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        let mut cursor = self.ctx.state().pairs.head(key);
        while let Some(pair_id) = cursor {
            let (a, b, previous) = {
                let ctx = self.ctx.state();
                let pair = ctx.pairs.get(pair_id).ok_or(IndexError::Corrupt("pair list reaches a recycled pair"))?;
                cursor = pair.next_for(key);
                (pair.a(), pair.b(), pair.collision_id)
            };
            if b != key {
                continue;
            }
            match self.resolve(a, statics) {
                Some(a_obj) => {
                    let collision_id = f(a_obj, &leaf.obj, previous);
                    self.set_collision_id(pair_id, collision_id);
                }
                // Pairs against a static partner that was not supplied this pass.
                None if a.tree != self.tree_id && statics.is_none() => {}
                None => warn!(?a, ?b, "pair endpoint does not resolve to a live leaf"),
            }
        }
        Ok(())
    }

    fn resolve<'a>(&'a self, key: LeafKey, statics: Option<&'a BbTree<O>>) -> Option<&'a O> {
        let owner = if key.tree == self.tree_id {
            self
        } else {
            statics.filter(|s| s.tree_id == key.tree)?
        };
        owner.tree.leaf(key.node).map(|leaf| &leaf.obj)
    }

    fn set_collision_id(&self, pair: PairId, collision_id: CollisionId) {
        if let Some(pair) = self.ctx.state_mut().pairs.get_mut(pair) {
            pair.collision_id = collision_id;
        }
    }
}
