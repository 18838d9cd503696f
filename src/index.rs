use glam::Vec2;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::api::SpatialIndex;
use crate::bounds::Aabb;
use crate::context::SharedContext;
use crate::error::IndexError;
use crate::pairs::{LeafKey, TreeId};
use crate::tree::{Leaf, Node, NodeId, Tree};
use crate::types::*;

/// Bounding-box provider: the object's current tight box.
pub type BbFn<O> = Box<dyn Fn(&O) -> Aabb>;

/// Velocity predictor used to stretch fat boxes along the direction of motion.
pub type VelocityFn<O> = Box<dyn Fn(&O) -> Vec2>;

/// Dynamic bounding-box tree with an incremental overlap-pair cache.
pub struct BbTree<O> {
    pub cfg: TreeConfig,
    pub(crate) role: TreeRole,
    pub(crate) tree_id: TreeId,
    pub(crate) ctx: SharedContext,
    pub(crate) bb_fn: BbFn<O>,
    velocity_fn: Option<VelocityFn<O>>,

    pub(crate) leaves: FxHashMap<ObjectId, NodeId>,
    pub(crate) tree: Tree<O>,

    // Reused leaf list for reindex passes.
    pub(crate) scratch: Vec<NodeId>,
    pub(crate) last_timing: Option<ReindexTiming>,
}

impl<O> BbTree<O> {
    /// Dynamic tree with a context of its own.
    pub fn new(cfg: TreeConfig, bb_fn: impl Fn(&O) -> Aabb + 'static) -> Self {
        let ctx = SharedContext::new(cfg.pool_batch);
        Self::with_context(cfg, bb_fn, &ctx, TreeRole::Dynamic)
    }

    /// Static partner of `dynamic`, sharing its clock and pair registry.
    pub fn new_static(cfg: TreeConfig, bb_fn: impl Fn(&O) -> Aabb + 'static, dynamic: &BbTree<O>) -> Self {
        Self::with_context(cfg, bb_fn, &dynamic.ctx, TreeRole::Static)
    }

    pub fn with_context(
        cfg: TreeConfig,
        bb_fn: impl Fn(&O) -> Aabb + 'static,
        ctx: &SharedContext,
        role: TreeRole,
    ) -> Self {
        let tree_id = ctx.register_tree(role);
        let tree = Tree::new(cfg.pool_batch);
        Self {
            cfg,
            role,
            tree_id,
            ctx: ctx.clone(),
            bb_fn: Box::new(bb_fn),
            velocity_fn: None,
            leaves: FxHashMap::default(),
            tree,
            scratch: Vec::new(),
            last_timing: None,
        }
    }

    /// Install a velocity predictor; fat boxes computed from now on get a
    /// margin and a bias toward the predicted motion.
    pub fn set_velocity_fn(&mut self, f: impl Fn(&O) -> Vec2 + 'static) {
        self.velocity_fn = Some(Box::new(f));
    }

    pub fn clear_velocity_fn(&mut self) {
        self.velocity_fn = None;
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn role(&self) -> TreeRole {
        self.role
    }

    /// Current tick of the shared clock.
    pub fn stamp(&self) -> Stamp {
        self.ctx.stamp()
    }

    pub fn get(&self, id: ObjectId) -> Option<&O> {
        let node = *self.leaves.get(&id)?;
        self.tree.leaf(node).map(|leaf| &leaf.obj)
    }

    /// Mutable access to an indexed object. Geometry changes are picked up
    /// by the next reindex.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut O> {
        let node = *self.leaves.get(&id)?;
        self.tree.leaf_mut(node).map(|leaf| &mut leaf.obj)
    }

    /// The stored (fat) box of an object.
    pub fn fat_bb(&self, id: ObjectId) -> Option<Aabb> {
        self.leaf_of(id).map(|leaf| leaf.bb)
    }

    /// Tick at which the object was last placed in the tree.
    pub fn leaf_stamp(&self, id: ObjectId) -> Option<Stamp> {
        self.leaf_of(id).map(|leaf| leaf.stamp)
    }

    /// Number of cached pairs the object takes part in.
    pub fn cached_pair_count(&self, id: ObjectId) -> Option<usize> {
        let node = *self.leaves.get(&id)?;
        Some(self.ctx.state().pairs.degree(self.leaf_key(node)))
    }

    /// Remove every object and its pairs, keeping the configuration.
    pub fn clear(&mut self) {
        {
            let mut ctx = self.ctx.state_mut();
            for &node in self.leaves.values() {
                ctx.pairs.clear(self.leaf_key(node));
            }
            ctx.forget_tree(self.tree_id);
        }
        self.leaves.clear();
        self.tree.clear();
    }

    /// Rebuild the hierarchy top-down for better query performance. Cached
    /// pairs are kept.
    pub fn optimize(&mut self) -> Result<(), IndexError> {
        self.tree.optimize()?;
        trace!(leaves = self.leaves.len(), depth = self.tree.depth(), "optimized tree");
        Ok(())
    }

    /// Return debug statistics for the tree and its shared context.
    pub fn debug_stats(&self) -> TreeStats {
        let ctx = self.ctx.state();
        TreeStats {
            leaves: self.leaves.len(),
            internal_nodes: self.tree.nodes.live() - self.leaves.len(),
            pooled_nodes: self.tree.nodes.pooled(),
            live_pairs: ctx.pairs.live(),
            pooled_pairs: ctx.pairs.pooled(),
            depth: self.tree.depth(),
            stamp: ctx.clock,
        }
    }

    /// Return timing breakdown for the last `reindex_query` pass.
    pub fn timing(&self) -> Option<ReindexTiming> {
        self.last_timing
    }

    /// Check every structural invariant. Box containment of object geometry
    /// only holds after a reindex, so call this right after one.
    pub fn validate(&self) -> Result<(), IndexError> {
        let reached = self.tree.check()?;
        if reached != self.leaves.len() {
            return Err(IndexError::Corrupt("tree leaf count differs from the id map"));
        }
        let ctx = self.ctx.state();
        for (&id, &node) in &self.leaves {
            let leaf = self
                .tree
                .leaf(node)
                .ok_or(IndexError::Corrupt("indexed id does not name a leaf"))?;
            if leaf.id != id {
                return Err(IndexError::Corrupt("leaf carries a different id"));
            }
            if !leaf.bb.contains(&(self.bb_fn)(&leaf.obj)) {
                return Err(IndexError::Corrupt("leaf box does not contain its object"));
            }
            for (_, pair) in ctx.pairs.iter(self.leaf_key(node)) {
                let other = pair.other(self.leaf_key(node));
                if other.tree == self.tree_id && self.tree.leaf(other.node).is_none() {
                    return Err(IndexError::Corrupt("pair references a removed leaf"));
                }
            }
        }
        ctx.pairs.check()
    }

    pub(crate) fn leaf_key(&self, node: NodeId) -> LeafKey {
        LeafKey { tree: self.tree_id, node }
    }

    fn leaf_of(&self, id: ObjectId) -> Option<&Leaf<O>> {
        self.leaves.get(&id).and_then(|&node| self.tree.leaf(node))
    }

    /// Fat box for `obj`: the tight box, stretched by the configured margin
    /// and the predicted motion when a velocity predictor is installed.
    pub(crate) fn fatten(&self, obj: &O) -> Aabb {
        let bb = (self.bb_fn)(obj);
        let Some(velocity_fn) = &self.velocity_fn else {
            return bb;
        };
        let coef = self.cfg.margin_fraction;
        let x = (bb.r() - bb.l()) * coef;
        let y = (bb.t() - bb.b()) * coef;
        let v = velocity_fn(obj) * self.cfg.velocity_scale;
        Aabb::new(
            bb.l() + (-x).min(v.x),
            bb.b() + (-y).min(v.y),
            bb.r() + x.max(v.x),
            bb.t() + y.max(v.y),
        )
    }
}

impl<O> SpatialIndex<O> for BbTree<O> {
    fn insert(&mut self, obj: O, id: ObjectId) -> Result<(), IndexError> {
        if self.leaves.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        let bb = self.fatten(&obj);
        let stamp = self.ctx.stamp();
        let node = self
            .tree
            .nodes
            .acquire(Node::Leaf(Leaf { obj, id, bb, parent: None, stamp }))?;
        if let Err(err) = self.tree.insert_leaf(node) {
            self.tree.nodes.release(node);
            return Err(err);
        }
        self.leaves.insert(id, node);
        trace!(id, stamp, "inserted leaf");

        self.add_pairs(node)?;
        self.ctx.state_mut().increment_stamp();
        Ok(())
    }

    fn remove(&mut self, id: ObjectId) -> Result<O, IndexError> {
        let node = *self.leaves.get(&id).ok_or(IndexError::UnknownId(id))?;
        if self.tree.leaf(node).is_none() {
            return Err(IndexError::Corrupt("indexed id does not name a leaf"));
        }
        self.tree.remove_leaf(node)?;
        self.leaves.remove(&id);
        let dropped = {
            let mut ctx = self.ctx.state_mut();
            ctx.unqueue(self.leaf_key(node));
            ctx.pairs.clear(self.leaf_key(node))
        };
        trace!(id, dropped, "removed leaf");
        match self.tree.nodes.release(node) {
            Some(Node::Leaf(leaf)) => Ok(leaf.obj),
            _ => Err(IndexError::Corrupt("indexed id does not name a leaf")),
        }
    }

    fn contains(&self, id: ObjectId) -> bool {
        self.leaves.contains_key(&id)
    }

    fn count(&self) -> usize {
        self.leaves.len()
    }

    fn each<F: FnMut(&O)>(&self, mut f: F) {
        for &node in self.leaves.values() {
            if let Some(leaf) = self.tree.leaf(node) {
                f(&leaf.obj);
            }
        }
    }

    fn query<F: FnMut(&O)>(&self, bb: Aabb, mut f: F) {
        self.tree.visit_overlapping(self.tree.root, &bb, |_, leaf| f(&leaf.obj));
    }

    fn segment_query<F>(&self, query: SegmentQuery, t_exit: f32, mut f: F) -> f32
    where
        F: FnMut(&O, &SegmentQuery) -> f32,
    {
        self.tree.segment_query(&query, t_exit, &mut f)
    }

    fn reindex(&mut self) -> Result<(), IndexError> {
        self.reindex_query_with(None, |_, _, id| id)
    }

    fn reindex_object(&mut self, id: ObjectId) -> Result<(), IndexError> {
        let node = *self.leaves.get(&id).ok_or(IndexError::UnknownId(id))?;
        if self.leaf_update(node)? {
            self.add_pairs(node)?;
        }
        self.ctx.state_mut().increment_stamp();
        Ok(())
    }

    fn reindex_query<F>(&mut self, f: F) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId,
    {
        self.reindex_query_with(None, f)
    }
}

impl<O> Drop for BbTree<O> {
    fn drop(&mut self) {
        // Pairs may point into this tree from a partner's lists.
        if let Some(mut ctx) = self.ctx.try_state_mut() {
            for &node in self.leaves.values() {
                ctx.pairs.clear(LeafKey { tree: self.tree_id, node });
            }
            ctx.release_tree(self.tree_id, self.role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> BbTree<Aabb> {
        BbTree::new(TreeConfig::default(), |bb: &Aabb| *bb)
    }

    #[test]
    fn test_insert_contains_count() {
        let mut t = tree();
        t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        t.insert(Aabb::new(2.0, 0.0, 3.0, 1.0), 2).unwrap();
        assert!(t.contains(1));
        assert!(!t.contains(3));
        assert_eq!(t.count(), 2);
        assert_eq!(t.remove(1).unwrap(), Aabb::new(0.0, 0.0, 1.0, 1.0));
        assert!(!t.contains(1));
        assert_eq!(t.count(), 1);
        t.validate().unwrap();
    }

    #[test]
    fn test_duplicate_insert_rejected_and_tree_unchanged() {
        let mut t = tree();
        t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), 7).unwrap();
        let before = t.debug_stats();
        let err = t.insert(Aabb::new(5.0, 5.0, 6.0, 6.0), 7).unwrap_err();
        assert_eq!(err, IndexError::DuplicateId(7));
        assert_eq!(t.get(7), Some(&Aabb::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(t.debug_stats(), before);
    }

    #[test]
    fn test_unknown_id_errors() {
        let mut t = tree();
        assert_eq!(t.remove(3).unwrap_err(), IndexError::UnknownId(3));
        assert_eq!(t.reindex_object(3).unwrap_err(), IndexError::UnknownId(3));
    }

    #[test]
    fn test_insert_discovers_pairs_immediately() {
        let mut t = tree();
        t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        t.insert(Aabb::new(0.5, 0.5, 1.5, 1.5), 2).unwrap();
        t.insert(Aabb::new(10.0, 10.0, 11.0, 11.0), 3).unwrap();
        assert_eq!(t.cached_pair_count(1), Some(1));
        assert_eq!(t.cached_pair_count(2), Some(1));
        assert_eq!(t.cached_pair_count(3), Some(0));
        assert_eq!(t.debug_stats().live_pairs, 1);
        t.validate().unwrap();
    }

    #[test]
    fn test_remove_drops_pairs() {
        let mut t = tree();
        t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        t.insert(Aabb::new(0.5, 0.5, 1.5, 1.5), 2).unwrap();
        t.remove(2).unwrap();
        assert_eq!(t.cached_pair_count(1), Some(0));
        assert_eq!(t.debug_stats().live_pairs, 0);
        t.validate().unwrap();
    }

    #[test]
    fn test_failed_remove_keeps_id_indexed() {
        let mut t = tree();
        t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        t.insert(Aabb::new(2.0, 0.0, 3.0, 1.0), 2).unwrap();
        // detach leaf 1 from its parent behind the tree's back
        let node = t.leaves[&1];
        t.tree.leaf_mut(node).unwrap().parent = None;
        assert!(matches!(t.remove(1), Err(IndexError::Corrupt(_))));
        assert!(t.contains(1));
        assert_eq!(t.count(), 2);
    }

    #[test]
    fn test_velocity_fattening() {
        let mut t = tree();
        t.set_velocity_fn(|_| Vec2::new(10.0, 0.0));
        t.insert(Aabb::new(0.0, 0.0, 2.0, 2.0), 1).unwrap();
        // margin 0.2 per side, motion +1.0 along x
        assert_eq!(t.fat_bb(1), Some(Aabb::new(-0.2, -0.2, 3.0, 2.2)));
    }

    #[test]
    fn test_clear_and_stamp() {
        let mut t = tree();
        for i in 0..5 {
            t.insert(Aabb::new(0.0, 0.0, 1.0, 1.0), i).unwrap();
        }
        assert_eq!(t.stamp(), 5);
        assert_eq!(t.debug_stats().live_pairs, 10);
        t.clear();
        assert_eq!(t.count(), 0);
        assert_eq!(t.debug_stats().live_pairs, 0);
        assert_eq!(t.debug_stats().internal_nodes, 0);
        t.validate().unwrap();
    }
}
