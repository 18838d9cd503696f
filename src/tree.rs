//! Binary bounding-volume hierarchy over pooled nodes.
//!
//! Internal nodes always hold exactly two children and a box equal to the
//! union of their boxes; leaves carry the indexed object. This module only
//! knows about structure; pair bookkeeping lives in the reindex engine.

use crate::bounds::Aabb;
use crate::error::IndexError;
use crate::pool::{Handle, Pool};
use crate::types::{ObjectId, SegmentQuery, Stamp};

pub(crate) type NodeId = Handle;

pub(crate) struct Leaf<O> {
    pub obj: O,
    pub id: ObjectId,
    /// Fat box.
    pub bb: Aabb,
    pub parent: Option<NodeId>,
    /// Tick at which the leaf was last placed in the tree.
    pub stamp: Stamp,
}

pub(crate) struct Internal {
    pub bb: Aabb,
    pub parent: Option<NodeId>,
    pub a: NodeId,
    pub b: NodeId,
}

pub(crate) enum Node<O> {
    Leaf(Leaf<O>),
    Internal(Internal),
}

impl<O> Node<O> {
    pub fn bb(&self) -> Aabb {
        match self {
            Node::Leaf(leaf) => leaf.bb,
            Node::Internal(node) => node.bb,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(node) => node.parent,
        }
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(node) => node.parent = parent,
        }
    }
}

pub(crate) struct Tree<O> {
    pub nodes: Pool<Node<O>>,
    pub root: Option<NodeId>,
}

impl<O> Tree<O> {
    pub fn new(batch: usize) -> Self {
        Self { nodes: Pool::new(batch), root: None }
    }

    pub fn leaf(&self, id: NodeId) -> Option<&Leaf<O>> {
        match self.nodes.get(id) {
            Some(Node::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut Leaf<O>> {
        match self.nodes.get_mut(id) {
            Some(Node::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }

    fn bb(&self, id: NodeId) -> Aabb {
        self.nodes[id].bb()
    }

    /// Places a detached leaf into the tree.
    pub fn insert_leaf(&mut self, leaf: NodeId) -> Result<(), IndexError> {
        let root = self.subtree_insert(self.root, leaf)?;
        self.root = Some(root);
        Ok(())
    }

    /// Inserts `leaf` below `subtree` (whose top must have no parent) and
    /// returns the subtree's new top.
    fn subtree_insert(&mut self, subtree: Option<NodeId>, leaf: NodeId) -> Result<NodeId, IndexError> {
        let Some(top) = subtree else {
            return Ok(leaf);
        };
        let leaf_bb = self.bb(leaf);

        let mut target = top;
        while let Node::Internal(node) = &self.nodes[target] {
            target = self.cheaper_child(node, &leaf_bb);
        }

        let parent = self.nodes[target].parent();
        let bb = leaf_bb.merge(&self.bb(target));
        let joint = self.nodes.acquire(Node::Internal(Internal { bb, parent, a: leaf, b: target }))?;
        self.nodes[leaf].set_parent(Some(joint));
        self.nodes[target].set_parent(Some(joint));

        match parent {
            None => Ok(joint),
            Some(parent) => {
                self.replace_child(parent, target, joint)?;
                self.refit_from(Some(parent));
                Ok(top)
            }
        }
    }

    /// Child whose box grows the tree's total area the least when it absorbs
    /// `bb`; ties go to the child whose center is closer.
    fn cheaper_child(&self, node: &Internal, bb: &Aabb) -> NodeId {
        let a_bb = self.bb(node.a);
        let b_bb = self.bb(node.b);
        let mut cost_a = b_bb.area() + a_bb.merged_area(bb);
        let mut cost_b = a_bb.area() + b_bb.merged_area(bb);
        if cost_a == cost_b {
            cost_a = a_bb.proximity(bb);
            cost_b = b_bb.proximity(bb);
        }
        if cost_b < cost_a { node.b } else { node.a }
    }

    /// Detaches `leaf` from the tree, folding its sibling into the parent's
    /// slot. The leaf record itself stays allocated.
    pub fn remove_leaf(&mut self, leaf: NodeId) -> Result<(), IndexError> {
        if self.root == Some(leaf) {
            self.root = None;
            self.nodes[leaf].set_parent(None);
            return Ok(());
        }

        let parent = self.nodes[leaf]
            .parent()
            .ok_or(IndexError::Corrupt("detached leaf is not the root"))?;
        let (sibling, grand) = match &self.nodes[parent] {
            Node::Internal(node) => (if node.a == leaf { node.b } else { node.a }, node.parent),
            Node::Leaf(_) => return Err(IndexError::Corrupt("leaf parent is a leaf")),
        };

        match grand {
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].set_parent(None);
            }
            Some(grand) => self.replace_child(grand, parent, sibling)?,
        }
        self.nodes.release(parent);
        self.nodes[leaf].set_parent(None);
        self.refit_from(grand);
        Ok(())
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> Result<(), IndexError> {
        match &mut self.nodes[parent] {
            Node::Internal(node) if node.a == old => node.a = new,
            Node::Internal(node) if node.b == old => node.b = new,
            _ => return Err(IndexError::Corrupt("parent does not own the replaced child")),
        }
        self.nodes[new].set_parent(Some(parent));
        Ok(())
    }

    /// Recomputes boxes from `start` up to the root.
    fn refit_from(&mut self, start: Option<NodeId>) {
        let mut cursor = start;
        while let Some(id) = cursor {
            let (a, b, parent) = match &self.nodes[id] {
                Node::Internal(node) => (node.a, node.b, node.parent),
                Node::Leaf(_) => break,
            };
            let bb = self.bb(a).merge(&self.bb(b));
            if let Node::Internal(node) = &mut self.nodes[id] {
                node.bb = bb;
            }
            cursor = parent;
        }
    }

    fn join(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, IndexError> {
        let bb = self.bb(a).merge(&self.bb(b));
        let joint = self.nodes.acquire(Node::Internal(Internal { bb, parent: None, a, b }))?;
        self.nodes[a].set_parent(Some(joint));
        self.nodes[b].set_parent(Some(joint));
        Ok(joint)
    }

    /// Visits every leaf below `subtree` whose box intersects `bb`, `a`
    /// children first.
    pub fn try_visit_overlapping<E>(
        &self,
        subtree: Option<NodeId>,
        bb: &Aabb,
        mut f: impl FnMut(NodeId, &Leaf<O>) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut stack: Vec<NodeId> = subtree.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.bb().intersects(bb) {
                continue;
            }
            match node {
                Node::Leaf(leaf) => f(id, leaf)?,
                Node::Internal(node) => {
                    stack.push(node.b);
                    stack.push(node.a);
                }
            }
        }
        Ok(())
    }

    pub fn visit_overlapping(&self, subtree: Option<NodeId>, bb: &Aabb, mut f: impl FnMut(NodeId, &Leaf<O>)) {
        let visited: Result<(), core::convert::Infallible> = self.try_visit_overlapping(subtree, bb, |id, leaf| {
            f(id, leaf);
            Ok(())
        });
        match visited {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Leaves in depth-first order, `a` children first.
    pub fn leaves_in_order(&self, out: &mut Vec<NodeId>) {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            match &self.nodes[id] {
                Node::Leaf(_) => out.push(id),
                Node::Internal(node) => {
                    stack.push(node.b);
                    stack.push(node.a);
                }
            }
        }
    }

    /// Walks the segment nearest-box-first, pruning subtrees whose entry
    /// fraction is not below the current exit fraction. `f` returns the hit
    /// fraction for a leaf object, which clips the exit for the rest of the
    /// walk.
    pub fn segment_query(&self, query: &SegmentQuery, t_exit: f32, f: &mut impl FnMut(&O, &SegmentQuery) -> f32) -> f32 {
        match self.root {
            Some(root) if self.entry_fraction(root, query) < t_exit => self.subtree_segment_query(root, query, t_exit, f),
            _ => t_exit,
        }
    }

    fn subtree_segment_query(
        &self,
        id: NodeId,
        query: &SegmentQuery,
        mut t_exit: f32,
        f: &mut impl FnMut(&O, &SegmentQuery) -> f32,
    ) -> f32 {
        match &self.nodes[id] {
            Node::Leaf(leaf) => f(&leaf.obj, query),
            Node::Internal(node) => {
                let t_a = self.entry_fraction(node.a, query);
                let t_b = self.entry_fraction(node.b, query);
                let order = if t_a < t_b { [(node.a, t_a), (node.b, t_b)] } else { [(node.b, t_b), (node.a, t_a)] };
                for (child, t_child) in order {
                    if t_child < t_exit {
                        t_exit = t_exit.min(self.subtree_segment_query(child, query, t_exit, f));
                    }
                }
                t_exit
            }
        }
    }

    fn entry_fraction(&self, id: NodeId, query: &SegmentQuery) -> f32 {
        self.bb(id).inflate(query.radius).segment_fraction(query.from, query.to)
    }

    /// Rebuilds the hierarchy top-down from the current leaves. Leaf records
    /// (and therefore their pairs) are untouched.
    pub fn optimize(&mut self) -> Result<(), IndexError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let mut leaves = Vec::new();
        self.leaves_in_order(&mut leaves);
        self.release_internal(root);
        for &leaf in &leaves {
            self.nodes[leaf].set_parent(None);
        }
        // The released records cover every internal node the rebuild needs,
        // so partitioning never has to grow the pool.
        self.root = None;
        let root = self.partition(&mut leaves)?;
        self.root = Some(root);
        Ok(())
    }

    /// Recycles every node, leaves included.
    pub fn clear(&mut self) {
        let mut stack: Vec<NodeId> = self.root.take().into_iter().collect();
        while let Some(id) = stack.pop() {
            if let Some(Node::Internal(node)) = self.nodes.release(id) {
                stack.push(node.a);
                stack.push(node.b);
            }
        }
    }

    fn release_internal(&mut self, subtree: NodeId) {
        let mut stack = vec![subtree];
        while let Some(id) = stack.pop() {
            if let Node::Internal(node) = &self.nodes[id] {
                stack.push(node.a);
                stack.push(node.b);
                self.nodes.release(id);
            }
        }
    }

    fn partition(&mut self, leaves: &mut [NodeId]) -> Result<NodeId, IndexError> {
        let count = leaves.len();
        match count {
            0 => return Err(IndexError::Corrupt("partition of an empty leaf set")),
            1 => return Ok(leaves[0]),
            2 => return self.join(leaves[0], leaves[1]),
            _ => {}
        }

        let bb = leaves[1..].iter().fold(self.bb(leaves[0]), |acc, &id| acc.merge(&self.bb(id)));
        let split_width = bb.r() - bb.l() > bb.t() - bb.b();

        // median of the box edges along the longest axis
        let mut bounds: Vec<f32> = Vec::with_capacity(count * 2);
        for &id in leaves.iter() {
            let b = self.bb(id);
            if split_width {
                bounds.extend([b.l(), b.r()]);
            } else {
                bounds.extend([b.b(), b.t()]);
            }
        }
        bounds.sort_by(f32::total_cmp);
        let split = (bounds[count - 1] + bounds[count]) * 0.5;

        let (mut low, mut high) = (bb, bb);
        if split_width {
            low.max.x = split;
            high.min.x = split;
        } else {
            low.max.y = split;
            high.min.y = split;
        }

        let mut right = count;
        let mut left = 0;
        while left < right {
            let b = self.bb(leaves[left]);
            if b.merged_area(&high) < b.merged_area(&low) {
                right -= 1;
                leaves.swap(left, right);
            } else {
                left += 1;
            }
        }

        if right == count || right == 0 {
            let mut subtree = None;
            for &leaf in leaves.iter() {
                subtree = Some(self.subtree_insert(subtree, leaf)?);
            }
            return subtree.ok_or(IndexError::Corrupt("partition of an empty leaf set"));
        }

        let (low_leaves, high_leaves) = leaves.split_at_mut(right);
        let a = self.partition(low_leaves)?;
        let b = self.partition(high_leaves)?;
        self.join(a, b)
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Internal(node) = &self.nodes[id] {
                stack.push((node.a, depth + 1));
                stack.push((node.b, depth + 1));
            }
        }
        deepest
    }

    /// Checks parent/child links and that every internal box is exactly the
    /// union of its children. Returns the number of leaves reached.
    pub fn check(&self) -> Result<usize, IndexError> {
        let Some(root) = self.root else {
            return Ok(0);
        };
        let root_node = self.nodes.get(root).ok_or(IndexError::Corrupt("root is a recycled node"))?;
        if root_node.parent().is_some() {
            return Err(IndexError::Corrupt("root has a parent"));
        }

        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.nodes.get(id) {
                None => return Err(IndexError::Corrupt("tree reaches a recycled node")),
                Some(Node::Leaf(_)) => leaves += 1,
                Some(Node::Internal(node)) => {
                    for child in [node.a, node.b] {
                        let child_node = self.nodes.get(child).ok_or(IndexError::Corrupt("tree reaches a recycled node"))?;
                        if child_node.parent() != Some(id) {
                            return Err(IndexError::Corrupt("child does not point back at its parent"));
                        }
                        stack.push(child);
                    }
                    if node.a == node.b {
                        return Err(IndexError::Corrupt("internal node with one distinct child"));
                    }
                    if node.bb != self.bb(node.a).merge(&self.bb(node.b)) {
                        return Err(IndexError::Corrupt("internal box is not the union of its children"));
                    }
                }
            }
            if leaves > self.nodes.live() {
                return Err(IndexError::Corrupt("tree is cyclic"));
            }
        }
        Ok(leaves)
    }
}
