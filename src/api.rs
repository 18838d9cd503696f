use crate::bounds::Aabb;
use crate::error::IndexError;
use crate::types::*;

/// Public contract of a broad-phase spatial index.
///
/// Objects are stored by value (typically a cheap handle to a shape) under a
/// caller-chosen [`ObjectId`]. The index reads each object's current bounds
/// through the bounding-box provider it was built with.
pub trait SpatialIndex<O> {
    // --- Membership --------------------------------------------------------

    /// Index `obj` under `id`. Fails with [`IndexError::DuplicateId`] if the
    /// id is already present; the index is left unchanged in that case.
    fn insert(&mut self, obj: O, id: ObjectId) -> Result<(), IndexError>;

    /// Remove the object indexed under `id`, dropping its cached pairs.
    fn remove(&mut self, id: ObjectId) -> Result<O, IndexError>;

    fn contains(&self, id: ObjectId) -> bool;

    fn count(&self) -> usize;

    /// Visit every object, in no particular order.
    fn each<F: FnMut(&O)>(&self, f: F);

    // --- Queries -----------------------------------------------------------

    /// Report every object whose stored box intersects `bb`.
    fn query<F: FnMut(&O)>(&self, bb: Aabb, f: F);

    /// Walk objects whose boxes the segment crosses, nearest box first.
    /// `f` returns the hit fraction for an object (anything `>= t_exit` for a
    /// miss); the smallest fraction seen clips the rest of the walk and is
    /// returned.
    fn segment_query<F>(&self, query: SegmentQuery, t_exit: f32, f: F) -> f32
    where
        F: FnMut(&O, &SegmentQuery) -> f32;

    // --- Per-tick maintenance ----------------------------------------------

    /// Refresh every object's box without reporting pairs.
    fn reindex(&mut self) -> Result<(), IndexError>;

    /// Refresh a single object's box and discover its new pairs.
    fn reindex_object(&mut self, id: ObjectId) -> Result<(), IndexError>;

    /// Refresh every object's box and report every candidate pair once.
    ///
    /// `f(a, b, previous_id)` returns the collision id cached on the pair and
    /// passed back as `previous_id` on the next tick.
    fn reindex_query<F>(&mut self, f: F) -> Result<(), IndexError>
    where
        F: FnMut(&O, &O, CollisionId) -> CollisionId;
}
