use glam::Vec2;

/// Caller-chosen key identifying an indexed object (e.g., a packed shape id).
pub type ObjectId = u64;

/// Opaque narrow-phase token cached on a pair and handed back every tick.
/// Zero means "no previous collision".
pub type CollisionId = u32;

/// Value of the shared tick clock.
pub type Stamp = u64;

/// Whether a tree takes part in pair discovery itself or only serves as the
/// static partner of a dynamic tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TreeRole {
    /// Leaves pair with each other and with the static partner.
    Dynamic,
    /// Leaves only pair with leaves of a dynamic tree sharing the context.
    Static,
}

/// Tree-level configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeConfig {
    /// Fraction of a box's width/height added on each side when a velocity
    /// predictor is installed.
    pub margin_fraction: f32,
    /// Scale applied to the predicted velocity before it biases the fat box.
    pub velocity_scale: f32,
    /// Number of records created at once when a pool runs dry.
    pub pool_batch: usize,
    /// Enable internal timing instrumentation for reindex passes.
    pub enable_timing: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            margin_fraction: 0.1,
            velocity_scale: 0.1,
            pool_batch: 32,
            enable_timing: false,
        }
    }
}

/// Ray parameters handed to segment-query callbacks.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentQuery {
    pub from: Vec2,
    pub to: Vec2,
    /// Thickness of the swept segment; boxes are inflated by this much.
    pub radius: f32,
}

impl SegmentQuery {
    pub fn new(from: Vec2, to: Vec2, radius: f32) -> Self {
        Self { from, to, radius }
    }

    /// Point at fraction `t` along the segment.
    pub fn point_at(&self, t: f32) -> Vec2 {
        self.from.lerp(self.to, t)
    }
}

/// Debug statistics for a tree and its shared context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeStats {
    pub leaves: usize,
    pub internal_nodes: usize,
    /// Node records sitting in the freelist.
    pub pooled_nodes: usize,
    /// Live pairs in the shared registry (all trees of the context).
    pub live_pairs: usize,
    pub pooled_pairs: usize,
    /// Longest root-to-leaf path, counting the root as depth 1.
    pub depth: usize,
    pub stamp: Stamp,
}

/// Timing breakdown for the last `reindex_query` pass.
#[derive(Copy, Clone, Debug, Default)]
pub struct ReindexTiming {
    pub total_ms: f64,
    pub update_ms: f64,
    pub pending_ms: f64,
    pub mark_ms: f64,

    /// Leaves whose fat box no longer held their geometry this pass.
    pub relocated: usize,
}
