use glam::Vec2;

/// Axis-aligned bounding box given by its left/bottom/right/top edges.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// Builds a box from its edges (`l`, `b`, `r`, `t`).
    pub fn new(l: f32, b: f32, r: f32, t: f32) -> Self {
        Self { min: Vec2::new(l, b), max: Vec2::new(r, t) }
    }

    pub fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self { min: center - half_extents, max: center + half_extents }
    }

    /// Box around a circle.
    pub fn for_circle(center: Vec2, r: f32) -> Self {
        Self::from_center_half_extents(center, Vec2::splat(r))
    }

    pub fn l(&self) -> f32 { self.min.x }
    pub fn b(&self) -> f32 { self.min.y }
    pub fn r(&self) -> f32 { self.max.x }
    pub fn t(&self) -> f32 { self.max.y }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Inclusive overlap: touching edges count.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// True if `other` lies entirely inside `self` (edges may coincide).
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.max.x >= other.max.x
            && self.min.y <= other.min.y
            && self.max.y >= other.max.y
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn area(&self) -> f32 {
        let d = self.max - self.min;
        d.x * d.y
    }

    /// Area of the union of both boxes.
    pub fn merged_area(&self, other: &Aabb) -> f32 {
        self.merge(other).area()
    }

    /// Manhattan distance between centers, scaled by two.
    pub fn proximity(&self, other: &Aabb) -> f32 {
        let d = (self.min + self.max) - (other.min + other.max);
        d.x.abs() + d.y.abs()
    }

    /// Grows the box by `m` on every side.
    pub fn inflate(&self, m: f32) -> Aabb {
        let delta = Vec2::splat(m);
        Aabb { min: self.min - delta, max: self.max + delta }
    }

    /// Fraction along `a -> b` at which the segment enters the box, or
    /// `f32::INFINITY` if it misses. A segment starting inside reports `0.0`.
    pub fn segment_fraction(&self, a: Vec2, b: Vec2) -> f32 {
        let d = b - a;
        let mut tmin = 0.0f32;
        let mut tmax = 1.0f32;

        for axis in 0..2 {
            let (o, dir, lo, hi) = (a[axis], d[axis], self.min[axis], self.max[axis]);
            if dir.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return f32::INFINITY;
                }
            } else {
                let inv = 1.0 / dir;
                let mut t1 = (lo - o) * inv;
                let mut t2 = (hi - o) * inv;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                }
                tmin = tmin.max(t1);
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return f32::INFINITY;
                }
            }
        }

        tmin
    }
}
