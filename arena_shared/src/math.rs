//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! The arena is a flat square, so everything here is two-dimensional.

use serde::{Deserialize, Serialize};

/// 2D vector used for positions and headings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Square world bounds centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub half_extent: f32,
}

impl Bounds {
    pub const fn new(half_extent: f32) -> Self {
        Self { half_extent }
    }

    /// Bounds for a world whose full edge length is `size`.
    pub fn from_size(size: f32) -> Self {
        Self::new(size / 2.0)
    }

    /// Clamps a single coordinate into `[-half_extent, half_extent]`.
    pub fn clamp_axis(&self, v: f32) -> f32 {
        v.clamp(-self.half_extent, self.half_extent)
    }

    /// Clamps each axis independently.
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.clamp_axis(p.x), self.clamp_axis(p.y))
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x.abs() <= self.half_extent && p.y.abs() <= self.half_extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_lerp_midpoint() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn clamp_is_per_axis() {
        let b = Bounds::new(1000.0);
        assert_eq!(b.clamp(Vec2::new(1500.0, -20.0)), Vec2::new(1000.0, -20.0));
        assert_eq!(b.clamp(Vec2::new(-3000.0, 4000.0)), Vec2::new(-1000.0, 1000.0));
        assert!(b.contains(Vec2::new(1000.0, -1000.0)));
        assert!(!b.contains(Vec2::new(1000.1, 0.0)));
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(Vec2::new(0.0, 0.0).distance(Vec2::new(3.0, 4.0)), 5.0);
    }
}
