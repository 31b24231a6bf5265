//! Bounding spheres for clusters

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub const EMPTY: Self = Self {
        center: Vec3::ZERO,
        radius: 0.0,
    };

    /// Sphere at the centroid with the radius of the farthest point.
    pub fn from_points(points: impl Iterator<Item = Vec3> + Clone) -> Self {
        let mut center = Vec3::ZERO;
        let mut count = 0u32;
        for p in points.clone() {
            center += p;
            count += 1;
        }
        if count == 0 {
            return Self::EMPTY;
        }
        center /= count as f32;

        let mut radius: f32 = 0.0;
        for p in points {
            radius = radius.max(p.distance(center));
        }
        Self { center, radius }
    }

    /// Does this sphere fully contain `other` (within `tolerance`)?
    pub fn contains(&self, other: &BoundingSphere, tolerance: f32) -> bool {
        self.center.distance(other.center) + other.radius <= self.radius + tolerance
    }

    /// Smallest sphere enclosing this sphere and `other`.
    pub fn enclose(&self, other: &BoundingSphere) -> Self {
        let dist = self.center.distance(other.center);
        if dist + other.radius <= self.radius {
            return *self;
        }
        if dist + self.radius <= other.radius {
            return *other;
        }
        let radius = (dist + self.radius + other.radius) * 0.5;
        // Degenerate when concentric; the radius checks above already
        // resolved that case, so dist > 0 here.
        let center = self.center + (other.center - self.center) * ((radius - self.radius) / dist);
        Self { center, radius }
    }
}

/// Enclosing sphere of a set, folded largest-first.
///
/// Sorting by descending radius lets the fold terminate on the cheap
/// already-contained branch for most inputs.
pub fn enclosing_sphere(spheres: &[BoundingSphere]) -> BoundingSphere {
    if spheres.is_empty() {
        return BoundingSphere::EMPTY;
    }
    let mut sorted: Vec<BoundingSphere> = spheres.to_vec();
    sorted.sort_by(|a, b| b.radius.total_cmp(&a.radius));

    let mut acc = sorted[0];
    for s in &sorted[1..] {
        acc = acc.enclose(s);
    }
    acc
}
