//! RMS geometric error between vertex sets

use glam::Vec3;

use crate::kd::KdTree;

/// Root-mean-square nearest-neighbour distance from every vertex in
/// `from` to the set `reference`.
///
/// Used to measure how far a simplified group drifted from the surface
/// it replaced. Returns 0 for empty inputs.
pub fn rms_nearest_error(from: &[Vec3], reference: &[Vec3]) -> f32 {
    if from.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let tree = KdTree::build(reference);
    let sum_sq: f64 = from
        .iter()
        .map(|&p| {
            let (_, dist) = tree.nearest(p).unwrap();
            (dist as f64) * (dist as f64)
        })
        .sum();
    (sum_sq / from.len() as f64).sqrt() as f32
}
