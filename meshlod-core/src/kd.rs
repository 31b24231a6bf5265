//! Static KD-tree over 3-D points
//!
//! Built once over a vertex set and queried for nearest neighbours by the
//! error metric and the uv-inheritance pass. The tree is an implicit
//! median layout over an index permutation; nothing is allocated per
//! query except the result.

use glam::Vec3;

pub struct KdTree {
    points: Vec<Vec3>,
    /// Permutation of point indices arranged as a balanced median tree:
    /// the median of every subrange is that subrange's node.
    order: Vec<u32>,
}

impl KdTree {
    pub fn build(points: &[Vec3]) -> Self {
        let mut order: Vec<u32> = (0..points.len() as u32).collect();
        build_recursive(points, &mut order, 0);
        Self {
            points: points.to_vec(),
            order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index and distance of the nearest point to `query`.
    pub fn nearest(&self, query: Vec3) -> Option<(usize, f32)> {
        self.nearest_n(query, 1).into_iter().next()
    }

    /// The `n` nearest points to `query`, closest first.
    ///
    /// Returns fewer entries when the tree holds fewer points.
    pub fn nearest_n(&self, query: Vec3, n: usize) -> Vec<(usize, f32)> {
        let mut best: Vec<(f32, u32)> = Vec::with_capacity(n + 1);
        if n > 0 && !self.points.is_empty() {
            self.search(0, self.order.len(), 0, query, n, &mut best);
        }
        best.into_iter()
            .map(|(d2, i)| (i as usize, d2.sqrt()))
            .collect()
    }

    fn search(
        &self,
        lo: usize,
        hi: usize,
        axis: usize,
        query: Vec3,
        n: usize,
        best: &mut Vec<(f32, u32)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let idx = self.order[mid];
        let point = self.points[idx as usize];

        let d2 = query.distance_squared(point);
        if best.len() < n || d2 < best.last().unwrap().0 {
            let pos = best.partition_point(|&(d, _)| d <= d2);
            best.insert(pos, (d2, idx));
            best.truncate(n);
        }

        let delta = query[axis] - point[axis];
        let next_axis = (axis + 1) % 3;
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search(near.0, near.1, next_axis, query, n, best);
        // Only cross the splitting plane if a closer point can exist there.
        if best.len() < n || delta * delta < best.last().unwrap().0 {
            self.search(far.0, far.1, next_axis, query, n, best);
        }
    }
}

fn build_recursive(points: &[Vec3], order: &mut [u32], axis: usize) {
    if order.len() <= 1 {
        return;
    }
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        points[a as usize][axis].total_cmp(&points[b as usize][axis])
    });
    let next_axis = (axis + 1) % 3;
    let (left, rest) = order.split_at_mut(mid);
    build_recursive(points, left, next_axis);
    build_recursive(points, &mut rest[1..], next_axis);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_points() -> Vec<Vec3> {
        let mut points = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                for z in 0..4 {
                    points.push(Vec3::new(x as f32, y as f32, z as f32));
                }
            }
        }
        points
    }

    fn brute_force(points: &[Vec3], q: Vec3) -> (usize, f32) {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(q)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap()
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = grid_points();
        let tree = KdTree::build(&points);
        for q in [
            Vec3::new(0.2, 0.1, 0.3),
            Vec3::new(7.9, 7.6, 3.2),
            Vec3::new(3.5, 3.5, 1.5),
            Vec3::new(-2.0, 10.0, 5.0),
        ] {
            let (_, expected) = brute_force(&points, q);
            let (_, got) = tree.nearest(q).unwrap();
            assert_relative_eq!(got, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn nearest_two_are_sorted_and_distinct() {
        let points = vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
        ];
        let tree = KdTree::build(&points);
        let hits = tree.nearest_n(Vec3::new(0.1, 0.0, 0.0), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn exact_hit_has_zero_distance() {
        let points = grid_points();
        let tree = KdTree::build(&points);
        let (idx, dist) = tree.nearest(Vec3::new(3.0, 4.0, 2.0)).unwrap();
        assert_relative_eq!(dist, 0.0);
        assert_eq!(points[idx], Vec3::new(3.0, 4.0, 2.0));
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree = KdTree::build(&[]);
        assert!(tree.nearest(Vec3::ZERO).is_none());
    }
}
