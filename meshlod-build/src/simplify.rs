//! Quadric edge-collapse simplification
//!
//! The simplifier contract the builder consumes, plus the in-tree
//! implementation: per-vertex quadric accumulation, a min-heap of edge
//! collapses with lazy invalidation, and locked borders so the seams
//! between independently simplified groups stay watertight.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use anyhow::Result;
use glam::Vec3;

use meshlod_core::mesh::{face_normal, vertex_normals_from_faces};

/// Output of a simplification pass: compacted vertices, faces, and one
/// geometric normal per face.
#[derive(Debug, Clone)]
pub struct SimplifiedMesh {
    pub positions: Vec<Vec3>,
    pub tris: Vec<[u32; 3]>,
    pub face_normals: Vec<Vec3>,
}

impl SimplifiedMesh {
    /// Per-vertex normals: average of incident face normals,
    /// renormalised, unit Y when the sum cancels out.
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        vertex_normals_from_faces(self.positions.len(), &self.tris, &self.face_normals)
    }
}

/// Mesh simplification contract.
///
/// Border edges of the input (edges with exactly one incident triangle)
/// must remain in the output: groups are simplified independently and
/// their shared boundaries have to keep matching. The output triangle
/// count is at most `target_tris` whenever enough interior edges exist.
pub trait Simplifier: Sync {
    fn simplify(
        &self,
        positions: &[Vec3],
        tris: &[[u32; 3]],
        target_tris: usize,
    ) -> Result<SimplifiedMesh>;
}

/// Quadric error metric edge collapser.
///
/// Interior edges collapse to their midpoint; an edge with one border
/// endpoint collapses the interior vertex into the border vertex so the
/// border never moves; edges between two border vertices never collapse.
/// After each collapse the surviving vertex's edges are re-queued with
/// updated quadrics, so the target is reached even on meshes where the
/// initial queue alone would run dry.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadricSimplifier;

#[derive(Clone, Copy)]
struct Quadric {
    q: [[f64; 4]; 4],
}

impl Quadric {
    fn zero() -> Self {
        Self { q: [[0.0; 4]; 4] }
    }

    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        let p = [a, b, c, d];
        let mut q = [[0.0; 4]; 4];
        for (i, row) in q.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = p[i] * p[j];
            }
        }
        Self { q }
    }

    fn from_triangle(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let n = face_normal(p0, p1, p2);
        let d = -n.dot(p0);
        Self::from_plane(n.x as f64, n.y as f64, n.z as f64, d as f64)
    }

    fn add_assign(&mut self, other: &Quadric) {
        for i in 0..4 {
            for j in 0..4 {
                self.q[i][j] += other.q[i][j];
            }
        }
    }

    fn added(&self, other: &Quadric) -> Self {
        let mut out = *self;
        out.add_assign(other);
        out
    }

    fn error(&self, v: Vec3) -> f64 {
        let p = [v.x as f64, v.y as f64, v.z as f64, 1.0];
        let mut sum = 0.0;
        for i in 0..4 {
            for j in 0..4 {
                sum += p[i] * self.q[i][j] * p[j];
            }
        }
        sum
    }
}

/// Candidate collapse of `removed` into `survivor` at `position`.
struct Collapse {
    error: f64,
    survivor: u32,
    removed: u32,
    survivor_version: u32,
    removed_version: u32,
    position: Vec3,
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the smallest
        // error first. Ties break on vertex ids to stay deterministic.
        other
            .error
            .partial_cmp(&self.error)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (other.survivor, other.removed).cmp(&(self.survivor, self.removed)))
    }
}

impl Simplifier for QuadricSimplifier {
    fn simplify(
        &self,
        positions: &[Vec3],
        tris: &[[u32; 3]],
        target_tris: usize,
    ) -> Result<SimplifiedMesh> {
        if tris.len() <= target_tris {
            return Ok(passthrough(positions, tris));
        }

        let mut state = CollapseState::new(positions, tris);
        state.run(target_tris);
        Ok(state.finish())
    }
}

fn passthrough(positions: &[Vec3], tris: &[[u32; 3]]) -> SimplifiedMesh {
    let face_normals = tris
        .iter()
        .map(|t| {
            face_normal(
                positions[t[0] as usize],
                positions[t[1] as usize],
                positions[t[2] as usize],
            )
        })
        .collect();
    SimplifiedMesh {
        positions: positions.to_vec(),
        tris: tris.to_vec(),
        face_normals,
    }
}

struct CollapseState {
    positions: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
    quadrics: Vec<Quadric>,
    border: Vec<bool>,
    version: Vec<u32>,
    remap: Vec<u32>,
    alive_face: Vec<bool>,
    vertex_faces: Vec<HashSet<u32>>,
    face_count: usize,
    heap: BinaryHeap<Collapse>,
}

impl CollapseState {
    fn new(positions: &[Vec3], tris: &[[u32; 3]]) -> Self {
        let n = positions.len();

        let mut quadrics = vec![Quadric::zero(); n];
        for t in tris {
            let q = Quadric::from_triangle(
                positions[t[0] as usize],
                positions[t[1] as usize],
                positions[t[2] as usize],
            );
            for &v in t {
                quadrics[v as usize].add_assign(&q);
            }
        }

        let mut edge_faces: HashMap<(u32, u32), u32> = HashMap::new();
        let mut vertex_faces: Vec<HashSet<u32>> = vec![HashSet::new(); n];
        for (f, t) in tris.iter().enumerate() {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *edge_faces.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
            for &v in t {
                vertex_faces[v as usize].insert(f as u32);
            }
        }

        let mut border = vec![false; n];
        for (&(a, b), &count) in &edge_faces {
            if count == 1 {
                border[a as usize] = true;
                border[b as usize] = true;
            }
        }

        let mut state = Self {
            positions: positions.to_vec(),
            faces: tris.to_vec(),
            quadrics,
            border,
            version: vec![0; n],
            remap: (0..n as u32).collect(),
            alive_face: vec![true; tris.len()],
            vertex_faces,
            face_count: tris.len(),
            heap: BinaryHeap::new(),
        };

        let mut edges: Vec<(u32, u32)> = edge_faces.into_keys().collect();
        edges.sort_unstable();
        for (a, b) in edges {
            if let Some(c) = state.candidate(a, b) {
                state.heap.push(c);
            }
        }
        state
    }

    fn resolve(&self, mut v: u32) -> u32 {
        while self.remap[v as usize] != v {
            v = self.remap[v as usize];
        }
        v
    }

    fn candidate(&self, a: u32, b: u32) -> Option<Collapse> {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return None;
        }
        let (a_border, b_border) = (self.border[a as usize], self.border[b as usize]);
        if a_border && b_border {
            return None;
        }
        // The border endpoint, if any, survives in place.
        let (survivor, removed) = if b_border { (b, a) } else { (a, b) };
        let position = if self.border[survivor as usize] {
            self.positions[survivor as usize]
        } else {
            (self.positions[survivor as usize] + self.positions[removed as usize]) * 0.5
        };
        let error = self.quadrics[survivor as usize]
            .added(&self.quadrics[removed as usize])
            .error(position);
        Some(Collapse {
            error,
            survivor,
            removed,
            survivor_version: self.version[survivor as usize],
            removed_version: self.version[removed as usize],
            position,
        })
    }

    fn run(&mut self, target_tris: usize) {
        while self.face_count > target_tris {
            let Some(c) = self.heap.pop() else {
                break;
            };
            let (s, r) = (c.survivor, c.removed);
            // Stale if either endpoint was collapsed or touched since.
            if self.resolve(s) != s
                || self.resolve(r) != r
                || self.version[s as usize] != c.survivor_version
                || self.version[r as usize] != c.removed_version
            {
                continue;
            }

            let shared: Vec<u32> = self.vertex_faces[s as usize]
                .intersection(&self.vertex_faces[r as usize])
                .copied()
                .filter(|&f| self.alive_face[f as usize])
                .collect();
            if shared.is_empty() {
                continue;
            }
            if self.collapse_would_flip(s, r, c.position, &shared) {
                continue;
            }

            self.remap[r as usize] = s;
            self.positions[s as usize] = c.position;
            let removed_quadric = self.quadrics[r as usize];
            self.quadrics[s as usize].add_assign(&removed_quadric);
            self.version[s as usize] += 1;
            self.version[r as usize] += 1;

            for &f in &shared {
                self.alive_face[f as usize] = false;
                self.face_count -= 1;
            }

            let removed_faces = std::mem::take(&mut self.vertex_faces[r as usize]);
            for f in removed_faces {
                if self.alive_face[f as usize] {
                    self.vertex_faces[s as usize].insert(f);
                }
            }

            // Requeue the surviving vertex's edges with its new quadric.
            let mut neighbours: Vec<u32> = Vec::new();
            for &f in &self.vertex_faces[s as usize] {
                if !self.alive_face[f as usize] {
                    continue;
                }
                for &v in &self.faces[f as usize] {
                    let v = self.resolve(v);
                    if v != s && !neighbours.contains(&v) {
                        neighbours.push(v);
                    }
                }
            }
            neighbours.sort_unstable();
            for u in neighbours {
                if let Some(cand) = self.candidate(s, u) {
                    self.heap.push(cand);
                }
            }
        }
    }

    /// Would moving `s`/`r` to `new_position` invert any surviving face
    /// around the collapsed edge? Inverted faces fold the surface over
    /// itself, so such collapses are rejected.
    fn collapse_would_flip(&self, s: u32, r: u32, new_position: Vec3, shared: &[u32]) -> bool {
        for &v in &[s, r] {
            for &f in &self.vertex_faces[v as usize] {
                if !self.alive_face[f as usize] || shared.contains(&f) {
                    continue;
                }
                let tri = self.faces[f as usize];
                let resolved = [
                    self.resolve(tri[0]),
                    self.resolve(tri[1]),
                    self.resolve(tri[2]),
                ];
                let at = |v: u32| self.positions[v as usize];
                let moved = |v: u32| {
                    if v == s || v == r {
                        new_position
                    } else {
                        at(v)
                    }
                };
                let before = (at(resolved[1]) - at(resolved[0]))
                    .cross(at(resolved[2]) - at(resolved[0]));
                let after = (moved(resolved[1]) - moved(resolved[0]))
                    .cross(moved(resolved[2]) - moved(resolved[0]));
                if before.length_squared() > 1e-20 && before.dot(after) < 0.0 {
                    return true;
                }
            }
        }
        false
    }

    fn finish(self) -> SimplifiedMesh {
        let mut used: HashMap<u32, u32> = HashMap::new();
        let mut out_positions = Vec::new();
        let mut out_tris = Vec::new();
        let mut out_normals = Vec::new();

        for (f, tri) in self.faces.iter().enumerate() {
            if !self.alive_face[f] {
                continue;
            }
            let resolved = [
                self.resolve(tri[0]),
                self.resolve(tri[1]),
                self.resolve(tri[2]),
            ];
            if resolved[0] == resolved[1]
                || resolved[1] == resolved[2]
                || resolved[2] == resolved[0]
            {
                continue;
            }
            let mut out = [0u32; 3];
            for (slot, &v) in out.iter_mut().zip(&resolved) {
                let next = out_positions.len() as u32;
                let idx = *used.entry(v).or_insert_with(|| {
                    out_positions.push(self.positions[v as usize]);
                    next
                });
                *slot = idx;
            }
            out_normals.push(face_normal(
                out_positions[out[0] as usize],
                out_positions[out[1] as usize],
                out_positions[out[2] as usize],
            ));
            out_tris.push(out);
        }

        SimplifiedMesh {
            positions: out_positions,
            tris: out_tris,
            face_normals: out_normals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Regular grid of (size x size) vertices triangulated into
    /// 2*(size-1)^2 faces.
    pub(crate) fn grid_mesh(size: u32) -> (Vec<Vec3>, Vec<[u32; 3]>) {
        let mut positions = Vec::new();
        for y in 0..size {
            for x in 0..size {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut tris = Vec::new();
        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let i = x + y * size;
                tris.push([i, i + 1, i + size]);
                tris.push([i + 1, i + size + 1, i + size]);
            }
        }
        (positions, tris)
    }

    #[test]
    fn halves_a_grid() {
        let (positions, tris) = grid_mesh(24);
        let target = tris.len() / 2;
        let out = QuadricSimplifier.simplify(&positions, &tris, target).unwrap();
        assert!(out.tris.len() <= target);
        assert!(!out.tris.is_empty());
        assert_eq!(out.face_normals.len(), out.tris.len());
    }

    #[test]
    fn border_vertices_survive_in_place() {
        let size = 16u32;
        let (positions, tris) = grid_mesh(size);
        let out = QuadricSimplifier
            .simplify(&positions, &tris, tris.len() / 2)
            .unwrap();

        let max = (size - 1) as f32;
        for y in 0..size {
            for x in 0..size {
                if x != 0 && y != 0 && x != size - 1 && y != size - 1 {
                    continue;
                }
                let corner = Vec3::new(x as f32, y as f32, 0.0);
                assert!(
                    out.positions.iter().any(|p| *p == corner),
                    "border vertex ({x},{y}) missing from output"
                );
            }
        }
        // Border extremes unchanged
        assert!(out.positions.iter().any(|p| *p == Vec3::new(max, max, 0.0)));
    }

    #[test]
    fn border_edges_survive() {
        let (positions, tris) = grid_mesh(12);
        let out = QuadricSimplifier
            .simplify(&positions, &tris, tris.len() / 2)
            .unwrap();

        // Recompute border edges of the output; every input border edge
        // (unit-length segments along the rim) must be present.
        let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();
        for t in &out.tris {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let border_edges = edge_count.values().filter(|&&c| c == 1).count();
        // 11 unit edges per side, 4 sides.
        assert_eq!(border_edges, 44);
    }

    #[test]
    fn no_degenerate_output_faces() {
        let (positions, tris) = grid_mesh(10);
        let out = QuadricSimplifier
            .simplify(&positions, &tris, tris.len() / 4)
            .unwrap();
        for t in &out.tris {
            assert!(t[0] != t[1] && t[1] != t[2] && t[2] != t[0]);
        }
        for t in &out.tris {
            for &v in t {
                assert!((v as usize) < out.positions.len());
            }
        }
    }

    #[test]
    fn already_coarse_input_passes_through() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let tris = vec![[0u32, 1, 2]];
        let out = QuadricSimplifier.simplify(&positions, &tris, 4).unwrap();
        assert_eq!(out.tris, tris);
        assert_eq!(out.positions, positions);
    }

    #[test]
    fn flat_grid_normals_point_up() {
        let (positions, tris) = grid_mesh(8);
        let out = QuadricSimplifier
            .simplify(&positions, &tris, tris.len() / 2)
            .unwrap();
        for n in out.vertex_normals() {
            assert!(n.z.abs() > 0.99);
        }
    }
}
