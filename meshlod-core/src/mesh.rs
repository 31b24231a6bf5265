//! CPU-side triangle mesh container

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh with one normal and one uv per vertex.
///
/// Vertex streams are position-indexed: `normals[i]` and `uvs[i]` belong
/// to `positions[i]`, so adjacent triangles always share vertex indices
/// across uv seams and the dual graph sees the true surface topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tris: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    /// Shift and uniformly scale all coordinates so the smallest component
    /// over every vertex becomes 0 and the largest becomes 1.
    ///
    /// The scale is shared across axes; aspect ratios are preserved.
    pub fn normalize_to_unit(&mut self) {
        if self.positions.is_empty() {
            return;
        }
        let mut min = f32::INFINITY;
        for p in &self.positions {
            min = min.min(p.min_element());
        }
        for p in &mut self.positions {
            *p -= Vec3::splat(min);
        }
        let mut max = 0.0f32;
        for p in &self.positions {
            max = max.max(p.max_element());
        }
        if max > 0.0 {
            let inv = 1.0 / max;
            for p in &mut self.positions {
                *p *= inv;
            }
        }
    }
}

/// Average per-face normals onto vertices and renormalise.
///
/// Vertices with no incident face (or with opposing normals cancelling
/// to zero length) fall back to unit Y.
pub fn vertex_normals_from_faces(
    vertex_count: usize,
    tris: &[[u32; 3]],
    face_normals: &[Vec3],
) -> Vec<Vec3> {
    let mut sums = vec![Vec3::ZERO; vertex_count];
    for (tri, n) in tris.iter().zip(face_normals) {
        for &v in tri {
            sums[v as usize] += *n;
        }
    }
    sums.into_iter()
        .map(|n| {
            let len = n.length();
            if len > 1e-12 {
                n / len
            } else {
                Vec3::Y
            }
        })
        .collect()
}

/// Geometric normal of a single triangle (zero for degenerate faces).
pub fn face_normal(p0: Vec3, p1: Vec3, p2: Vec3) -> Vec3 {
    (p1 - p0).cross(p2 - p0).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> TriangleMesh {
        TriangleMesh {
            positions: vec![
                Vec3::new(2.0, 2.0, 2.0),
                Vec3::new(6.0, 2.0, 2.0),
                Vec3::new(6.0, 6.0, 2.0),
                Vec3::new(2.0, 6.0, 2.0),
            ],
            normals: vec![Vec3::Z; 4],
            uvs: vec![Vec2::ZERO; 4],
            tris: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn normalize_shifts_and_scales_globally() {
        let mut mesh = quad();
        mesh.normalize_to_unit();

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for p in &mesh.positions {
            min = min.min(p.min_element());
            max = max.max(p.max_element());
        }
        assert_relative_eq!(min, 0.0);
        assert_relative_eq!(max, 1.0);

        // Uniform scale: the quad stays square
        let w = mesh.positions[1].x - mesh.positions[0].x;
        let h = mesh.positions[3].y - mesh.positions[0].y;
        assert_relative_eq!(w, h);
    }

    #[test]
    fn vertex_normals_average_incident_faces() {
        let mesh = quad();
        let face_normals = vec![Vec3::Z, Vec3::Z];
        let normals = vertex_normals_from_faces(4, &mesh.tris, &face_normals);
        for n in normals {
            assert_relative_eq!(n.z, 1.0);
        }
    }

    #[test]
    fn isolated_vertex_normal_falls_back_to_unit_y() {
        let normals = vertex_normals_from_faces(2, &[], &[]);
        assert_eq!(normals, vec![Vec3::Y, Vec3::Y]);
    }
}
