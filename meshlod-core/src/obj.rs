//! OBJ ingestion
//!
//! Consumes the `v`/`vt`/`vn`/`f` subset, splits quads into triangle fans,
//! resolves uv/normal face references onto position indices (last write
//! wins, as multiple references to one position are rare and equivalent
//! for this pipeline), and normalises coordinates into [0,1].

use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::TriangleMesh;

/// Load a mesh from an OBJ file.
///
/// Missing uv/normal streams fall back to `(0,0)` and unit Y. Fails with
/// a parse diagnostic on malformed input; the caller treats that as
/// fatal to the build.
pub fn load_obj(path: &Path) -> Result<TriangleMesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ..Default::default()
        },
    )
    .with_context(|| format!("failed to parse OBJ {}", path.display()))?;

    let mut positions: Vec<Vec3> = Vec::new();
    let mut tris: Vec<[u32; 3]> = Vec::new();
    // Per-position attribute assignment, filled from face references.
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();

    for model in &models {
        let mesh = &model.mesh;
        let base = positions.len() as u32;

        for p in mesh.positions.chunks_exact(3) {
            positions.push(Vec3::new(p[0], p[1], p[2]));
        }
        uvs.resize(positions.len(), Vec2::ZERO);
        normals.resize(positions.len(), Vec3::Y);

        let has_uv = !mesh.texcoords.is_empty() && !mesh.texcoord_indices.is_empty();
        let has_normals = !mesh.normals.is_empty() && !mesh.normal_indices.is_empty();

        for (k, &vi) in mesh.indices.iter().enumerate() {
            let v = (base + vi) as usize;
            if has_uv {
                let t = mesh.texcoord_indices[k] as usize;
                uvs[v] = Vec2::new(mesh.texcoords[2 * t], mesh.texcoords[2 * t + 1]);
            }
            if has_normals {
                let n = mesh.normal_indices[k] as usize;
                normals[v] = Vec3::new(
                    mesh.normals[3 * n],
                    mesh.normals[3 * n + 1],
                    mesh.normals[3 * n + 2],
                );
            }
        }

        for tri in mesh.indices.chunks_exact(3) {
            tris.push([base + tri[0], base + tri[1], base + tri[2]]);
        }
    }

    if positions.is_empty() || tris.is_empty() {
        bail!("OBJ {} contains no triangles", path.display());
    }

    log::info!(
        "loaded {}: {} vertices, {} triangles",
        path.display(),
        positions.len(),
        tris.len()
    );

    let mut mesh = TriangleMesh {
        positions,
        normals,
        uvs,
        tris,
    };
    mesh.normalize_to_unit();
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_obj(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_quads_into_two_triangles() {
        let file = write_obj(
            "v 0 0 0\nv 4 0 0\nv 4 4 0\nv 0 4 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             vn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n",
        );
        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.tris[0], [0, 1, 2]);
        assert_eq!(mesh.tris[1], [0, 2, 3]);
        assert_eq!(mesh.uvs[2], Vec2::new(1.0, 1.0));
        assert_eq!(mesh.normals[0], Vec3::Z);
    }

    #[test]
    fn coordinates_are_normalized_to_unit_range() {
        let file = write_obj("v -2 0 0\nv 6 0 0\nv 6 8 0\nf 1 2 3\n");
        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.positions[0], Vec3::new(0.0, 0.2, 0.2));
        assert_eq!(mesh.positions[2].y, 1.0);
    }

    #[test]
    fn missing_streams_fall_back() {
        let file = write_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.uvs[1], Vec2::ZERO);
        assert_eq!(mesh.normals[1], Vec3::Y);
    }

    #[test]
    fn empty_obj_is_a_parse_error() {
        let file = write_obj("# nothing here\n");
        assert!(load_obj(file.path()).is_err());
    }
}
