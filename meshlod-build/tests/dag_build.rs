//! End-to-end builder invariants on synthetic grid meshes.

use anyhow::Result;
use glam::{Vec2, Vec3};

use meshlod_build::{
    load_dag, save_dag, BuildConfig, DagBuilder, ModelPaths, Partitioner, QuadricSimplifier,
};
use meshlod_core::{ClusterDag, TriangleMesh};

/// Flat grid of `size` x `size` vertices, 2*(size-1)^2 triangles,
/// normalised into the unit range like loaded assets are.
fn grid_mesh(size: u32) -> TriangleMesh {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for y in 0..size {
        for x in 0..size {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
            uvs.push(Vec2::new(
                x as f32 / (size - 1) as f32,
                y as f32 / (size - 1) as f32,
            ));
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
    let mut mesh = TriangleMesh {
        normals: vec![Vec3::Z; positions.len()],
        positions,
        uvs,
        tris,
    };
    mesh.normalize_to_unit();
    mesh
}

/// Canonical form of a cluster's triangle soup: per triangle the three
/// vertex positions as bit patterns, sorted within the triangle, the
/// whole list sorted.
fn triangle_multiset(soups: impl Iterator<Item = Vec<[u32; 3]>>) -> Vec<[[u32; 3]; 3]> {
    let mut out = Vec::new();
    for soup in soups {
        for tri in soup.chunks(3) {
            let mut t = [tri[0], tri[1], tri[2]];
            t.sort_unstable();
            out.push(t);
        }
    }
    out.sort_unstable();
    out
}

fn soup_bits(flat: &[f32]) -> Vec<[u32; 3]> {
    flat.chunks_exact(3)
        .map(|v| [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()])
        .collect()
}

fn leaf_ids(dag: &ClusterDag) -> Vec<u32> {
    (0..dag.len() as u32).filter(|&c| dag.is_leaf(c)).collect()
}

#[test]
fn grid_build_satisfies_dag_invariants() {
    let mesh = grid_mesh(64);
    let builder = DagBuilder::new(BuildConfig::default());
    let (dag, stats) = builder.build_with_stats(&mesh).unwrap();

    // Single root, reachability, co-parent closure, strict error
    // monotonicity, sphere containment.
    dag.validate().unwrap();

    let expected_clusters = mesh.tris.len().div_ceil(160);
    assert_eq!(stats.layers[0].clusters, expected_clusters);
    assert_eq!(stats.layers[0].triangles, mesh.tris.len());
    assert!(stats.layers.len() >= 4, "only {} layers", stats.layers.len());
    assert_eq!(stats.layers.last().unwrap().clusters, 1);

    // Triangle counts shrink towards the root.
    for w in stats.layers.windows(2) {
        assert!(w[1].triangles < w[0].triangles);
        assert!(w[1].clusters < w[0].clusters);
    }
}

#[test]
fn leaf_clusters_tile_the_input_mesh() {
    let mesh = grid_mesh(48);
    let dag = DagBuilder::new(BuildConfig::default()).build(&mesh).unwrap();

    let expected = triangle_multiset(std::iter::once(
        mesh.tris
            .iter()
            .flat_map(|t| {
                t.iter().map(|&v| {
                    let p = mesh.positions[v as usize];
                    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
                })
            })
            .collect(),
    ));
    let got = triangle_multiset(
        leaf_ids(&dag)
            .into_iter()
            .map(|c| soup_bits(&dag.positions[c as usize])),
    );
    assert_eq!(got, expected, "leaf clusters must tile the input exactly");
}

#[test]
fn coarser_layers_roughly_halve_triangles() {
    let mesh = grid_mesh(64);
    let (_, stats) = DagBuilder::new(BuildConfig::default())
        .build_with_stats(&mesh)
        .unwrap();

    // The first rounds have plenty of interior edges; halving should be
    // within tolerance there.
    for w in stats.layers.windows(2).take(3) {
        let ratio = w[1].triangles as f64 / w[0].triangles as f64;
        assert!(ratio <= 0.60, "layer shrank only to {ratio:.2} of its parent");
    }
}

#[test]
fn uv_inheritance_covers_every_cluster() {
    let mesh = grid_mesh(32);
    let dag = DagBuilder::new(BuildConfig::default()).build(&mesh).unwrap();

    for c in 0..dag.len() as u32 {
        let verts = dag.positions[c as usize].len() / 3;
        assert_eq!(dag.uvs[c as usize].len(), verts * 2);
        // The grid's uvs equal its xy coordinates, so inherited uvs must
        // stay inside the unit square.
        for uv in dag.uvs[c as usize].chunks_exact(2) {
            assert!((-0.01..=1.01).contains(&uv[0]));
            assert!((-0.01..=1.01).contains(&uv[1]));
        }
    }
}

#[test]
fn leaf_errors_are_positive_and_below_root() {
    let mesh = grid_mesh(48);
    let dag = DagBuilder::new(BuildConfig::default()).build(&mesh).unwrap();

    let root = dag.root();
    for &leaf in &leaf_ids(&dag) {
        assert!(dag.errors[leaf as usize] > 0.0);
        assert!(dag.errors[leaf as usize] < dag.errors[root as usize]);
    }
}

#[test]
fn built_dag_round_trips_through_the_cache() {
    let mesh = grid_mesh(32);
    let dag = DagBuilder::new(BuildConfig::default()).build(&mesh).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.bin");
    let paths = ModelPaths {
        obj: "data/grid.obj".into(),
        texture: "data/grid.png".into(),
    };
    save_dag(&path, &dag, &paths).unwrap();
    let (loaded, loaded_paths) = load_dag(&path).unwrap();

    assert_eq!(loaded_paths, paths);
    assert_eq!(loaded.positions, dag.positions);
    assert_eq!(loaded.normals, dag.normals);
    assert_eq!(loaded.uvs, dag.uvs);
    assert_eq!(loaded.errors, dag.errors);
    assert_eq!(loaded.centers, dag.centers);
    assert_eq!(loaded.radii, dag.radii);
    for c in 0..dag.len() as u32 {
        assert_eq!(loaded.parents(c), dag.parents(c));
        assert_eq!(loaded.children(c), dag.children(c));
    }
}

/// A partitioner that always fails; the builder must fall back to a
/// single partition and still produce a valid (if shallow) DAG.
struct BrokenPartitioner;

impl Partitioner for BrokenPartitioner {
    fn partition(&self, _n_parts: usize, _adjacency: &[Vec<(u32, u32)>]) -> Result<Vec<u32>> {
        anyhow::bail!("partitioner unavailable")
    }
}

#[test]
fn partitioner_failure_falls_back_to_single_partition() {
    let mesh = grid_mesh(24);
    let builder = DagBuilder::with_backends(
        BuildConfig::default(),
        Box::new(BrokenPartitioner),
        Box::new(QuadricSimplifier),
    );
    let dag = builder.build(&mesh).unwrap();
    dag.validate().unwrap();
    // With every partition collapsed to a single part, LOD 0 is already
    // one cluster and the build ends at the root immediately.
    assert_eq!(dag.len(), 1);
    assert_eq!(dag.triangle_count(0), mesh.tris.len());
}

#[test]
#[ignore = "builds the full 256x256 reference grid; takes minutes in debug"]
fn reference_grid_matches_expected_shape() {
    let mesh = grid_mesh(256);
    assert_eq!(mesh.tris.len(), 130_050);

    let (dag, stats) = DagBuilder::new(BuildConfig::default())
        .build_with_stats(&mesh)
        .unwrap();
    dag.validate().unwrap();

    assert_eq!(stats.layers[0].clusters, 813);
    assert!(stats.layers.len() >= 6, "only {} layers", stats.layers.len());
    for w in stats.layers.windows(2).take(4) {
        let ratio = w[1].triangles as f64 / w[0].triangles as f64;
        assert!(ratio <= 0.55, "layer shrank only to {ratio:.2}");
    }
}
