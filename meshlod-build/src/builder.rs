//! Iterative cluster-DAG construction
//!
//! Layer 0 partitions the input triangles into clusters. Every further
//! layer groups adjacent clusters, simplifies each group to half its
//! triangle count, re-partitions the result into new clusters, and wires
//! every cluster of the group to the same set of new parents. That is
//! the co-parent closure the runtime's atomic refine/coarsen step
//! relies on.
//! A final bottom-up pass makes errors strictly monotonic and grows
//! parent bounding spheres over their children.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use glam::{Vec2, Vec3};
use rayon::prelude::*;

use meshlod_core::bounds::{enclosing_sphere, BoundingSphere};
use meshlod_core::dual_graph::{cluster_adjacency, triangle_adjacency};
use meshlod_core::error_metric::rms_nearest_error;
use meshlod_core::kd::KdTree;
use meshlod_core::{ClusterDag, TriangleMesh};

use crate::partition::{GreedyGrowPartitioner, Partitioner};
use crate::simplify::{QuadricSimplifier, Simplifier};

/// Relative lift applied when a parent's error does not exceed its
/// children's.
const ERROR_LIFT_EPSILON: f32 = 1e-3;

/// Absolute floor for a parent whose children all carry zero error, so
/// monotonicity stays strict even on degenerate groups.
const MIN_PARENT_ERROR: f32 = 1e-9;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Target triangles per cluster at LOD 0.
    pub cluster_size_initial: usize,
    /// Target triangles per cluster on every coarser layer.
    pub cluster_size: usize,
    /// Clusters grouped together per simplification unit.
    pub group_size: usize,
    /// Fraction of triangles removed per simplification round.
    pub removal_ratio: f32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cluster_size_initial: 160,
            cluster_size: 128,
            group_size: 8,
            removal_ratio: 0.5,
        }
    }
}

/// Per-layer triangle and cluster counts, reported for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub layers: Vec<LayerStats>,
}

#[derive(Debug, Clone, Copy)]
pub struct LayerStats {
    pub triangles: usize,
    pub clusters: usize,
}

pub struct DagBuilder {
    config: BuildConfig,
    partitioner: Box<dyn Partitioner>,
    simplifier: Box<dyn Simplifier>,
}

impl DagBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            partitioner: Box::new(GreedyGrowPartitioner),
            simplifier: Box::new(QuadricSimplifier),
        }
    }

    /// Swap in different partitioner/simplifier implementations.
    pub fn with_backends(
        config: BuildConfig,
        partitioner: Box<dyn Partitioner>,
        simplifier: Box<dyn Simplifier>,
    ) -> Self {
        Self {
            config,
            partitioner,
            simplifier,
        }
    }

    pub fn build(&self, mesh: &TriangleMesh) -> Result<ClusterDag> {
        Ok(self.build_with_stats(mesh)?.0)
    }

    pub fn build_with_stats(&self, mesh: &TriangleMesh) -> Result<(ClusterDag, BuildStats)> {
        ensure!(!mesh.tris.is_empty(), "cannot build a DAG from an empty mesh");
        ensure!(
            mesh.normals.len() == mesh.positions.len()
                && mesh.uvs.len() == mesh.positions.len(),
            "mesh attribute streams misaligned"
        );

        let mut acc = Accumulator::default();
        let mut stats = BuildStats::default();

        let mut layer = self.initial_layer(mesh);
        let mut layer_base = 0usize;
        let mut lod_index = 0usize;
        let mut pending_stop = false;

        loop {
            log::info!(
                "LOD {lod_index} has {} tris and {} clusters",
                layer.tris.len(),
                layer.cluster_count
            );
            stats.layers.push(LayerStats {
                triangles: layer.tris.len(),
                clusters: layer.cluster_count,
            });
            emit_layer(&mut acc, &layer, lod_index == 0, mesh);

            if layer.cluster_count <= 1 || pending_stop {
                break;
            }

            let (next, aborted) = self.coarsen(&layer, layer_base, &mut acc)?;
            let Some(next) = next else {
                // Every group failed; the synthetic root will adopt this
                // layer's clusters.
                log::warn!("LOD {lod_index}: no group produced triangles, stopping early");
                break;
            };
            pending_stop = aborted || next.cluster_count >= layer.cluster_count;
            if pending_stop {
                log::warn!("LOD {lod_index}: coarsening stalled, stopping after next layer");
            }
            layer_base += layer.cluster_count;
            layer = next;
            lod_index += 1;
        }

        let dag = self.assemble(mesh, acc)?;
        log::info!("baked cluster DAG with {} clusters", dag.len());
        Ok((dag, stats))
    }

    fn initial_layer(&self, mesh: &TriangleMesh) -> Layer {
        let tri_adj = triangle_adjacency(&mesh.tris);
        let n_parts = mesh.tris.len().div_ceil(self.config.cluster_size_initial).max(1);
        let (membership, cluster_count) =
            self.partition_or_single(n_parts, &unweighted(&tri_adj));
        Layer {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            tris: mesh.tris.clone(),
            tri_adj,
            tri_cluster: membership,
            cluster_count,
        }
    }

    /// Partition with the configured backend; a hard failure falls back
    /// to a single part, a shortfall is accepted as-is.
    fn partition_or_single(
        &self,
        n_parts: usize,
        adjacency: &[Vec<(u32, u32)>],
    ) -> (Vec<u32>, usize) {
        match self.partitioner.partition(n_parts, adjacency) {
            Ok(membership) => {
                let count = membership.iter().copied().max().map_or(1, |m| m as usize + 1);
                if count < n_parts {
                    log::warn!("partitioner produced {count} of {n_parts} requested parts");
                }
                (membership, count)
            }
            Err(err) => {
                log::warn!("partitioner failed ({err}); falling back to a single part");
                (vec![0; adjacency.len()], 1)
            }
        }
    }

    /// One coarsening round: group this layer's clusters, simplify each
    /// group independently, and merge the results into the next layer.
    ///
    /// Returns the next layer (None when no group yielded triangles) and
    /// whether coarsening must stop after that layer.
    fn coarsen(
        &self,
        layer: &Layer,
        layer_base: usize,
        acc: &mut Accumulator,
    ) -> Result<(Option<Layer>, bool)> {
        let k = layer.cluster_count;
        let group_size = self.config.group_size;
        let group_target = if k > 2 * group_size {
            k / group_size
        } else if k > 4 {
            2
        } else {
            1
        };

        let cluster_adj = cluster_adjacency(&layer.tri_adj, &layer.tri_cluster);
        let (grouping, group_count) = self.partition_or_single(group_target, &cluster_adj);

        let mut groups: Vec<Vec<u32>> = vec![Vec::new(); group_count];
        for (cluster, &g) in grouping.iter().enumerate() {
            groups[g as usize].push(cluster as u32);
        }

        let mut cluster_tris: Vec<Vec<u32>> = vec![Vec::new(); k];
        for (tri, &cluster) in layer.tri_cluster.iter().enumerate() {
            cluster_tris[cluster as usize].push(tri as u32);
        }

        // Each group is an independent (vertices, tris) -> (v', t', error)
        // computation; results come back in submission order.
        let results: Vec<GroupOutput> = groups
            .par_iter()
            .map(|group| self.simplify_group(layer, &cluster_tris, group))
            .collect::<Result<Vec<_>>>()?;

        self.merge_groups(layer, layer_base, &groups, results, acc)
    }

    fn simplify_group(
        &self,
        layer: &Layer,
        cluster_tris: &[Vec<u32>],
        group: &[u32],
    ) -> Result<GroupOutput> {
        if group.is_empty() {
            return Ok(GroupOutput::empty());
        }

        // Gather the group's triangles and re-index vertices locally.
        let mut vertex_map: HashMap<u32, u32> = HashMap::new();
        let mut local_positions: Vec<Vec3> = Vec::new();
        let mut local_tris: Vec<[u32; 3]> = Vec::new();
        for &cluster in group {
            for &tri in &cluster_tris[cluster as usize] {
                let mut mapped = [0u32; 3];
                for (slot, &v) in mapped.iter_mut().zip(&layer.tris[tri as usize]) {
                    let next = local_positions.len() as u32;
                    *slot = *vertex_map.entry(v).or_insert_with(|| {
                        local_positions.push(layer.positions[v as usize]);
                        next
                    });
                }
                local_tris.push(mapped);
            }
        }

        let target = (local_tris.len() as f32 * (1.0 - self.config.removal_ratio)) as usize;
        let simplified = self.simplifier.simplify(&local_positions, &local_tris, target)?;
        if simplified.tris.is_empty() {
            return Ok(GroupOutput::empty());
        }

        let error = rms_nearest_error(&simplified.positions, &local_positions);

        let (membership, cluster_count) = if simplified.tris.len() > 2 * self.config.cluster_size {
            let adj = triangle_adjacency(&simplified.tris);
            let parts = simplified.tris.len().div_ceil(self.config.cluster_size);
            self.partition_or_single(parts, &unweighted(&adj))
        } else {
            (vec![0; simplified.tris.len()], 1)
        };

        let normals = simplified.vertex_normals();
        Ok(GroupOutput {
            positions: simplified.positions,
            normals,
            tris: simplified.tris,
            membership,
            cluster_count,
            error,
        })
    }

    /// Merge per-group outputs into the next layer, deduplicating
    /// vertices by exact coordinate bits, and record every source
    /// cluster's parent set and coarsening error.
    fn merge_groups(
        &self,
        layer: &Layer,
        layer_base: usize,
        groups: &[Vec<u32>],
        results: Vec<GroupOutput>,
        acc: &mut Accumulator,
    ) -> Result<(Option<Layer>, bool)> {
        let next_layer_base = layer_base + layer.cluster_count;

        let mut positions: Vec<Vec3> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();
        let mut tris: Vec<[u32; 3]> = Vec::new();
        let mut tri_cluster: Vec<u32> = Vec::new();
        let mut vertex_map: HashMap<[u32; 3], u32> = HashMap::new();
        let mut cluster_base = 0usize;
        let mut aborted = false;

        for (group, out) in groups.iter().zip(results) {
            if group.is_empty() {
                continue;
            }
            if out.tris.is_empty() {
                // SimplifierFailure: this group contributes no parents.
                aborted = true;
                continue;
            }

            let mut remap = Vec::with_capacity(out.positions.len());
            for (i, p) in out.positions.iter().enumerate() {
                let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
                let next = positions.len() as u32;
                let idx = *vertex_map.entry(key).or_insert_with(|| {
                    positions.push(*p);
                    normals.push(out.normals[i]);
                    next
                });
                remap.push(idx);
            }
            for (t, &cluster) in out.tris.iter().zip(&out.membership) {
                tris.push([
                    remap[t[0] as usize],
                    remap[t[1] as usize],
                    remap[t[2] as usize],
                ]);
                tri_cluster.push(cluster_base as u32 + cluster);
            }

            // Every cluster of the group shares the same parents: the
            // clusters the group just produced.
            let parents: Vec<u32> = (0..out.cluster_count)
                .map(|j| (next_layer_base + cluster_base + j) as u32)
                .collect();
            for &cluster in group {
                let global = layer_base + cluster as usize;
                acc.parent_lists[global] = parents.clone();
                acc.errors[global] = Some(out.error);
            }
            cluster_base += out.cluster_count;
        }

        if tris.is_empty() {
            return Ok((None, true));
        }

        let tri_adj = triangle_adjacency(&tris);
        Ok((
            Some(Layer {
                positions,
                normals,
                tris,
                tri_adj,
                tri_cluster,
                cluster_count: cluster_base,
            }),
            aborted,
        ))
    }

    /// Resolve the root, then run the bottom-up monotonicity pass and
    /// the uv-inheritance pass, producing the final DAG.
    fn assemble(&self, mesh: &TriangleMesh, mut acc: Accumulator) -> Result<ClusterDag> {
        let parentless: Vec<u32> = (0..acc.parent_lists.len() as u32)
            .filter(|&c| acc.parent_lists[c as usize].is_empty())
            .collect();
        ensure!(!parentless.is_empty(), "built a DAG with no root candidate");

        let max_error = acc
            .errors
            .iter()
            .flatten()
            .copied()
            .fold(0.0f32, f32::max);
        // Synthetic top-of-chain error; a degenerate single-layer build
        // has no simplification error to scale, so floor it.
        let cap_error = if max_error > 0.0 { 1.5 * max_error } else { 1e-6 };
        for e in &mut acc.errors {
            e.get_or_insert(cap_error);
        }

        if parentless.len() > 1 {
            // Coarsening stopped early: append a synthetic root tiling
            // the surface with every parentless cluster's geometry.
            let root = acc.parent_lists.len() as u32;
            let mut positions = Vec::new();
            let mut normals = Vec::new();
            for &c in &parentless {
                positions.extend_from_slice(&acc.positions[c as usize]);
                normals.extend_from_slice(&acc.normals[c as usize]);
                acc.parent_lists[c as usize].push(root);
            }
            acc.positions.push(positions);
            acc.normals.push(normals);
            acc.uvs.push(Vec::new());
            acc.needs_uv.push(true);
            acc.parent_lists.push(Vec::new());
            acc.errors.push(Some(cap_error));
        }

        let n = acc.parent_lists.len();
        let mut child_lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (c, parents) in acc.parent_lists.iter().enumerate() {
            for &p in parents {
                child_lists[p as usize].push(c as u32);
            }
        }

        // Bottom-up: spheres grow over children, errors lift above them.
        // Parents always carry higher indices, so ascending order is
        // topological from the leaves.
        let mut errors = vec![0.0f32; n];
        let mut spheres = vec![BoundingSphere::EMPTY; n];
        for c in 0..n {
            let own = BoundingSphere::from_points(
                acc.positions[c]
                    .chunks_exact(3)
                    .map(|p| Vec3::new(p[0], p[1], p[2])),
            );
            let kids = &child_lists[c];
            let mut error = acc.errors[c].unwrap_or(cap_error);
            let sphere = if kids.is_empty() {
                own
            } else {
                let mut all = vec![own];
                all.extend(kids.iter().map(|&k| spheres[k as usize]));
                let child_max = kids
                    .iter()
                    .map(|&k| errors[k as usize])
                    .fold(0.0f32, f32::max);
                let floor = if child_max > 0.0 {
                    child_max * (1.0 + ERROR_LIFT_EPSILON)
                } else {
                    MIN_PARENT_ERROR
                };
                error = error.max(floor);
                enclosing_sphere(&all)
            };
            errors[c] = error;
            spheres[c] = sphere;
        }

        self.inherit_uvs(mesh, &mut acc);

        Ok(ClusterDag::new(
            &acc.parent_lists,
            acc.positions,
            acc.normals,
            acc.uvs,
            errors,
            &spheres,
        ))
    }

    /// Clusters above LOD 0 blend the uvs of the two nearest LOD 0
    /// vertices by inverse distance.
    fn inherit_uvs(&self, mesh: &TriangleMesh, acc: &mut Accumulator) {
        if !acc.needs_uv.iter().any(|&b| b) {
            return;
        }
        let tree = KdTree::build(&mesh.positions);
        for c in 0..acc.positions.len() {
            if !acc.needs_uv[c] {
                continue;
            }
            let soup = &acc.positions[c];
            let mut uvs = Vec::with_capacity(soup.len() / 3 * 2);
            for p in soup.chunks_exact(3) {
                let query = Vec3::new(p[0], p[1], p[2]);
                let hits = tree.nearest_n(query, 2);
                let uv = match hits.as_slice() {
                    [(i, _)] => mesh.uvs[*i],
                    [(i0, d0), (i1, d1)] => {
                        let w0 = 1.0 / (d0 + 1e-8);
                        let w1 = 1.0 / (d1 + 1e-8);
                        (mesh.uvs[*i0] * w0 + mesh.uvs[*i1] * w1) / (w0 + w1)
                    }
                    _ => Vec2::ZERO,
                };
                uvs.push(uv.x);
                uvs.push(uv.y);
            }
            acc.uvs[c] = uvs;
        }
    }
}

/// One LOD generation under construction.
struct Layer {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tris: Vec<[u32; 3]>,
    tri_adj: Vec<Vec<u32>>,
    tri_cluster: Vec<u32>,
    cluster_count: usize,
}

/// Simplification result for one cluster group.
struct GroupOutput {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tris: Vec<[u32; 3]>,
    membership: Vec<u32>,
    cluster_count: usize,
    error: f32,
}

impl GroupOutput {
    fn empty() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            tris: Vec::new(),
            membership: Vec::new(),
            cluster_count: 0,
            error: 0.0,
        }
    }
}

/// Global per-cluster accumulators, indexed by final cluster id.
#[derive(Default)]
struct Accumulator {
    positions: Vec<Vec<f32>>,
    normals: Vec<Vec<f32>>,
    uvs: Vec<Vec<f32>>,
    needs_uv: Vec<bool>,
    parent_lists: Vec<Vec<u32>>,
    errors: Vec<Option<f32>>,
}

/// Flatten one layer's clusters into triangle soup and append them to
/// the accumulator. LOD 0 carries its uvs directly; coarser layers get
/// them from the inheritance pass.
fn emit_layer(acc: &mut Accumulator, layer: &Layer, is_lod0: bool, mesh: &TriangleMesh) {
    let mut cluster_tris: Vec<Vec<u32>> = vec![Vec::new(); layer.cluster_count];
    for (tri, &cluster) in layer.tri_cluster.iter().enumerate() {
        cluster_tris[cluster as usize].push(tri as u32);
    }

    for tris in &cluster_tris {
        let mut positions = Vec::with_capacity(tris.len() * 9);
        let mut normals = Vec::with_capacity(tris.len() * 9);
        let mut uvs = Vec::with_capacity(if is_lod0 { tris.len() * 6 } else { 0 });
        for &tri in tris {
            for &v in &layer.tris[tri as usize] {
                let p = layer.positions[v as usize];
                positions.extend_from_slice(&[p.x, p.y, p.z]);
                let n = layer.normals[v as usize];
                normals.extend_from_slice(&[n.x, n.y, n.z]);
                if is_lod0 {
                    let uv = mesh.uvs[v as usize];
                    uvs.extend_from_slice(&[uv.x, uv.y]);
                }
            }
        }
        acc.positions.push(positions);
        acc.normals.push(normals);
        acc.uvs.push(uvs);
        acc.needs_uv.push(!is_lod0);
        acc.parent_lists.push(Vec::new());
        acc.errors.push(None);
    }
}

fn unweighted(adjacency: &[Vec<u32>]) -> Vec<Vec<(u32, u32)>> {
    adjacency
        .iter()
        .map(|list| list.iter().map(|&n| (n, 1)).collect())
        .collect()
}
