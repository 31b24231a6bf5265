//! The cluster DAG
//!
//! Immutable output of the offline builder, shared read-only by every
//! runtime instance. Parent and child adjacency are two CSR tables
//! derived from the same edge set; per-cluster geometry is stored as
//! flattened triangle soup ready for concatenation into GPU buffers.

use anyhow::{bail, ensure, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bounds::BoundingSphere;

/// Tolerance for the parent-contains-child sphere check.
pub const SPHERE_CONTAINMENT_TOLERANCE: f32 = 1e-5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterDag {
    parent_offsets: Vec<u32>,
    parent_ids: Vec<u32>,
    child_offsets: Vec<u32>,
    child_ids: Vec<u32>,

    /// Per cluster: 3 floats per vertex, 9 per triangle.
    pub positions: Vec<Vec<f32>>,
    /// Per cluster, aligned with `positions`.
    pub normals: Vec<Vec<f32>>,
    /// Per cluster: 2 floats per vertex, aligned with `positions`.
    pub uvs: Vec<Vec<f32>>,
    /// Screen-space projection error per cluster, strictly monotonic
    /// along every parent edge.
    pub errors: Vec<f32>,
    pub centers: Vec<Vec3>,
    pub radii: Vec<f32>,
}

impl ClusterDag {
    /// Assemble a DAG from per-cluster parent lists and geometry.
    ///
    /// Children are derived by reversing the parent edges; both views are
    /// stored sorted so lookups and serialisation are canonical.
    pub fn new(
        parent_lists: &[Vec<u32>],
        positions: Vec<Vec<f32>>,
        normals: Vec<Vec<f32>>,
        uvs: Vec<Vec<f32>>,
        errors: Vec<f32>,
        spheres: &[BoundingSphere],
    ) -> Self {
        let n = parent_lists.len();
        assert_eq!(positions.len(), n);
        assert_eq!(normals.len(), n);
        assert_eq!(uvs.len(), n);
        assert_eq!(errors.len(), n);
        assert_eq!(spheres.len(), n);

        let mut child_lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (c, parents) in parent_lists.iter().enumerate() {
            for &p in parents {
                child_lists[p as usize].push(c as u32);
            }
        }

        let (parent_offsets, parent_ids) = to_csr(parent_lists);
        let (child_offsets, child_ids) = to_csr(&child_lists);

        Self {
            parent_offsets,
            parent_ids,
            child_offsets,
            child_ids,
            positions,
            normals,
            uvs,
            errors,
            centers: spheres.iter().map(|s| s.center).collect(),
            radii: spheres.iter().map(|s| s.radius).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The unique coarsest cluster; always the highest index.
    pub fn root(&self) -> u32 {
        debug_assert!(!self.is_empty());
        self.len() as u32 - 1
    }

    pub fn parents(&self, cluster: u32) -> &[u32] {
        let (a, b) = range(&self.parent_offsets, cluster);
        &self.parent_ids[a..b]
    }

    pub fn children(&self, cluster: u32) -> &[u32] {
        let (a, b) = range(&self.child_offsets, cluster);
        &self.child_ids[a..b]
    }

    pub fn is_leaf(&self, cluster: u32) -> bool {
        self.children(cluster).is_empty()
    }

    pub fn sphere(&self, cluster: u32) -> BoundingSphere {
        BoundingSphere {
            center: self.centers[cluster as usize],
            radius: self.radii[cluster as usize],
        }
    }

    pub fn triangle_count(&self, cluster: u32) -> usize {
        self.positions[cluster as usize].len() / 9
    }

    /// Summed triangle count of a set of clusters.
    pub fn triangles_in(&self, clusters: impl Iterator<Item = u32>) -> usize {
        clusters.map(|c| self.triangle_count(c)).sum()
    }

    /// Check the structural invariants: stream alignment, a single root
    /// at the highest index reachable from everywhere, sibling groups
    /// sharing exact parent sets, strictly monotonic error and parent
    /// spheres containing child spheres.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        ensure!(n > 0, "empty DAG");

        for c in 0..n {
            let verts = self.positions[c].len();
            ensure!(verts % 9 == 0, "cluster {c}: positions not whole triangles");
            ensure!(self.normals[c].len() == verts, "cluster {c}: normal stream misaligned");
            ensure!(self.uvs[c].len() == verts / 3 * 2, "cluster {c}: uv stream misaligned");
        }

        let roots: Vec<usize> = (0..n)
            .filter(|&c| self.parents(c as u32).is_empty())
            .collect();
        if roots.len() != 1 || roots[0] != n - 1 {
            bail!("expected the single root at index {}, found {roots:?}", n - 1);
        }

        // Every cluster reaches the root by following parents. Parents
        // always carry higher indices, so one descending pass resolves
        // them before their children.
        let mut reaches = vec![false; n];
        reaches[n - 1] = true;
        for c in (0..n - 1).rev() {
            let mut ok = false;
            for &p in self.parents(c as u32) {
                ensure!(p as usize > c, "parent {p} does not come after child {c}");
                ok |= reaches[p as usize];
            }
            reaches[c] = ok;
            ensure!(ok, "cluster {c} does not reach the root");
        }

        for c in 0..n as u32 {
            let parents = self.parents(c);
            for &p in parents {
                ensure!(
                    self.errors[p as usize] > self.errors[c as usize],
                    "error not monotonic on edge {p} -> {c}"
                );
                ensure!(
                    self.sphere(p).contains(&self.sphere(c), SPHERE_CONTAINMENT_TOLERANCE),
                    "sphere of {p} does not contain sphere of {c}"
                );
            }
            // Co-parent closure: every parent of c sees the same children.
            if let Some(&first) = parents.first() {
                let reference = self.children(first);
                for &p in &parents[1..] {
                    ensure!(
                        self.children(p) == reference,
                        "parents of {c} disagree on their child set"
                    );
                }
            }
        }
        Ok(())
    }
}

fn range(offsets: &[u32], cluster: u32) -> (usize, usize) {
    (
        offsets[cluster as usize] as usize,
        offsets[cluster as usize + 1] as usize,
    )
}

fn to_csr(lists: &[Vec<u32>]) -> (Vec<u32>, Vec<u32>) {
    let mut offsets = Vec::with_capacity(lists.len() + 1);
    let mut flat = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    offsets.push(0);
    for list in lists {
        let mut sorted = list.clone();
        sorted.sort_unstable();
        flat.extend_from_slice(&sorted);
        offsets.push(flat.len() as u32);
    }
    (offsets, flat)
}
