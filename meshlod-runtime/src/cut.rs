//! Per-instance graph-cut selection
//!
//! The live cut is a set of clusters that together tile the surface.
//! Each step projects every cut member's error to screen space and walks
//! the cut locally: a cluster whose projected error falls below the
//! hysteresis band is replaced by its parents (together with every
//! sibling sharing those parents), one above the band is replaced by its
//! children (evicting all co-parents). Sibling groups share exact parent
//! sets by construction, so both transitions preserve the tiling.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use glam::Vec3;

use meshlod_core::ClusterDag;

use crate::camera::Camera;

/// Projected-error threshold for the refine/coarsen decision.
pub const THRESHOLD: f32 = 6e-5;

/// Hysteresis dead-band half-width around [`THRESHOLD`]. Refining one
/// level roughly halves the projected error, so the band must span a
/// 2x ratio or the cut oscillates at the boundary.
pub const MARGIN: f32 = 3e-5;

pub struct CutSelector {
    dag: Arc<ClusterDag>,
    /// Instance world position; cluster spheres are translated by it.
    position: Vec3,
    cut: BTreeSet<u32>,
}

impl CutSelector {
    pub fn new(dag: Arc<ClusterDag>, position: Vec3) -> Self {
        let mut cut = BTreeSet::new();
        cut.insert(dag.root());
        Self { dag, position, cut }
    }

    pub fn cut(&self) -> &BTreeSet<u32> {
        &self.cut
    }

    pub fn dag(&self) -> &Arc<ClusterDag> {
        &self.dag
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Triangles currently selected, across the whole cut.
    pub fn live_triangles(&self) -> usize {
        self.dag.triangles_in(self.cut.iter().copied())
    }

    /// Debug clamp: coarsest possible cut.
    pub fn collapse_to_root(&mut self) {
        self.cut.clear();
        self.cut.insert(self.dag.root());
    }

    /// Debug clamp: finest possible cut (all leaves).
    pub fn refine_to_leaves(&mut self) {
        self.cut = (0..self.dag.len() as u32)
            .filter(|&c| self.dag.is_leaf(c))
            .collect();
    }

    /// Screen-space error of one cluster for the current camera.
    ///
    /// Inside the bounding sphere the error is infinite (must refine);
    /// outside the forward cone it is zero (free to coarsen); otherwise
    /// it is the cluster error over the distance to the sphere surface.
    pub fn screen_error(&self, camera: &Camera, cluster: u32) -> f32 {
        let center = self.dag.centers[cluster as usize] + self.position;
        let distance =
            camera.position.distance(center) - self.dag.radii[cluster as usize];
        if distance <= 0.0 {
            return f32::INFINITY;
        }
        if !camera.in_front(center) {
            return 0.0;
        }
        self.dag.errors[cluster as usize] / distance
    }

    /// Run up to `num_steps` refinement/coarsening sweeps, stopping early
    /// at a fixed point. Returns whether the cut changed.
    pub fn step(&mut self, camera: &Camera, num_steps: usize) -> bool {
        let mut errors: HashMap<u32, f32> = self
            .cut
            .iter()
            .map(|&c| (c, self.screen_error(camera, c)))
            .collect();

        let mut any_change = false;
        for _ in 0..num_steps {
            let mut to_add: BTreeSet<u32> = BTreeSet::new();
            let mut to_remove: BTreeSet<u32> = BTreeSet::new();

            for &cluster in &self.cut {
                if to_add.contains(&cluster) || to_remove.contains(&cluster) {
                    continue;
                }
                let error = errors[&cluster];

                if error < THRESHOLD - MARGIN {
                    // Coarsen: the whole sibling group leaves together.
                    let parents = self.dag.parents(cluster);
                    if !parents.is_empty() {
                        for &p in parents {
                            to_remove.extend(self.dag.children(p).iter().copied());
                        }
                        to_add.extend(parents.iter().copied());
                    }
                } else if error > THRESHOLD + MARGIN {
                    // Refine: all children in, all their co-parents out.
                    let children = self.dag.children(cluster);
                    if !children.is_empty() {
                        for &k in children {
                            to_remove.extend(self.dag.parents(k).iter().copied());
                        }
                        to_add.extend(children.iter().copied());
                    }
                }
            }

            if to_add.is_empty() && to_remove.is_empty() {
                break;
            }

            for &c in &to_add {
                self.cut.insert(c);
                errors
                    .entry(c)
                    .or_insert_with(|| self.screen_error(camera, c));
            }
            for c in &to_remove {
                self.cut.remove(c);
            }
            any_change = true;
        }

        if any_change {
            log::trace!(
                "cut now {} clusters / {} tris",
                self.cut.len(),
                self.live_triangles()
            );
        }
        any_change
    }
}
