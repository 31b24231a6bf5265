//! Instance management
//!
//! Owns the camera, the model registry (one DAG + texture per name),
//! and the instance list. Each frame the manager steps every instance's
//! cut selector and re-uploads the vertex buffers of instances whose
//! cut changed.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec3;

use meshlod_core::ClusterDag;
use meshlod_runtime::{Camera, CutSelector};

use crate::cluster_mesh::ClusterMesh;
use crate::renderer::Renderer;
use crate::texture::Texture;

/// A registered model: the immutable DAG shared by all of its instances
/// plus its diffuse texture.
pub struct Model {
    pub dag: Arc<ClusterDag>,
    pub texture: Texture,
}

pub struct Instance {
    pub model: String,
    pub selector: CutSelector,
    pub mesh: ClusterMesh,
    dirty: bool,
}

pub struct InstanceManager {
    pub camera: Camera,
    /// Step the cut selectors each frame; toggled at runtime.
    pub dynamic_lod: bool,
    models: HashMap<String, Model>,
    instances: Vec<Instance>,
}

impl InstanceManager {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            dynamic_lod: true,
            models: HashMap::new(),
            instances: Vec::new(),
        }
    }

    pub fn register_model(&mut self, name: impl Into<String>, model: Model) {
        self.models.insert(name.into(), model);
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Spawn an instance of a registered model at a world position. Its
    /// cut starts at the root and is uploaded on the next update.
    pub fn spawn(&mut self, model_name: &str, position: Vec3) -> Result<()> {
        let model = self
            .models
            .get(model_name)
            .ok_or_else(|| anyhow!("unknown model {model_name:?}"))?;
        self.instances.push(Instance {
            model: model_name.to_string(),
            selector: CutSelector::new(model.dag.clone(), position),
            mesh: ClusterMesh::new(position),
            dirty: true,
        });
        Ok(())
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Triangles selected across all instances (HUD statistic).
    pub fn live_triangles(&self) -> usize {
        self.instances
            .iter()
            .map(|i| i.selector.live_triangles())
            .sum()
    }

    /// Per-frame update: step each instance's cut (when dynamic LOD is
    /// on) and re-upload the buffers of any instance whose cut changed.
    pub fn update(&mut self, renderer: &Renderer) {
        for instance in &mut self.instances {
            let changed = if self.dynamic_lod {
                instance.selector.step(&self.camera, 3)
            } else {
                false
            };
            if changed || instance.dirty {
                instance.mesh.set_cut(
                    renderer.device(),
                    renderer.queue(),
                    instance.selector.dag(),
                    instance.selector.cut(),
                );
                instance.dirty = false;
            }
        }
    }
}
