//! GPU-facing half of the pipeline
//!
//! Owns the wgpu device, the diffuse+texture pipeline, per-instance
//! vertex buffer triples reflecting each live cut, and the instance
//! manager that drives cut selection and drawing every frame.

pub mod cluster_mesh;
pub mod renderer;
pub mod scene;
pub mod texture;

pub use cluster_mesh::ClusterMesh;
pub use renderer::Renderer;
pub use scene::{InstanceManager, Model};
pub use texture::Texture;
